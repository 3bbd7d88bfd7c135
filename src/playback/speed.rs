use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::AudioError;

/// Allowed playback rates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PlaybackSpeed {
    Half,
    ThreeQuarters,
    #[default]
    Normal,
    OneAndAQuarter,
    OneAndAHalf,
    Double,
}

impl PlaybackSpeed {
    pub const ALL: [PlaybackSpeed; 6] = [
        PlaybackSpeed::Half,
        PlaybackSpeed::ThreeQuarters,
        PlaybackSpeed::Normal,
        PlaybackSpeed::OneAndAQuarter,
        PlaybackSpeed::OneAndAHalf,
        PlaybackSpeed::Double,
    ];

    pub fn rate(self) -> f32 {
        match self {
            PlaybackSpeed::Half => 0.5,
            PlaybackSpeed::ThreeQuarters => 0.75,
            PlaybackSpeed::Normal => 1.0,
            PlaybackSpeed::OneAndAQuarter => 1.25,
            PlaybackSpeed::OneAndAHalf => 1.5,
            PlaybackSpeed::Double => 2.0,
        }
    }
}

impl TryFrom<f32> for PlaybackSpeed {
    type Error = AudioError;

    /// Exact match only; nearby values are rejected, not rounded
    fn try_from(rate: f32) -> Result<Self, Self::Error> {
        PlaybackSpeed::ALL
            .into_iter()
            .find(|speed| speed.rate() == rate)
            .ok_or(AudioError::InvalidSpeed(rate))
    }
}

impl fmt::Display for PlaybackSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x", self.rate())
    }
}
