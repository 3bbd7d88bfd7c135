use serde::{Deserialize, Serialize};

use crate::audio::format::{default_preferences, DeviceClass, EncodingFormat};

/// Configuration for a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Recording stops automatically once this many seconds are captured
    /// Default: 180 seconds (3 minutes)
    pub max_duration_secs: u64,

    /// Decides encoder chunk cadence
    pub device_class: DeviceClass,

    /// Sample rate the capture device delivers
    pub sample_rate: u32,

    /// Number of audio channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Encoding preferences, best first
    pub formats: Vec<EncodingFormat>,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            max_duration_secs: 180,
            device_class: DeviceClass::Desktop,
            sample_rate: 48000,
            channels: 1,
            formats: default_preferences(),
        }
    }
}
