use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::audio::{AudioAsset, EncodingFormat};
use crate::error::AudioError;

/// Recording state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordingState {
    Idle,
    RequestingPermission,
    Recording,
    Paused,
    Completed,
    Error,
}

impl RecordingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::RequestingPermission => "requesting permission",
            Self::Recording => "recording",
            Self::Paused => "paused",
            Self::Completed => "completed",
            Self::Error => "in error",
        }
    }

    /// States that hold the device stream and encoder
    pub fn is_capturing(&self) -> bool {
        matches!(self, Self::Recording | Self::Paused)
    }
}

/// Point-in-time view of a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingSnapshot {
    pub state: RecordingState,

    /// Seconds spent in `Recording` (pauses excluded)
    pub elapsed_seconds: u64,

    pub max_duration_seconds: u64,

    /// Negotiated format, once capture started
    pub format: Option<EncodingFormat>,

    /// Chunks received from the encoder this session
    pub chunks_recorded: usize,

    /// Set only in `Error`
    pub error_reason: Option<String>,

    /// Set only in `Completed`
    pub asset_id: Option<Uuid>,
}

impl RecordingSnapshot {
    pub fn idle(max_duration_seconds: u64) -> Self {
        Self {
            state: RecordingState::Idle,
            elapsed_seconds: 0,
            max_duration_seconds,
            format: None,
            chunks_recorded: 0,
            error_reason: None,
            asset_id: None,
        }
    }
}

/// Outward notifications from a recording session
#[derive(Debug, Clone)]
pub enum RecordingEvent {
    StateChanged(RecordingState),
    /// Emitted once per recorded second
    Tick { elapsed_seconds: u64 },
    Completed {
        asset: Arc<AudioAsset>,
        duration_seconds: u64,
    },
    Error { reason: AudioError },
}
