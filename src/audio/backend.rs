use serde::{Deserialize, Serialize};

use super::device::DeviceStream;
use crate::error::AudioResult;

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since the stream was opened
    pub timestamp_ms: u64,
}

/// Result of asking the platform for capture permission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PermissionStatus {
    Granted,
    Denied,
    /// The platform has no capture facility at all
    Unsupported,
}

/// Audio capture input trait
///
/// Implementations wrap a platform capture API:
/// - `WavFileInput`: replays a WAV file as a live device (testing/demos)
/// - anything else that can produce interleaved PCM frames
#[async_trait::async_trait]
pub trait AudioInput: Send + Sync {
    /// Platform-specific one-time unlock before the first capture.
    ///
    /// Default is a no-op; the session calls this at most once.
    async fn unlock(&self) -> AudioResult<()> {
        Ok(())
    }

    /// Ask for permission to capture
    async fn request_permission(&self) -> PermissionStatus;

    /// Open the device and start delivering frames
    async fn open_stream(&self) -> AudioResult<DeviceStream>;

    /// Get input name for logging
    fn name(&self) -> &str;
}
