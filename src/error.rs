use thiserror::Error;

/// Errors produced by the capture, analysis, playback and upload components.
///
/// Every terminal state (recording `Error`, playback `Error`, upload `Failed`)
/// carries one of these as its reason.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum AudioError {
    #[error("microphone permission denied")]
    PermissionDenied,

    #[error("no capture device available")]
    DeviceNotFound,

    #[error("capture device is owned by another session")]
    DeviceBusy,

    #[error("no supported audio encoding on this platform")]
    FormatUnsupported,

    #[error("encoder fault: {0}")]
    EncoderFault(String),

    #[error("decode failure: {0}")]
    DecodeFailure(String),

    #[error("playback fault: {0}")]
    PlaybackFault(String),

    #[error("transfer failure: {0}")]
    TransferFailure(String),

    #[error("cannot {action} while {state}")]
    InvalidTransition {
        state: &'static str,
        action: &'static str,
    },

    #[error("unsupported playback speed {0}")]
    InvalidSpeed(f32),

    #[error("an upload for this asset is already in flight")]
    UploadInFlight,

    #[error("upload is not in a retryable state")]
    NotRetryable,

    #[error("no audio source loaded")]
    NoSource,

    #[error("operation cancelled")]
    Cancelled,
}

impl AudioError {
    /// Errors detected at capture start that end the attempt until `reset()`.
    pub fn is_capture_setup_error(&self) -> bool {
        matches!(
            self,
            AudioError::PermissionDenied
                | AudioError::DeviceNotFound
                | AudioError::DeviceBusy
                | AudioError::FormatUnsupported
        )
    }
}

pub type AudioResult<T> = std::result::Result<T, AudioError>;
