//! Exclusive device ownership
//!
//! One physical input is owned by at most one recording session at a time.
//! Ownership is a `DeviceLease` guard carried inside the `DeviceStream`;
//! releasing the stream (explicitly or by drop) stops its tracks and frees
//! the device for the next session.

use std::sync::Arc;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tracing::{debug, info};

use super::backend::{AudioFrame, AudioInput, PermissionStatus};
use crate::error::{AudioError, AudioResult};

/// Stops the underlying capture tracks of a device stream
pub trait StreamTracks: Send {
    fn stop(&mut self);
}

/// Proof of exclusive ownership of a capture device
#[derive(Debug)]
pub struct DeviceLease {
    _permit: OwnedSemaphorePermit,
}

/// Live capture stream handed out by an `AudioInput`
pub struct DeviceStream {
    frames: Option<mpsc::Receiver<AudioFrame>>,
    tracks: Option<Box<dyn StreamTracks>>,
    lease: Option<DeviceLease>,
}

impl DeviceStream {
    pub fn new(frames: mpsc::Receiver<AudioFrame>, tracks: impl StreamTracks + 'static) -> Self {
        Self {
            frames: Some(frames),
            tracks: Some(Box::new(tracks)),
            lease: None,
        }
    }

    /// Take the frame receiver (can only be taken once)
    pub fn take_frames(&mut self) -> Option<mpsc::Receiver<AudioFrame>> {
        self.frames.take()
    }

    pub fn is_live(&self) -> bool {
        self.tracks.is_some()
    }

    /// Stop all tracks and give the device back
    pub fn release(&mut self) {
        if let Some(mut tracks) = self.tracks.take() {
            tracks.stop();
            debug!("Device stream tracks stopped");
        }
        self.frames = None;
        self.lease = None;
    }

    fn with_lease(mut self, lease: DeviceLease) -> Self {
        self.lease = Some(lease);
        self
    }
}

impl Drop for DeviceStream {
    fn drop(&mut self) {
        self.release();
    }
}

/// A capture input shared between sessions, opened by one at a time
#[derive(Clone)]
pub struct Microphone {
    input: Arc<dyn AudioInput>,
    gate: Arc<Semaphore>,
}

impl Microphone {
    pub fn new(input: impl AudioInput + 'static) -> Self {
        Self::from_arc(Arc::new(input))
    }

    pub fn from_arc(input: Arc<dyn AudioInput>) -> Self {
        Self {
            input,
            gate: Arc::new(Semaphore::new(1)),
        }
    }

    pub fn name(&self) -> &str {
        self.input.name()
    }

    /// Whether some session currently holds the device
    pub fn is_in_use(&self) -> bool {
        self.gate.available_permits() == 0
    }

    pub async fn unlock(&self) -> AudioResult<()> {
        self.input.unlock().await
    }

    pub async fn request_permission(&self) -> PermissionStatus {
        self.input.request_permission().await
    }

    /// Acquire the device and open a stream
    ///
    /// Fails with `DeviceBusy` if another session holds the stream.
    pub async fn open(&self) -> AudioResult<DeviceStream> {
        let permit = Arc::clone(&self.gate)
            .try_acquire_owned()
            .map_err(|_| AudioError::DeviceBusy)?;

        let stream = self.input.open_stream().await?;
        info!("Opened capture stream on {}", self.input.name());

        Ok(stream.with_lease(DeviceLease { _permit: permit }))
    }
}
