use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::{error, info};
use uuid::Uuid;

use crate::audio::AudioAsset;
use crate::recording::{RecordingEvent, RecordingHandle};
use crate::upload::{FsStore, UploadCoordinator, UploadDestination};
use crate::waveform::WaveformExtractor;

/// Shared application state for HTTP handlers
#[derive(Clone)]
pub struct AppState {
    /// Capture session; `None` when no input device is configured
    pub recorder: Option<RecordingHandle>,
    pub uploads: Arc<UploadCoordinator>,
    pub waveforms: Arc<WaveformExtractor>,
    pub store: Arc<FsStore>,
    /// Where manual uploads go
    pub destination: UploadDestination,
    /// Completed recordings (asset_id → asset)
    pub recordings: Arc<RwLock<HashMap<Uuid, Arc<AudioAsset>>>>,
}

impl AppState {
    pub fn new(
        recorder: Option<RecordingHandle>,
        uploads: Arc<UploadCoordinator>,
        waveforms: Arc<WaveformExtractor>,
        store: Arc<FsStore>,
        destination: UploadDestination,
    ) -> Self {
        Self {
            recorder,
            uploads,
            waveforms,
            store,
            destination,
            recordings: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Keep completed recordings and hand them to the upload coordinator
    pub fn track_recordings(
        &self,
        mut events: mpsc::UnboundedReceiver<RecordingEvent>,
    ) -> JoinHandle<()> {
        let recordings = Arc::clone(&self.recordings);
        let uploads = Arc::clone(&self.uploads);

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    RecordingEvent::Completed {
                        asset,
                        duration_seconds,
                    } => {
                        info!(
                            "Recording {} completed ({}s, {} bytes)",
                            asset.id(),
                            duration_seconds,
                            asset.len()
                        );
                        recordings.write().await.insert(asset.id(), Arc::clone(&asset));
                        uploads.on_recording_complete(asset);
                    }
                    RecordingEvent::Error { reason } => {
                        error!("Recording failed: {}", reason);
                    }
                    _ => {}
                }
            }
        })
    }
}
