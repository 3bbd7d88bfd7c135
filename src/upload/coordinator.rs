use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::task::{
    ProgressTracker, UploadDestination, UploadEvent, UploadOutcome, UploadProgress, UploadSnapshot,
    UploadStatus, UploadTrigger,
};
use super::transport::Transport;
use crate::audio::AudioAsset;
use crate::error::{AudioError, AudioResult};

struct TaskEntry {
    asset: Arc<AudioAsset>,
    destination: UploadDestination,
    status: Arc<watch::Sender<UploadSnapshot>>,
    worker: JoinHandle<()>,
}

/// Transfers finished recordings to remote storage
///
/// At most one transfer per asset runs at a time. Each task publishes its
/// `UploadSnapshot` on a watch channel; progress and terminal results
/// also go out on the coordinator's event channel.
pub struct UploadCoordinator {
    transport: Arc<dyn Transport>,
    tasks: Mutex<HashMap<Uuid, TaskEntry>>,
    events: mpsc::UnboundedSender<UploadEvent>,
    auto_destination: Option<UploadDestination>,
}

impl UploadCoordinator {
    pub fn new(transport: Arc<dyn Transport>) -> (Self, mpsc::UnboundedReceiver<UploadEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let coordinator = Self {
            transport,
            tasks: Mutex::new(HashMap::new()),
            events,
            auto_destination: None,
        };
        (coordinator, events_rx)
    }

    /// Upload every completed recording to `destination` automatically
    pub fn with_auto_upload(mut self, destination: UploadDestination) -> Self {
        self.auto_destination = Some(destination);
        self
    }

    pub fn auto_upload_enabled(&self) -> bool {
        self.auto_destination.is_some()
    }

    pub fn transport_name(&self) -> &str {
        self.transport.name()
    }

    /// Start transferring `asset`
    ///
    /// Fails with `UploadInFlight` while another transfer of the same asset
    /// is pending or running. A completed or failed task is replaced.
    pub fn upload(
        &self,
        asset: Arc<AudioAsset>,
        destination: UploadDestination,
        trigger: UploadTrigger,
    ) -> AudioResult<watch::Receiver<UploadSnapshot>> {
        let asset_id = asset.id();
        let mut tasks = self.lock();

        let in_flight = tasks
            .get(&asset_id)
            .map(|entry| entry.status.borrow().status.is_in_flight())
            .unwrap_or(false);
        if in_flight {
            warn!("Upload of {} already in flight; {:?} request rejected", asset_id, trigger);
            return Err(AudioError::UploadInFlight);
        }

        let (status, status_rx) = watch::channel(UploadSnapshot::pending(
            asset_id,
            trigger,
            asset.len() as u64,
        ));
        let status = Arc::new(status);
        let worker = self.spawn_worker(Arc::clone(&asset), destination.clone(), Arc::clone(&status));

        info!(
            "Upload of {} queued ({:?}, {} bytes via {})",
            asset_id,
            trigger,
            asset.len(),
            self.transport.name()
        );

        tasks.insert(
            asset_id,
            TaskEntry {
                asset,
                destination,
                status,
                worker,
            },
        );
        Ok(status_rx)
    }

    /// Retry a failed upload without re-recording
    ///
    /// Resets the transferred byte count and bumps `retry_count`.
    pub fn retry(&self, asset_id: Uuid) -> AudioResult<watch::Receiver<UploadSnapshot>> {
        let mut tasks = self.lock();
        let entry = tasks.get_mut(&asset_id).ok_or(AudioError::NotRetryable)?;

        if entry.status.borrow().status != UploadStatus::Failed {
            return Err(AudioError::NotRetryable);
        }

        entry.status.send_modify(|snapshot| {
            snapshot.status = UploadStatus::Pending;
            snapshot.trigger = UploadTrigger::Manual;
            snapshot.retry_count += 1;
            snapshot.progress = UploadProgress {
                total_bytes: snapshot.progress.total_bytes,
                ..Default::default()
            };
            snapshot.error = None;
        });

        entry.worker = self.spawn_worker(
            Arc::clone(&entry.asset),
            entry.destination.clone(),
            Arc::clone(&entry.status),
        );

        info!(
            "Retrying upload of {} (attempt {})",
            asset_id,
            entry.status.borrow().retry_count + 1
        );
        Ok(entry.status.subscribe())
    }

    /// Hook for finished recordings; uploads when auto-upload is configured
    pub fn on_recording_complete(
        &self,
        asset: Arc<AudioAsset>,
    ) -> Option<watch::Receiver<UploadSnapshot>> {
        let destination = self.auto_destination.clone()?;
        match self.upload(asset, destination, UploadTrigger::Automatic) {
            Ok(status) => Some(status),
            Err(e) => {
                warn!("Automatic upload not started: {}", e);
                None
            }
        }
    }

    pub fn snapshot(&self, asset_id: Uuid) -> Option<UploadSnapshot> {
        self.lock()
            .get(&asset_id)
            .map(|entry| entry.status.borrow().clone())
    }

    pub fn subscribe(&self, asset_id: Uuid) -> Option<watch::Receiver<UploadSnapshot>> {
        self.lock().get(&asset_id).map(|entry| entry.status.subscribe())
    }

    pub fn snapshots(&self) -> Vec<UploadSnapshot> {
        self.lock()
            .values()
            .map(|entry| entry.status.borrow().clone())
            .collect()
    }

    fn spawn_worker(
        &self,
        asset: Arc<AudioAsset>,
        destination: UploadDestination,
        status: Arc<watch::Sender<UploadSnapshot>>,
    ) -> JoinHandle<()> {
        tokio::spawn(run_transfer(
            Arc::clone(&self.transport),
            asset,
            destination,
            status,
            self.events.clone(),
        ))
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, TaskEntry>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for UploadCoordinator {
    fn drop(&mut self) {
        for (asset_id, entry) in self.lock().drain() {
            if !entry.worker.is_finished() {
                debug!("Aborting upload of {}", asset_id);
                entry.worker.abort();
            }
        }
    }
}

async fn run_transfer(
    transport: Arc<dyn Transport>,
    asset: Arc<AudioAsset>,
    destination: UploadDestination,
    status: Arc<watch::Sender<UploadSnapshot>>,
    events: mpsc::UnboundedSender<UploadEvent>,
) {
    let asset_id = asset.id();
    let mut tracker = ProgressTracker::new(asset.len() as u64);
    status.send_modify(|snapshot| snapshot.status = UploadStatus::Uploading);

    let (progress_tx, mut progress_rx) = mpsc::unbounded_channel();
    let transfer = transport.transfer(Arc::clone(&asset), &destination, progress_tx);
    tokio::pin!(transfer);

    let result = loop {
        tokio::select! {
            result = &mut transfer => break result,
            Some(bytes) = progress_rx.recv() => {
                report_progress(&mut tracker, bytes, asset_id, &status, &events);
            }
        }
    };
    while let Ok(bytes) = progress_rx.try_recv() {
        report_progress(&mut tracker, bytes, asset_id, &status, &events);
    }

    let outcome = match result {
        Ok(reference) => {
            let progress = tracker.complete();
            info!("Upload of {} completed: {}", asset_id, reference.path);
            status.send_modify(|snapshot| {
                snapshot.status = UploadStatus::Completed;
                snapshot.progress = progress;
                snapshot.remote = Some(reference.clone());
            });
            UploadOutcome::Success(reference)
        }
        Err(e) => {
            error!("Upload of {} failed: {}", asset_id, e);
            status.send_modify(|snapshot| {
                snapshot.status = UploadStatus::Failed;
                snapshot.error = Some(e.to_string());
            });
            UploadOutcome::Failure(e)
        }
    };

    let _ = events.send(UploadEvent::Finished { asset_id, outcome });
}

fn report_progress(
    tracker: &mut ProgressTracker,
    bytes: u64,
    asset_id: Uuid,
    status: &watch::Sender<UploadSnapshot>,
    events: &mpsc::UnboundedSender<UploadEvent>,
) {
    let progress = tracker.update(bytes);
    debug!("Upload of {}: {:.1}%", asset_id, progress.percentage);
    status.send_modify(|snapshot| snapshot.progress = progress.clone());
    let _ = events.send(UploadEvent::Progress { asset_id, progress });
}
