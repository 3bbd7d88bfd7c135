// Integration tests for upload coordination
//
// Transfers go to a filesystem store in a temp directory; scripted
// transports stand in for flaky or slow networks.

use anyhow::Result;
use practice_audio::audio::{AssetFetcher, AudioAsset, EncodingFormat, RemoteReference};
use practice_audio::upload::{
    FsStore, Transport, UploadCoordinator, UploadDestination, UploadEvent, UploadOutcome,
    UploadProgress, UploadStatus, UploadTrigger,
};
use practice_audio::{AudioError, AudioResult};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;
use tokio::sync::{mpsc, Semaphore};

fn asset(len: usize) -> Arc<AudioAsset> {
    let bytes = (0..len).map(|i| (i % 251) as u8).collect();
    Arc::new(AudioAsset::from_bytes(bytes, EncodingFormat::wav(), 12))
}

async fn wait_finished(
    events: &mut mpsc::UnboundedReceiver<UploadEvent>,
) -> (Vec<UploadProgress>, UploadOutcome) {
    let mut progress = Vec::new();
    while let Some(event) = events.recv().await {
        match event {
            UploadEvent::Progress { progress: p, .. } => progress.push(p),
            UploadEvent::Finished { outcome, .. } => return (progress, outcome),
        }
    }
    panic!("event channel closed before the upload finished");
}

/// Fails the first `failures` transfers, then stores normally
struct FlakyTransport {
    inner: FsStore,
    failures: usize,
    attempts: AtomicUsize,
}

#[async_trait::async_trait]
impl Transport for FlakyTransport {
    async fn transfer(
        &self,
        asset: Arc<AudioAsset>,
        destination: &UploadDestination,
        progress: mpsc::UnboundedSender<u64>,
    ) -> AudioResult<RemoteReference> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.failures {
            let _ = progress.send(asset.len() as u64 / 2);
            return Err(AudioError::TransferFailure("connection reset".to_string()));
        }
        self.inner.transfer(asset, destination, progress).await
    }

    fn name(&self) -> &str {
        "flaky"
    }
}

/// Holds every transfer until a permit is added
struct GatedTransport {
    inner: FsStore,
    gate: Arc<Semaphore>,
}

#[async_trait::async_trait]
impl Transport for GatedTransport {
    async fn transfer(
        &self,
        asset: Arc<AudioAsset>,
        destination: &UploadDestination,
        progress: mpsc::UnboundedSender<u64>,
    ) -> AudioResult<RemoteReference> {
        let _permit = self
            .gate
            .acquire()
            .await
            .map_err(|_| AudioError::Cancelled)?;
        self.inner.transfer(asset, destination, progress).await
    }

    fn name(&self) -> &str {
        "gated"
    }
}

#[tokio::test]
async fn test_upload_to_filesystem_store() -> Result<()> {
    let dir = TempDir::new()?;
    let store = Arc::new(FsStore::new(dir.path(), 10));
    let (coordinator, mut events) = UploadCoordinator::new(store.clone());
    let asset = asset(100);

    let status = coordinator.upload(
        Arc::clone(&asset),
        UploadDestination::new("practice"),
        UploadTrigger::Manual,
    )?;
    assert!(status.borrow().status.is_in_flight());

    let (progress, outcome) = wait_finished(&mut events).await;
    let UploadOutcome::Success(reference) = outcome else {
        panic!("upload failed: {:?}", outcome);
    };

    assert_eq!(reference.path, format!("practice/{}.wav", asset.id()));
    assert_eq!(reference.size_bytes, 100);
    assert_eq!(reference.duration_seconds, 12);

    // One report per chunk, never going backwards
    assert_eq!(progress.len(), 10);
    assert!(progress
        .windows(2)
        .all(|w| w[0].percentage <= w[1].percentage));
    assert_eq!(progress.last().map(|p| p.bytes_transferred), Some(100));

    let snapshot = coordinator.snapshot(asset.id()).expect("snapshot");
    assert_eq!(snapshot.status, UploadStatus::Completed);
    assert_eq!(snapshot.progress.percentage, 100.0);
    assert_eq!(snapshot.progress.eta_seconds, Some(0.0));
    assert_eq!(snapshot.remote.as_ref(), Some(&reference));

    // Stored bytes and metadata can be read back
    assert_eq!(store.fetch(&reference).await?, asset.bytes());
    assert_eq!(store.locate(&reference.path).await?, reference);
    Ok(())
}

#[tokio::test]
async fn test_failed_upload_is_retryable() -> Result<()> {
    let dir = TempDir::new()?;
    let transport = Arc::new(FlakyTransport {
        inner: FsStore::new(dir.path(), 16),
        failures: 1,
        attempts: AtomicUsize::new(0),
    });
    let (coordinator, mut events) = UploadCoordinator::new(transport.clone());
    let asset = asset(64);

    coordinator.upload(
        Arc::clone(&asset),
        UploadDestination::new("practice"),
        UploadTrigger::Manual,
    )?;

    let (_, outcome) = wait_finished(&mut events).await;
    assert_eq!(
        outcome,
        UploadOutcome::Failure(AudioError::TransferFailure("connection reset".to_string()))
    );

    let failed = coordinator.snapshot(asset.id()).expect("snapshot");
    assert_eq!(failed.status, UploadStatus::Failed);
    assert_eq!(failed.progress.bytes_transferred, 32);
    assert_eq!(failed.retry_count, 0);
    assert!(failed.error.is_some());

    let status = coordinator.retry(asset.id())?;
    {
        let retried = status.borrow();
        assert_eq!(retried.retry_count, 1);
        assert_eq!(retried.status, UploadStatus::Pending);
        assert_eq!(retried.progress.bytes_transferred, 0);
        assert_eq!(retried.progress.percentage, 0.0);
    }

    let (_, outcome) = wait_finished(&mut events).await;
    assert!(matches!(outcome, UploadOutcome::Success(_)));

    let done = coordinator.snapshot(asset.id()).expect("snapshot");
    assert_eq!(done.status, UploadStatus::Completed);
    assert_eq!(done.retry_count, 1);
    assert_eq!(done.trigger, UploadTrigger::Manual);
    assert_eq!(transport.attempts.load(Ordering::SeqCst), 2);
    Ok(())
}

#[tokio::test]
async fn test_retry_only_from_failed() -> Result<()> {
    let dir = TempDir::new()?;
    let (coordinator, mut events) = UploadCoordinator::new(Arc::new(FsStore::new(dir.path(), 8)));
    let asset = asset(16);

    assert_eq!(
        coordinator.retry(asset.id()).err(),
        Some(AudioError::NotRetryable)
    );

    coordinator.upload(
        Arc::clone(&asset),
        UploadDestination::new("practice"),
        UploadTrigger::Manual,
    )?;
    wait_finished(&mut events).await;

    assert_eq!(
        coordinator.retry(asset.id()).err(),
        Some(AudioError::NotRetryable)
    );
    Ok(())
}

#[tokio::test]
async fn test_manual_blocked_while_automatic_in_flight() -> Result<()> {
    let dir = TempDir::new()?;
    let gate = Arc::new(Semaphore::new(0));
    let transport = Arc::new(GatedTransport {
        inner: FsStore::new(dir.path(), 8),
        gate: Arc::clone(&gate),
    });
    let (coordinator, mut events) = UploadCoordinator::new(transport);
    let coordinator = coordinator.with_auto_upload(UploadDestination::new("auto"));
    assert!(coordinator.auto_upload_enabled());

    let asset = asset(32);
    let status = coordinator
        .on_recording_complete(Arc::clone(&asset))
        .expect("automatic upload started");
    assert_eq!(status.borrow().trigger, UploadTrigger::Automatic);

    let manual = coordinator.upload(
        Arc::clone(&asset),
        UploadDestination::new("manual"),
        UploadTrigger::Manual,
    );
    assert_eq!(manual.err(), Some(AudioError::UploadInFlight));
    assert!(coordinator.on_recording_complete(Arc::clone(&asset)).is_none());

    gate.add_permits(1);
    let (_, outcome) = wait_finished(&mut events).await;
    let UploadOutcome::Success(reference) = outcome else {
        panic!("upload failed");
    };
    assert!(reference.path.starts_with("auto/"));

    // Once finished, a manual upload may run again
    gate.add_permits(1);
    coordinator.upload(
        Arc::clone(&asset),
        UploadDestination::new("manual").with_filename("again.wav"),
        UploadTrigger::Manual,
    )?;
    let (_, outcome) = wait_finished(&mut events).await;
    let UploadOutcome::Success(reference) = outcome else {
        panic!("upload failed");
    };
    assert_eq!(reference.path, "manual/again.wav");
    Ok(())
}

#[tokio::test]
async fn test_no_automatic_upload_unless_configured() -> Result<()> {
    let dir = TempDir::new()?;
    let (coordinator, _events) = UploadCoordinator::new(Arc::new(FsStore::new(dir.path(), 8)));

    assert!(coordinator.on_recording_complete(asset(8)).is_none());
    assert!(coordinator.snapshots().is_empty());
    assert_eq!(coordinator.transport_name(), "filesystem");
    Ok(())
}

#[tokio::test]
async fn test_store_rejects_escaping_destination() -> Result<()> {
    let dir = TempDir::new()?;
    let (coordinator, mut events) = UploadCoordinator::new(Arc::new(FsStore::new(dir.path(), 8)));

    coordinator.upload(
        asset(8),
        UploadDestination::new("../outside"),
        UploadTrigger::Manual,
    )?;

    let (_, outcome) = wait_finished(&mut events).await;
    assert!(matches!(
        outcome,
        UploadOutcome::Failure(AudioError::TransferFailure(_))
    ));
    Ok(())
}
