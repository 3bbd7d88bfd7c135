use serde::{Deserialize, Serialize};
use std::time::Instant;
use uuid::Uuid;

use crate::audio::RemoteReference;
use crate::error::AudioError;

/// Upload task lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
}

impl UploadStatus {
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Pending | Self::Uploading)
    }
}

/// Who asked for the transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadTrigger {
    Automatic,
    Manual,
}

/// Where an asset should be stored
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadDestination {
    /// Folder (or subject segment) inside the store
    pub folder: String,
    /// Stored file name; defaults to `<asset id>.<extension>`
    pub filename: Option<String>,
}

impl UploadDestination {
    pub fn new(folder: impl Into<String>) -> Self {
        Self {
            folder: folder.into(),
            filename: None,
        }
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Transfer progress as reported to callers
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
    pub percentage: f64,
    pub eta_seconds: Option<f64>,
    pub rate_bytes_per_second: f64,
}

/// Point-in-time view of one upload task
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadSnapshot {
    pub asset_id: Uuid,
    pub status: UploadStatus,
    pub trigger: UploadTrigger,
    pub progress: UploadProgress,
    pub retry_count: u32,
    pub remote: Option<RemoteReference>,
    pub error: Option<String>,
}

impl UploadSnapshot {
    pub(crate) fn pending(asset_id: Uuid, trigger: UploadTrigger, total_bytes: u64) -> Self {
        Self {
            asset_id,
            status: UploadStatus::Pending,
            trigger,
            progress: UploadProgress {
                total_bytes,
                ..Default::default()
            },
            retry_count: 0,
            remote: None,
            error: None,
        }
    }
}

/// Terminal result of one attempt
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    Success(RemoteReference),
    Failure(AudioError),
}

#[derive(Debug, Clone, PartialEq)]
pub enum UploadEvent {
    Progress {
        asset_id: Uuid,
        progress: UploadProgress,
    },
    Finished {
        asset_id: Uuid,
        outcome: UploadOutcome,
    },
}

/// Turns raw byte counts into rate, ETA and a never-decreasing percentage
#[derive(Debug)]
pub(crate) struct ProgressTracker {
    started: Instant,
    total_bytes: u64,
    bytes_transferred: u64,
    percentage: f64,
}

impl ProgressTracker {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            started: Instant::now(),
            total_bytes,
            bytes_transferred: 0,
            percentage: 0.0,
        }
    }

    pub fn update(&mut self, bytes_transferred: u64) -> UploadProgress {
        let bytes = bytes_transferred.min(self.total_bytes);
        self.bytes_transferred = self.bytes_transferred.max(bytes);

        let raw = if self.total_bytes == 0 {
            0.0
        } else {
            self.bytes_transferred as f64 / self.total_bytes as f64 * 100.0
        };
        self.percentage = self.percentage.max(raw);

        self.current()
    }

    pub fn complete(&mut self) -> UploadProgress {
        self.bytes_transferred = self.total_bytes;
        self.percentage = 100.0;
        let mut progress = self.current();
        progress.eta_seconds = Some(0.0);
        progress
    }

    pub fn current(&self) -> UploadProgress {
        let elapsed = self.started.elapsed().as_secs_f64();
        let rate = if elapsed > 0.0 {
            self.bytes_transferred as f64 / elapsed
        } else {
            0.0
        };
        let remaining = self.total_bytes.saturating_sub(self.bytes_transferred);
        let eta_seconds = if remaining == 0 {
            Some(0.0)
        } else if rate > 0.0 {
            Some(remaining as f64 / rate)
        } else {
            None
        };

        UploadProgress {
            bytes_transferred: self.bytes_transferred,
            total_bytes: self.total_bytes,
            percentage: self.percentage,
            eta_seconds,
            rate_bytes_per_second: rate,
        }
    }
}
