//! Finished audio assets and temporary asset handles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::debug;
use uuid::Uuid;

use super::encoder::finalize_container;
use super::format::EncodingFormat;
use crate::error::AudioResult;

/// The assembled, finalized encoded audio of one recording.
///
/// Immutable once built; shared by reference between playback and upload.
#[derive(Debug)]
pub struct AudioAsset {
    id: Uuid,
    bytes: Vec<u8>,
    format: EncodingFormat,
    duration_seconds: u64,
    created_at: DateTime<Utc>,
}

impl AudioAsset {
    /// Concatenate chunks in arrival order into one asset
    pub fn assemble(chunks: Vec<Vec<u8>>, format: EncodingFormat, duration_seconds: u64) -> Self {
        let total: usize = chunks.iter().map(Vec::len).sum();
        let mut bytes = Vec::with_capacity(total);
        for chunk in chunks {
            bytes.extend_from_slice(&chunk);
        }
        finalize_container(&format, &mut bytes);

        Self::from_bytes(bytes, format, duration_seconds)
    }

    pub fn from_bytes(bytes: Vec<u8>, format: EncodingFormat, duration_seconds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            bytes,
            format,
            duration_seconds,
            created_at: Utc::now(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn format(&self) -> &EncodingFormat {
        &self.format
    }

    pub fn duration_seconds(&self) -> u64 {
        self.duration_seconds
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Where an uploaded asset lives; enough to re-attach playback to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteReference {
    /// Storage path/identifier
    pub path: String,
    /// Original file name, if the store knows one
    pub filename: Option<String>,
    pub uploaded_at: DateTime<Utc>,
    pub size_bytes: u64,
    pub format: EncodingFormat,
    pub duration_seconds: u64,
}

/// Reads back the bytes of an uploaded asset
#[async_trait::async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, reference: &RemoteReference) -> AudioResult<Vec<u8>>;
}

/// Issues `asset://` handles for in-memory assets
///
/// A handle stays resolvable until its `AssetHandle` guard is dropped.
#[derive(Clone, Default)]
pub struct AssetRegistry {
    entries: Arc<Mutex<HashMap<String, Arc<AudioAsset>>>>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, asset: Arc<AudioAsset>) -> AssetHandle {
        let url = format!("asset://{}", Uuid::new_v4());
        self.lock().insert(url.clone(), asset);
        debug!("Registered asset handle {}", url);

        AssetHandle {
            url,
            registry: self.clone(),
        }
    }

    pub fn resolve(&self, url: &str) -> Option<Arc<AudioAsset>> {
        self.lock().get(url).cloned()
    }

    /// Number of live handles
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn revoke(&self, url: &str) {
        if self.lock().remove(url).is_some() {
            debug!("Revoked asset handle {}", url);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Arc<AudioAsset>>> {
        // A poisoned map still holds valid entries
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Guard for a temporary asset handle; revokes it on drop
#[derive(Debug)]
pub struct AssetHandle {
    url: String,
    registry: AssetRegistry,
}

impl AssetHandle {
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Drop for AssetHandle {
    fn drop(&mut self) {
        self.registry.revoke(&self.url);
    }
}

impl std::fmt::Debug for AssetRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetRegistry")
            .field("handles", &self.len())
            .finish()
    }
}
