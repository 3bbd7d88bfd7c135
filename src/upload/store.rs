use async_trait::async_trait;
use chrono::Utc;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::task::UploadDestination;
use super::transport::{stored_filename, Transport};
use crate::audio::{AssetFetcher, AudioAsset, RemoteReference};
use crate::error::{AudioError, AudioResult};

const METADATA_SUFFIX: &str = ".json";

/// Filesystem-backed asset store
///
/// Each asset is written under `<root>/<folder>/<filename>` next to a JSON
/// sidecar holding its `RemoteReference`.
#[derive(Debug, Clone)]
pub struct FsStore {
    root: PathBuf,
    chunk_size: usize,
}

impl FsStore {
    pub fn new(root: impl Into<PathBuf>, chunk_size: usize) -> Self {
        Self {
            root: root.into(),
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Absolute location of a stored path; rejects paths escaping the root
    pub fn resolve(&self, path: &str) -> AudioResult<PathBuf> {
        let relative = Path::new(path);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir));
        if path.is_empty() || escapes {
            return Err(AudioError::TransferFailure(format!(
                "invalid storage path: {}",
                path
            )));
        }
        Ok(self.root.join(relative))
    }

    /// Look up the reference recorded when `path` was stored
    pub async fn locate(&self, path: &str) -> AudioResult<RemoteReference> {
        let sidecar = sidecar_path(&self.resolve(path)?);
        let json = tokio::fs::read(&sidecar).await.map_err(|e| {
            AudioError::TransferFailure(format!("no stored asset at {}: {}", path, e))
        })?;
        serde_json::from_slice(&json)
            .map_err(|e| AudioError::TransferFailure(format!("corrupt metadata for {}: {}", path, e)))
    }

    async fn write_asset(
        &self,
        asset: &AudioAsset,
        target: &Path,
        progress: &mpsc::UnboundedSender<u64>,
    ) -> std::io::Result<()> {
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let mut file = tokio::fs::File::create(target).await?;
        let mut written = 0u64;
        for slice in asset.bytes().chunks(self.chunk_size) {
            file.write_all(slice).await?;
            written += slice.len() as u64;
            let _ = progress.send(written);
        }
        file.flush().await?;
        file.sync_all().await?;
        Ok(())
    }
}

fn sidecar_path(asset_path: &Path) -> PathBuf {
    let mut name = asset_path.as_os_str().to_os_string();
    name.push(METADATA_SUFFIX);
    PathBuf::from(name)
}

#[async_trait]
impl Transport for FsStore {
    async fn transfer(
        &self,
        asset: Arc<AudioAsset>,
        destination: &UploadDestination,
        progress: mpsc::UnboundedSender<u64>,
    ) -> AudioResult<RemoteReference> {
        let filename = stored_filename(&asset, destination);
        let path = if destination.folder.is_empty() {
            filename.clone()
        } else {
            format!("{}/{}", destination.folder.trim_end_matches('/'), filename)
        };
        let target = self.resolve(&path)?;

        debug!("Writing {} bytes to {}", asset.len(), target.display());
        self.write_asset(&asset, &target, &progress)
            .await
            .map_err(|e| AudioError::TransferFailure(format!("failed to write {}: {}", path, e)))?;

        let reference = RemoteReference {
            path: path.clone(),
            filename: Some(filename),
            uploaded_at: Utc::now(),
            size_bytes: asset.len() as u64,
            format: asset.format().clone(),
            duration_seconds: asset.duration_seconds(),
        };

        let metadata = serde_json::to_vec_pretty(&reference)
            .map_err(|e| AudioError::TransferFailure(e.to_string()))?;
        tokio::fs::write(sidecar_path(&target), metadata)
            .await
            .map_err(|e| AudioError::TransferFailure(format!("failed to write metadata: {}", e)))?;

        info!("Stored asset {} at {}", asset.id(), path);
        Ok(reference)
    }

    fn name(&self) -> &str {
        "filesystem"
    }
}

#[async_trait]
impl AssetFetcher for FsStore {
    async fn fetch(&self, reference: &RemoteReference) -> AudioResult<Vec<u8>> {
        let path = self.resolve(&reference.path)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| AudioError::TransferFailure(format!("failed to read {}: {}", reference.path, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_rejects_escaping_paths() {
        let store = FsStore::new("/srv/audio", 1024);

        assert!(store.resolve("../etc/passwd").is_err());
        assert!(store.resolve("/etc/passwd").is_err());
        assert!(store.resolve("").is_err());
        assert_eq!(
            store.resolve("practice/a.wav").unwrap(),
            PathBuf::from("/srv/audio/practice/a.wav")
        );
    }

    #[test]
    fn test_sidecar_path() {
        assert_eq!(
            sidecar_path(Path::new("/srv/a.wav")),
            PathBuf::from("/srv/a.wav.json")
        );
    }
}
