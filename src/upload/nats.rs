use anyhow::{Context, Result};
use async_nats::Client;
use async_trait::async_trait;
use base64::Engine;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::messages::{AssetChunkMessage, AssetCompleteMessage};
use super::task::UploadDestination;
use super::transport::{stored_filename, Transport};
use crate::audio::{AudioAsset, RemoteReference};
use crate::error::{AudioError, AudioResult};

/// Publishes assets as base64 chunk messages over NATS
pub struct NatsTransport {
    client: Client,
    subject_prefix: String,
    chunk_size: usize,
}

impl NatsTransport {
    /// Connect to NATS server
    pub async fn connect(url: &str, subject_prefix: impl Into<String>, chunk_size: usize) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self {
            client,
            subject_prefix: subject_prefix.into(),
            chunk_size: chunk_size.max(1),
        })
    }

    async fn publish<T: serde::Serialize>(&self, subject: &str, message: &T) -> AudioResult<()> {
        let payload = serde_json::to_vec(message).map_err(|e| AudioError::TransferFailure(e.to_string()))?;

        self.client
            .publish(subject.to_string(), payload.into())
            .await
            .map_err(|e| AudioError::TransferFailure(format!("publish to {} failed: {}", subject, e)))
    }
}

/// Subject an asset's chunks are published on
pub fn chunk_subject(prefix: &str, folder: &str, asset_id: &str) -> String {
    if folder.is_empty() {
        format!("{}.chunk.{}", prefix, asset_id)
    } else {
        format!("{}.{}.chunk.{}", prefix, folder.replace('/', "."), asset_id)
    }
}

pub fn complete_subject(prefix: &str) -> String {
    format!("{}.complete", prefix)
}

#[async_trait]
impl Transport for NatsTransport {
    async fn transfer(
        &self,
        asset: Arc<AudioAsset>,
        destination: &UploadDestination,
        progress: mpsc::UnboundedSender<u64>,
    ) -> AudioResult<RemoteReference> {
        let asset_id = asset.id().to_string();
        let subject = chunk_subject(&self.subject_prefix, &destination.folder, &asset_id);
        let slices: Vec<&[u8]> = asset.bytes().chunks(self.chunk_size).collect();
        let count = slices.len() as u32;

        let mut sent = 0u64;
        for (sequence, slice) in slices.into_iter().enumerate() {
            let message = AssetChunkMessage {
                asset_id: asset_id.clone(),
                sequence: sequence as u32,
                data: base64::engine::general_purpose::STANDARD.encode(slice),
                mime: asset.format().mime.clone(),
                timestamp: Utc::now().to_rfc3339(),
                final_chunk: sequence as u32 + 1 == count,
            };
            self.publish(&subject, &message).await?;

            sent += slice.len() as u64;
            let _ = progress.send(sent);
        }

        self.client
            .flush()
            .await
            .map_err(|e| AudioError::TransferFailure(format!("flush failed: {}", e)))?;

        let filename = stored_filename(&asset, destination);
        let path = format!("{}/{}", subject, filename);
        let complete = AssetCompleteMessage {
            asset_id: asset_id.clone(),
            path: path.clone(),
            mime: asset.format().mime.clone(),
            extension: asset.format().extension.clone(),
            size_bytes: asset.len() as u64,
            duration_seconds: asset.duration_seconds(),
            chunks: count,
            timestamp: Utc::now().to_rfc3339(),
        };
        self.publish(&complete_subject(&self.subject_prefix), &complete).await?;

        debug!("Published {} chunks for asset {} on {}", count, asset_id, subject);
        info!("Uploaded asset {} over NATS ({} bytes)", asset_id, asset.len());

        Ok(RemoteReference {
            path,
            filename: Some(filename),
            uploaded_at: Utc::now(),
            size_bytes: asset.len() as u64,
            format: asset.format().clone(),
            duration_seconds: asset.duration_seconds(),
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}
