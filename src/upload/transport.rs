use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

use super::task::UploadDestination;
use crate::audio::{AudioAsset, RemoteReference};
use crate::error::AudioResult;

/// Moves a finished asset into durable storage
///
/// Implementations report the cumulative number of bytes handed off on
/// `progress` as the transfer advances. A failed transfer returns
/// `TransferFailure`; the coordinator owns retry.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn transfer(
        &self,
        asset: Arc<AudioAsset>,
        destination: &UploadDestination,
        progress: mpsc::UnboundedSender<u64>,
    ) -> AudioResult<RemoteReference>;

    fn name(&self) -> &str;
}

/// Stored name for an asset when the destination doesn't pick one
pub fn stored_filename(asset: &AudioAsset, destination: &UploadDestination) -> String {
    match &destination.filename {
        Some(name) if !name.is_empty() => name.clone(),
        _ => format!("{}.{}", asset.id(), asset.format().extension),
    }
}
