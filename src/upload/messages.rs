use serde::{Deserialize, Serialize};

/// One slice of an asset published to NATS
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetChunkMessage {
    pub asset_id: String,
    pub sequence: u32,
    pub data: String, // Base64-encoded asset bytes
    pub mime: String,
    pub timestamp: String, // RFC3339 timestamp
    #[serde(rename = "final")]
    pub final_chunk: bool,
}

/// Published after the last chunk of an asset
#[derive(Debug, Serialize, Deserialize)]
pub struct AssetCompleteMessage {
    pub asset_id: String,
    pub path: String,
    pub mime: String,
    pub extension: String,
    pub size_bytes: u64,
    pub duration_seconds: u64,
    pub chunks: u32,
    pub timestamp: String,
}
