use anyhow::{Context, Result};
use hound::WavReader;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use super::backend::{AudioFrame, AudioInput, PermissionStatus};
use super::device::{DeviceStream, StreamTracks};
use crate::error::{AudioError, AudioResult};

pub struct AudioFile {
    pub path: String,
    pub duration_seconds: f64,
    pub sample_rate: u32,
    pub channels: u16,
    pub samples: Vec<i16>,
}

impl AudioFile {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        info!("Opening audio file: {}", path.display());

        let reader = WavReader::open(path)
            .context("Failed to open WAV file")?;

        let spec = reader.spec();
        if spec.bits_per_sample != 16 || spec.sample_format != hound::SampleFormat::Int {
            anyhow::bail!(
                "Expected 16-bit integer PCM, got {}-bit {:?}",
                spec.bits_per_sample,
                spec.sample_format
            );
        }

        let samples: Vec<i16> = reader
            .into_samples::<i16>()
            .collect::<Result<Vec<_>, _>>()
            .context("Failed to read audio samples")?;

        let duration_seconds = samples.len() as f64 /
            (spec.sample_rate as f64 * spec.channels as f64);

        info!(
            "Audio file loaded: {:.1}s, {}Hz, {} channels, {} samples",
            duration_seconds,
            spec.sample_rate,
            spec.channels,
            samples.len()
        );

        Ok(Self {
            path: path.display().to_string(),
            duration_seconds,
            sample_rate: spec.sample_rate,
            channels: spec.channels,
            samples,
        })
    }
}

/// Capture input that replays a WAV file at real-time pace
///
/// Useful for demos and batch runs where no microphone exists.
pub struct WavFileInput {
    path: PathBuf,
    name: String,
    frame_duration: Duration,
}

impl WavFileInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = format!("wav-file:{}", path.display());
        Self {
            path,
            name,
            frame_duration: Duration::from_millis(100),
        }
    }

    /// Probe the file's format without opening a stream
    pub fn spec(&self) -> Result<hound::WavSpec> {
        let reader = WavReader::open(&self.path).context("Failed to open WAV file")?;
        Ok(reader.spec())
    }
}

struct ReplayTracks {
    task: JoinHandle<()>,
}

impl StreamTracks for ReplayTracks {
    fn stop(&mut self) {
        self.task.abort();
    }
}

#[async_trait::async_trait]
impl AudioInput for WavFileInput {
    async fn request_permission(&self) -> PermissionStatus {
        if self.path.exists() {
            PermissionStatus::Granted
        } else {
            warn!("Input file {} does not exist", self.path.display());
            PermissionStatus::Unsupported
        }
    }

    async fn open_stream(&self) -> AudioResult<DeviceStream> {
        let file = AudioFile::open(&self.path).map_err(|e| {
            warn!("Cannot open input file: {:#}", e);
            AudioError::DeviceNotFound
        })?;

        let samples_per_frame = ((file.sample_rate as u64 * self.frame_duration.as_millis() as u64
            / 1000) as usize
            * file.channels as usize)
            .max(file.channels as usize);
        let frame_ms = self.frame_duration.as_millis() as u64;
        let (tx, rx) = mpsc::channel(100);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(Duration::from_millis(frame_ms));
            for (i, block) in file.samples.chunks(samples_per_frame).enumerate() {
                ticker.tick().await;
                let frame = AudioFrame {
                    samples: block.to_vec(),
                    sample_rate: file.sample_rate,
                    channels: file.channels,
                    timestamp_ms: i as u64 * frame_ms,
                };
                if tx.send(frame).await.is_err() {
                    break;
                }
            }
            info!("Input file replay finished");
        });

        Ok(DeviceStream::new(rx, ReplayTracks { task }))
    }

    fn name(&self) -> &str {
        &self.name
    }
}
