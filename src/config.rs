use anyhow::{Context, Result};
use serde::Deserialize;
use std::time::Duration;

use crate::recording::RecordingConfig;
use crate::upload::UploadDestination;
use crate::waveform::DEFAULT_RESOLUTION;

/// Service configuration
///
/// Read from a TOML file, then overridden by `PRACTICE_AUDIO__*`
/// environment variables (e.g. `PRACTICE_AUDIO__SERVICE__HTTP__PORT`).
/// Every section has defaults, so a missing file still yields a config.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub recording: RecordingConfig,
    pub device: DeviceConfig,
    pub waveform: WaveformConfig,
    pub playback: PlaybackConfig,
    pub upload: UploadConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "practice-audio".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

/// Capture device used by the server
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// WAV file replayed as the microphone; recording routes are
    /// unavailable when unset
    pub input_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WaveformConfig {
    /// Number of envelope points
    pub resolution: usize,
}

impl Default for WaveformConfig {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PlaybackConfig {
    /// Interval between playback time updates
    pub time_update_ms: u64,
}

impl PlaybackConfig {
    pub fn time_update_interval(&self) -> Duration {
        Duration::from_millis(self.time_update_ms.max(1))
    }
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self { time_update_ms: 250 }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Root directory of the filesystem store
    pub storage_path: String,
    /// Folder inside the store that recordings go to
    pub folder: String,
    /// Upload every completed recording without being asked
    pub auto_upload: bool,
    /// Bytes per write (filesystem) or per message (NATS)
    pub chunk_size: usize,
    /// Publish over NATS instead of writing to `storage_path`
    pub nats_url: Option<String>,
    pub nats_subject: String,
}

impl UploadConfig {
    pub fn destination(&self) -> UploadDestination {
        UploadDestination::new(self.folder.clone())
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            storage_path: "recordings".to_string(),
            folder: "practice".to_string(),
            auto_upload: false,
            chunk_size: 64 * 1024,
            nats_url: None,
            nats_subject: "practice.audio".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(
                config::Environment::with_prefix("PRACTICE_AUDIO")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .with_context(|| format!("Failed to read config from {}", path))?;

        settings
            .try_deserialize()
            .context("Invalid configuration")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::DeviceClass;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("absent");
        let cfg = Config::load(path.to_str().unwrap_or_default())?;

        assert_eq!(cfg.service.http.port, 8787);
        assert_eq!(cfg.recording.max_duration_secs, 180);
        assert_eq!(cfg.waveform.resolution, 100);
        assert_eq!(cfg.playback.time_update_ms, 250);
        assert!(!cfg.upload.auto_upload);
        assert!(cfg.device.input_path.is_none());
        Ok(())
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("practice.toml");
        let mut file = std::fs::File::create(&path)?;
        writeln!(file, "[recording]\nmax_duration_secs = 60\ndevice_class = \"constrained\"")?;
        writeln!(file, "[upload]\nauto_upload = true")?;
        drop(file);

        let cfg = Config::load(path.to_str().unwrap_or_default())?;

        assert_eq!(cfg.recording.max_duration_secs, 60);
        assert_eq!(cfg.recording.device_class, DeviceClass::Constrained);
        assert_eq!(cfg.recording.sample_rate, 48000);
        assert!(cfg.upload.auto_upload);
        assert_eq!(cfg.upload.chunk_size, 64 * 1024);
        assert_eq!(cfg.service.name, "practice-audio");
        Ok(())
    }
}
