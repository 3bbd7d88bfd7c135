//! Live input level for capture feedback
//!
//! The analysis graph sits between the device stream and the encoder and
//! keeps the most recent frame in a `watch` slot. `LevelMonitor::sample()`
//! computes a level from that slot on demand, so the UI drives the sampling
//! cadence (one call per rendered frame) and nothing is computed while
//! nobody is looking.

use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::debug;

use super::backend::AudioFrame;

pub type Tap = watch::Receiver<Option<Arc<AudioFrame>>>;

/// Normalized level (0.0 - 1.0) of a block of samples.
///
/// Mean absolute amplitude divided by full scale; the time-domain
/// equivalent of averaging the magnitude spectrum across bins.
pub fn frame_level(samples: &[i16]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples.iter().map(|&s| (s as f64).abs()).sum();
    let mean = sum / samples.len() as f64;
    (mean / 32768.0).clamp(0.0, 1.0) as f32
}

/// Reads the input level while attached to an active stream
#[derive(Clone, Default)]
pub struct LevelMonitor {
    tap: Arc<Mutex<Option<Tap>>>,
}

impl LevelMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attach(&self, tap: Tap) {
        *self.lock() = Some(tap);
        debug!("Level monitor attached");
    }

    /// Stop sampling. Subsequent reads return 0.0.
    pub fn detach(&self) {
        if self.lock().take().is_some() {
            debug!("Level monitor detached");
        }
    }

    pub fn is_attached(&self) -> bool {
        self.lock().is_some()
    }

    /// Current level; call once per rendered frame
    pub fn sample(&self) -> f32 {
        match self.lock().as_ref() {
            Some(tap) => tap
                .borrow()
                .as_deref()
                .map(|frame| frame_level(&frame.samples))
                .unwrap_or(0.0),
            None => 0.0,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Tap>> {
        self.tap.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Forwards device frames to the encoder, publishing each one to the level tap
pub struct AnalysisGraph {
    tap: Tap,
    task: Option<JoinHandle<()>>,
}

impl AnalysisGraph {
    pub fn spawn(mut frames: mpsc::Receiver<AudioFrame>, encoder_input: mpsc::Sender<AudioFrame>) -> Self {
        let (tap_tx, tap) = watch::channel(None);

        let task = tokio::spawn(async move {
            while let Some(frame) = frames.recv().await {
                tap_tx.send_replace(Some(Arc::new(frame.clone())));

                if encoder_input.send(frame).await.is_err() {
                    break;
                }
            }
            debug!("Analysis graph input closed");
        });

        Self {
            tap,
            task: Some(task),
        }
    }

    pub fn tap(&self) -> Tap {
        self.tap.clone()
    }

    pub fn teardown(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
            debug!("Analysis graph torn down");
        }
    }
}

impl Drop for AnalysisGraph {
    fn drop(&mut self) {
        self.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_level_silence() {
        assert_eq!(frame_level(&[0; 512]), 0.0);
        assert_eq!(frame_level(&[]), 0.0);
    }

    #[test]
    fn test_frame_level_full_scale() {
        let level = frame_level(&[i16::MIN; 64]);
        assert!((level - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn test_frame_level_half_scale() {
        let samples: Vec<i16> = (0..100).map(|i| if i % 2 == 0 { 16384 } else { -16384 }).collect();
        let level = frame_level(&samples);
        assert!((level - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_detached_monitor_reads_zero() {
        let monitor = LevelMonitor::new();
        let (tx, rx) = watch::channel(Some(Arc::new(AudioFrame {
            samples: vec![i16::MAX; 16],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: 0,
        })));

        monitor.attach(rx);
        assert!(monitor.sample() > 0.9);

        monitor.detach();
        assert!(!monitor.is_attached());
        assert_eq!(monitor.sample(), 0.0);
        drop(tx);
    }
}
