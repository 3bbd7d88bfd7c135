use serde::{Deserialize, Serialize};

/// Default number of envelope samples
pub const DEFAULT_RESOLUTION: usize = 100;

/// Fixed-resolution amplitude summary of an asset
///
/// Always exactly `resolution` samples in [0.0, 1.0]. The loudest block is
/// exactly 1.0 unless the signal is silent, in which case every sample is 0.0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaveformEnvelope {
    pub samples: Vec<f32>,
}

impl WaveformEnvelope {
    pub fn silent(resolution: usize) -> Self {
        Self {
            samples: vec![0.0; resolution],
        }
    }

    /// Build an envelope from PCM samples
    ///
    /// The input is split into `resolution` contiguous blocks whose bounds
    /// are spread evenly over the input; a block that would be empty (input
    /// shorter than the resolution) takes the single sample at its start.
    /// Each block contributes its mean absolute amplitude, and all blocks
    /// are normalized by the largest.
    pub fn from_samples(samples: &[f32], resolution: usize) -> Self {
        if resolution == 0 {
            return Self { samples: Vec::new() };
        }
        if samples.is_empty() {
            return Self::silent(resolution);
        }

        let len = samples.len();
        let mut blocks = Vec::with_capacity(resolution);

        for i in 0..resolution {
            let start = (i * len / resolution).min(len - 1);
            let end = ((i + 1) * len / resolution).clamp(start + 1, len);

            let block = &samples[start..end];
            let sum: f64 = block.iter().map(|s| (*s as f64).abs()).sum();
            blocks.push((sum / block.len() as f64) as f32);
        }

        let max = blocks.iter().copied().fold(0.0f32, f32::max);
        if max <= 0.0 || !max.is_finite() {
            return Self::silent(resolution);
        }

        for value in &mut blocks {
            *value /= max;
        }

        Self { samples: blocks }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn is_silent(&self) -> bool {
        self.samples.iter().all(|s| *s == 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_block_bounds_cover_input() {
        let samples: Vec<f32> = (0..1000).map(|i| if i < 500 { 0.5 } else { 1.0 }).collect();
        let envelope = WaveformEnvelope::from_samples(&samples, 10);

        assert_eq!(envelope.len(), 10);
        assert!((envelope.samples[0] - 0.5).abs() < 1e-6);
        assert_eq!(envelope.samples[9], 1.0);
    }

    #[test]
    fn test_short_input_fills_every_block() {
        let envelope = WaveformEnvelope::from_samples(&[0.25, -1.0, 0.5], 100);

        assert_eq!(envelope.len(), 100);
        assert!(envelope.samples.iter().all(|s| *s > 0.0));
        assert_eq!(envelope.samples.iter().copied().fold(0.0, f32::max), 1.0);
    }

    #[test]
    fn test_silence_yields_zero_envelope() {
        for len in [1, 37, 100, 44100] {
            let envelope = WaveformEnvelope::from_samples(&vec![0.0; len], 100);
            assert_eq!(envelope.len(), 100);
            assert!(envelope.is_silent(), "{} silent samples", len);
        }
    }
}
