//! Offline waveform extraction for scrubbing and visualization

mod envelope;
mod extractor;

pub use envelope::{WaveformEnvelope, DEFAULT_RESOLUTION};
pub use extractor::{WaveformExtractor, WaveformSource};
