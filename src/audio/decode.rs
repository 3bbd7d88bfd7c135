//! Decoding encoded assets to PCM
//!
//! Uses symphonia, so anything it can probe (WAV, MP3, FLAC, OGG, M4A, ...)
//! can be turned into per-channel samples for waveform extraction.

use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::{debug, warn};

use crate::error::{AudioError, AudioResult};

/// Decoded PCM, one vector per channel
#[derive(Debug, Clone, Default)]
pub struct DecodedAudio {
    pub sample_rate: u32,
    pub channels: Vec<Vec<f32>>,
}

impl DecodedAudio {
    pub fn first_channel(&self) -> &[f32] {
        self.channels.first().map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn duration_seconds(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.first_channel().len() as f64 / self.sample_rate as f64
    }
}

/// Converts an encoded byte sequence to PCM
pub trait AudioDecoder: Send + Sync {
    /// `extension` is a container hint such as `wav` or `webm`
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> AudioResult<DecodedAudio>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SymphoniaDecoder;

impl AudioDecoder for SymphoniaDecoder {
    fn decode(&self, bytes: &[u8], extension: Option<&str>) -> AudioResult<DecodedAudio> {
        if bytes.is_empty() {
            return Err(AudioError::DecodeFailure("empty input".to_string()));
        }

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());

        let mut hint = Hint::new();
        if let Some(ext) = extension {
            hint.with_extension(ext);
        }

        let probed = symphonia::default::get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| AudioError::DecodeFailure(format!("probe failed: {}", e)))?;

        let mut format = probed.format;

        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| AudioError::DecodeFailure("no audio tracks found".to_string()))?;

        let track_id = track.id;
        let sample_rate = track.codec_params.sample_rate.unwrap_or(0);
        let channel_count = track.codec_params.channels.map(|c| c.count()).unwrap_or(1);

        let mut decoder = symphonia::default::get_codecs()
            .make(&track.codec_params, &DecoderOptions::default())
            .map_err(|e| AudioError::DecodeFailure(format!("unsupported codec: {}", e)))?;

        let mut channels: Vec<Vec<f32>> = vec![Vec::new(); channel_count.max(1)];

        loop {
            let packet = match format.next_packet() {
                Ok(p) => p,
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    break;
                }
                Err(SymphoniaError::ResetRequired) => break,
                Err(e) => return Err(AudioError::DecodeFailure(e.to_string())),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let spec = *decoded.spec();
                    let n = spec.channels.count().max(1);
                    if channels.len() < n {
                        channels.resize(n, Vec::new());
                    }

                    let mut buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
                    buf.copy_interleaved_ref(decoded);

                    for frame in buf.samples().chunks(n) {
                        for (ch, &sample) in frame.iter().enumerate() {
                            channels[ch].push(sample);
                        }
                    }
                }
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!("Skipping undecodable packet: {}", e);
                    continue;
                }
                Err(e) => return Err(AudioError::DecodeFailure(e.to_string())),
            }
        }

        debug!(
            "Decoded {} channels, {} samples per channel at {}Hz",
            channels.len(),
            channels[0].len(),
            sample_rate
        );

        Ok(DecodedAudio {
            sample_rate,
            channels,
        })
    }
}
