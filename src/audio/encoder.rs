use std::io::Cursor;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::backend::AudioFrame;
use super::format::{CapabilityDescriptor, CapabilityProbe, EncodingFormat};
use crate::error::{AudioError, AudioResult};

/// Event delivered by a running encoder
#[derive(Debug, Clone, PartialEq)]
pub enum EncoderEvent {
    /// One encoded chunk, in recording order
    DataAvailable(Vec<u8>),
    /// The encoder failed and will produce nothing more
    Fault(String),
}

/// Encoder trait
///
/// Consumes PCM frames and periodically emits encoded chunks.
#[async_trait::async_trait]
pub trait Encoder: Send {
    /// Start encoding
    ///
    /// Returns a channel receiver that will receive encoder events. A chunk
    /// is emitted at most once per `timeslice`.
    async fn start(
        &mut self,
        input: mpsc::Receiver<AudioFrame>,
        timeslice: Duration,
    ) -> AudioResult<mpsc::UnboundedReceiver<EncoderEvent>>;

    /// Stop consuming input
    ///
    /// Audio accepted before the pause is flushed as a chunk, and that
    /// chunk is queued on the event channel before this returns.
    async fn pause(&mut self) -> AudioResult<()>;

    fn resume(&mut self) -> AudioResult<()>;

    /// Flush buffered audio as a final chunk and close the event channel
    async fn stop(&mut self) -> AudioResult<()>;
}

/// Creates encoders for a negotiated format
pub trait EncoderFactory: CapabilityProbe {
    fn create(&self, descriptor: &CapabilityDescriptor) -> AudioResult<Box<dyn Encoder>>;
}

/// Apply container fix-ups that need the whole byte sequence
pub fn finalize_container(format: &EncodingFormat, bytes: &mut [u8]) {
    if format.is_wav() {
        patch_wav_sizes(bytes);
    }
}

/// Rewrite the RIFF and `data` chunk sizes of a streamed WAV file
pub fn patch_wav_sizes(bytes: &mut [u8]) {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return;
    }

    let riff_size = (bytes.len() - 8) as u32;
    bytes[4..8].copy_from_slice(&riff_size.to_le_bytes());

    let mut offset = 12;
    while offset + 8 <= bytes.len() {
        let id = [bytes[offset], bytes[offset + 1], bytes[offset + 2], bytes[offset + 3]];
        if &id == b"data" {
            let data_size = (bytes.len() - offset - 8) as u32;
            bytes[offset + 4..offset + 8].copy_from_slice(&data_size.to_le_bytes());
            return;
        }

        let size = u32::from_le_bytes([
            bytes[offset + 4],
            bytes[offset + 5],
            bytes[offset + 6],
            bytes[offset + 7],
        ]) as usize;
        offset += 8 + size + (size & 1);
    }
}

fn wav_header(spec: hound::WavSpec) -> AudioResult<Vec<u8>> {
    let mut cursor = Cursor::new(Vec::new());
    let writer = hound::WavWriter::new(&mut cursor, spec)
        .map_err(|e| AudioError::EncoderFault(format!("Failed to write WAV header: {}", e)))?;
    writer
        .finalize()
        .map_err(|e| AudioError::EncoderFault(format!("Failed to finalize WAV header: {}", e)))?;

    Ok(cursor.into_inner())
}

enum Control {
    Pause(oneshot::Sender<()>),
    Resume,
    Stop(oneshot::Sender<()>),
}

/// 16-bit PCM WAV encoder
///
/// The first chunk carries the RIFF header with zero sizes; the sizes are
/// patched when the chunks are assembled into an asset.
pub struct WavEncoder {
    spec: hound::WavSpec,
    control: Option<mpsc::UnboundedSender<Control>>,
}

impl WavEncoder {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            spec: hound::WavSpec {
                channels,
                sample_rate,
                bits_per_sample: 16,
                sample_format: hound::SampleFormat::Int,
            },
            control: None,
        }
    }

    fn send(&self, control: Control) -> AudioResult<()> {
        match &self.control {
            Some(tx) => tx
                .send(control)
                .map_err(|_| AudioError::EncoderFault("encoder task has exited".to_string())),
            None => Err(AudioError::EncoderFault("encoder not started".to_string())),
        }
    }
}

#[async_trait::async_trait]
impl Encoder for WavEncoder {
    async fn start(
        &mut self,
        input: mpsc::Receiver<AudioFrame>,
        timeslice: Duration,
    ) -> AudioResult<mpsc::UnboundedReceiver<EncoderEvent>> {
        if self.control.is_some() {
            return Err(AudioError::EncoderFault("encoder already started".to_string()));
        }

        let header = wav_header(self.spec)?;
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let task = WavEncoderTask {
            spec: self.spec,
            header: Some(header),
            pending: Vec::new(),
            paused: false,
            events: events_tx,
        };
        tokio::spawn(task.run(input, control_rx, timeslice));

        self.control = Some(control_tx);
        info!(
            "WAV encoder started ({}Hz, {} channels, {}ms chunks)",
            self.spec.sample_rate,
            self.spec.channels,
            timeslice.as_millis()
        );

        Ok(events_rx)
    }

    async fn pause(&mut self) -> AudioResult<()> {
        let (ack_tx, ack_rx) = oneshot::channel();
        self.send(Control::Pause(ack_tx))?;
        ack_rx
            .await
            .map_err(|_| AudioError::EncoderFault("encoder exited while pausing".to_string()))
    }

    fn resume(&mut self) -> AudioResult<()> {
        self.send(Control::Resume)
    }

    async fn stop(&mut self) -> AudioResult<()> {
        let Some(control) = self.control.take() else {
            return Ok(());
        };

        let (ack_tx, ack_rx) = oneshot::channel();
        if control.send(Control::Stop(ack_tx)).is_err() {
            // Task already ended (fault); nothing left to flush
            return Ok(());
        }
        let _ = ack_rx.await;

        info!("WAV encoder stopped");
        Ok(())
    }
}

struct WavEncoderTask {
    spec: hound::WavSpec,
    /// Header not yet emitted
    header: Option<Vec<u8>>,
    pending: Vec<u8>,
    paused: bool,
    events: mpsc::UnboundedSender<EncoderEvent>,
}

impl WavEncoderTask {
    async fn run(
        mut self,
        mut input: mpsc::Receiver<AudioFrame>,
        mut control: mpsc::UnboundedReceiver<Control>,
        timeslice: Duration,
    ) {
        let mut ticker = interval_at(Instant::now() + timeslice, timeslice);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut input_open = true;

        loop {
            tokio::select! {
                frame = input.recv(), if input_open => match frame {
                    Some(frame) => {
                        if let Err(reason) = self.push(&frame) {
                            warn!("WAV encoder fault: {}", reason);
                            let _ = self.events.send(EncoderEvent::Fault(reason));
                            return;
                        }
                    }
                    None => {
                        debug!("Encoder input closed");
                        input_open = false;
                    }
                },
                _ = ticker.tick() => {
                    if !self.paused {
                        self.flush(false);
                    }
                }
                cmd = control.recv() => match cmd {
                    Some(Control::Pause(ack)) => {
                        // Frames already queued were captured before the pause
                        while let Ok(frame) = input.try_recv() {
                            if let Err(reason) = self.push(&frame) {
                                warn!("WAV encoder fault: {}", reason);
                                let _ = self.events.send(EncoderEvent::Fault(reason));
                                return;
                            }
                        }
                        self.paused = true;
                        self.flush(false);
                        let _ = ack.send(());
                    }
                    Some(Control::Resume) => self.paused = false,
                    Some(Control::Stop(ack)) => {
                        self.flush(true);
                        let _ = ack.send(());
                        return;
                    }
                    None => return,
                },
            }
        }
    }

    fn push(&mut self, frame: &AudioFrame) -> Result<(), String> {
        if frame.sample_rate != self.spec.sample_rate || frame.channels != self.spec.channels {
            return Err(format!(
                "frame format {}Hz/{}ch does not match encoder {}Hz/{}ch",
                frame.sample_rate, frame.channels, self.spec.sample_rate, self.spec.channels
            ));
        }

        if self.paused {
            return Ok(());
        }

        self.pending.reserve(frame.samples.len() * 2);
        for sample in &frame.samples {
            self.pending.extend_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }

    fn flush(&mut self, final_chunk: bool) {
        if self.pending.is_empty() && !(final_chunk && self.header.is_some()) {
            return;
        }

        let chunk = match self.header.take() {
            Some(mut header) => {
                header.append(&mut self.pending);
                header
            }
            None => std::mem::take(&mut self.pending),
        };

        debug!("Encoded chunk: {} bytes (final={})", chunk.len(), final_chunk);
        let _ = self.events.send(EncoderEvent::DataAvailable(chunk));
    }
}

/// Produces `WavEncoder`s; the only encoding this build supports
#[derive(Debug, Clone)]
pub struct WavEncoderFactory {
    pub sample_rate: u32,
    pub channels: u16,
}

impl WavEncoderFactory {
    pub fn new(sample_rate: u32, channels: u16) -> Self {
        Self {
            sample_rate,
            channels,
        }
    }
}

impl CapabilityProbe for WavEncoderFactory {
    fn supports(&self, mime: &str) -> bool {
        matches!(mime, "audio/wav" | "audio/wave" | "audio/x-wav")
    }
}

impl EncoderFactory for WavEncoderFactory {
    fn create(&self, descriptor: &CapabilityDescriptor) -> AudioResult<Box<dyn Encoder>> {
        if !self.supports(&descriptor.format.mime) {
            return Err(AudioError::FormatUnsupported);
        }
        Ok(Box::new(WavEncoder::new(self.sample_rate, self.channels)))
    }
}
