use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use super::config::RecordingConfig;
use super::state::{RecordingEvent, RecordingSnapshot, RecordingState};
use super::timer::DurationTimer;
use crate::audio::{
    AnalysisGraph, AssetHandle, AssetRegistry, AudioAsset, CapabilityDescriptor, DeviceStream,
    Encoder, EncoderEvent, EncoderFactory, LevelMonitor, Microphone, PermissionStatus,
};
use crate::error::{AudioError, AudioResult};

#[derive(Debug, Clone, Copy)]
enum Action {
    Start,
    Pause,
    Resume,
    Stop,
    Reset,
}

struct Command {
    action: Action,
    reply: oneshot::Sender<AudioResult<()>>,
}

/// Resources held while Recording or Paused; released together
struct ActiveCapture {
    stream: DeviceStream,
    graph: AnalysisGraph,
    encoder: Box<dyn Encoder>,
    events: mpsc::UnboundedReceiver<EncoderEvent>,
}

impl ActiveCapture {
    fn release(mut self) {
        self.graph.teardown();
        self.stream.release();
        debug!("Capture resources released");
    }
}

/// The capture state machine
///
/// Runs as its own task and owns the device stream, the encoder, the
/// chunk buffer and the duration timer. Callers talk to it through a
/// `RecordingHandle`; commands, encoder events and timer ticks are all
/// drained by the same loop, one at a time.
pub struct RecordingSession {
    config: RecordingConfig,
    microphone: Microphone,
    encoders: Arc<dyn EncoderFactory>,
    registry: AssetRegistry,

    commands: mpsc::Receiver<Command>,
    events: mpsc::UnboundedSender<RecordingEvent>,
    snapshot: watch::Sender<RecordingSnapshot>,
    level: LevelMonitor,

    state: RecordingState,
    elapsed_seconds: u64,
    descriptor: Option<CapabilityDescriptor>,
    chunks: Vec<Vec<u8>>,
    chunks_recorded: usize,
    error_reason: Option<AudioError>,
    capture: Option<ActiveCapture>,
    timer: DurationTimer,
    unlocked: bool,

    asset: Option<Arc<AudioAsset>>,
    preview: Option<AssetHandle>,
}

impl RecordingSession {
    /// Spawn a session task
    ///
    /// The session lives until every `RecordingHandle` is dropped, then
    /// releases whatever it still holds.
    pub fn spawn(
        config: RecordingConfig,
        microphone: Microphone,
        encoders: Arc<dyn EncoderFactory>,
        registry: AssetRegistry,
    ) -> (RecordingHandle, mpsc::UnboundedReceiver<RecordingEvent>) {
        let (command_tx, command_rx) = mpsc::channel(16);
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) =
            watch::channel(RecordingSnapshot::idle(config.max_duration_secs));
        let level = LevelMonitor::new();

        let session = Self {
            config,
            microphone,
            encoders,
            registry,
            commands: command_rx,
            events: events_tx,
            snapshot: snapshot_tx,
            level: level.clone(),
            state: RecordingState::Idle,
            elapsed_seconds: 0,
            descriptor: None,
            chunks: Vec::new(),
            chunks_recorded: 0,
            error_reason: None,
            capture: None,
            timer: DurationTimer::new(Duration::from_secs(1)),
            unlocked: false,
            asset: None,
            preview: None,
        };

        tokio::spawn(session.run());

        let handle = RecordingHandle {
            commands: command_tx,
            snapshot: snapshot_rx,
            level,
        };
        (handle, events_rx)
    }

    async fn run(mut self) {
        info!("Recording session ready on {}", self.microphone.name());

        loop {
            tokio::select! {
                command = self.commands.recv() => match command {
                    Some(Command { action, reply }) => {
                        let result = self.handle(action).await;
                        let _ = reply.send(result);
                    }
                    None => break,
                },
                event = next_encoder_event(&mut self.capture) => {
                    self.on_encoder_event(event);
                }
                _ = self.timer.tick(), if self.timer.is_running() => {
                    self.on_tick().await;
                }
            }
        }

        self.teardown();
        info!("Recording session closed");
    }

    async fn handle(&mut self, action: Action) -> AudioResult<()> {
        debug!("Recording command {:?} in state {:?}", action, self.state);
        match action {
            Action::Start => self.start().await,
            Action::Pause => self.pause().await,
            Action::Resume => self.resume(),
            Action::Stop => {
                if !self.state.is_capturing() {
                    return Err(self.invalid("stop"));
                }
                self.complete().await
            }
            Action::Reset => {
                self.reset();
                Ok(())
            }
        }
    }

    async fn start(&mut self) -> AudioResult<()> {
        if self.state != RecordingState::Idle {
            return Err(self.invalid("start"));
        }

        self.transition(RecordingState::RequestingPermission);

        match self.acquire().await {
            Ok(capture) => {
                let tap = capture.graph.tap();
                self.capture = Some(capture);
                self.chunks.clear();
                self.chunks_recorded = 0;
                self.elapsed_seconds = 0;
                self.level.attach(tap);
                self.timer.clear();
                self.timer.start();
                self.transition(RecordingState::Recording);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Negotiate, unlock, ask permission, open the device and start the
    /// encoder. Anything acquired before a failing step is dropped (and so
    /// released) on the early return.
    async fn acquire(&mut self) -> AudioResult<ActiveCapture> {
        let descriptor = CapabilityDescriptor::resolve(
            &self.config.formats,
            self.encoders.as_ref(),
            self.config.device_class,
        )?;
        self.descriptor = Some(descriptor.clone());

        if !self.unlocked {
            self.microphone.unlock().await?;
            self.unlocked = true;
            debug!("Capture unlocked on {}", self.microphone.name());
        }

        match self.microphone.request_permission().await {
            PermissionStatus::Granted => {}
            PermissionStatus::Denied => return Err(AudioError::PermissionDenied),
            PermissionStatus::Unsupported => return Err(AudioError::DeviceNotFound),
        }

        let mut stream = self.microphone.open().await?;
        let frames = stream.take_frames().ok_or(AudioError::DeviceNotFound)?;

        let mut encoder = self.encoders.create(&descriptor)?;
        let (input_tx, input_rx) = mpsc::channel(100);
        let graph = AnalysisGraph::spawn(frames, input_tx);
        let events = encoder.start(input_rx, descriptor.timeslice).await?;

        info!(
            "Capturing {} on {} ({}ms chunks)",
            descriptor.format.mime,
            self.microphone.name(),
            descriptor.timeslice.as_millis()
        );

        Ok(ActiveCapture {
            stream,
            graph,
            encoder,
            events,
        })
    }

    async fn pause(&mut self) -> AudioResult<()> {
        if self.state != RecordingState::Recording {
            return Err(self.invalid("pause"));
        }

        let paused = match self.capture.as_mut() {
            Some(capture) => capture.encoder.pause().await,
            None => Err(AudioError::EncoderFault("no active encoder".to_string())),
        };
        if let Err(e) = paused {
            self.fail(e.clone());
            return Err(e);
        }

        // Chunks flushed up to the pause hold audio captured while Recording
        if let Err(e) = self.collect_pending_chunks() {
            self.fail(e.clone());
            return Err(e);
        }

        self.timer.cancel();
        self.sync_elapsed();
        self.level.detach();
        self.transition(RecordingState::Paused);
        Ok(())
    }

    fn collect_pending_chunks(&mut self) -> AudioResult<()> {
        let Some(capture) = self.capture.as_mut() else {
            return Ok(());
        };

        while let Ok(event) = capture.events.try_recv() {
            match event {
                EncoderEvent::DataAvailable(chunk) => {
                    self.chunks.push(chunk);
                    self.chunks_recorded += 1;
                }
                EncoderEvent::Fault(reason) => return Err(AudioError::EncoderFault(reason)),
            }
        }
        Ok(())
    }

    fn resume(&mut self) -> AudioResult<()> {
        if self.state != RecordingState::Paused {
            return Err(self.invalid("resume"));
        }

        let resumed = match self.capture.as_mut() {
            Some(capture) => capture.encoder.resume().map(|_| capture.graph.tap()),
            None => Err(AudioError::EncoderFault("no active encoder".to_string())),
        };

        match resumed {
            Ok(tap) => {
                self.level.attach(tap);
                self.timer.start();
                self.transition(RecordingState::Recording);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    /// Finalize the encoder, release the device and assemble the asset
    async fn complete(&mut self) -> AudioResult<()> {
        self.timer.cancel();
        self.sync_elapsed();
        self.level.detach();

        let Some(mut capture) = self.capture.take() else {
            return Err(self.invalid("stop"));
        };

        if let Err(e) = capture.encoder.stop().await {
            capture.release();
            self.fail(e.clone());
            return Err(e);
        }

        // The final flush is queued before stop() returns
        self.capture = Some(capture);
        let collected = self.collect_pending_chunks();
        if let Some(capture) = self.capture.take() {
            capture.release();
        }
        if let Err(e) = collected {
            self.fail(e.clone());
            return Err(e);
        }

        let format = match &self.descriptor {
            Some(descriptor) => descriptor.format.clone(),
            None => {
                let e = AudioError::EncoderFault("capture finished without a format".to_string());
                self.fail(e.clone());
                return Err(e);
            }
        };

        let duration_seconds = self.elapsed_seconds;
        let asset = Arc::new(AudioAsset::assemble(
            std::mem::take(&mut self.chunks),
            format,
            duration_seconds,
        ));
        self.preview = Some(self.registry.register(Arc::clone(&asset)));
        self.asset = Some(Arc::clone(&asset));

        info!(
            "Recording complete: {}s, {} chunks, {} bytes",
            duration_seconds,
            self.chunks_recorded,
            asset.len()
        );

        self.transition(RecordingState::Completed);
        self.emit(RecordingEvent::Completed {
            asset,
            duration_seconds,
        });
        Ok(())
    }

    fn reset(&mut self) {
        if self.state == RecordingState::Idle {
            return;
        }

        self.timer.cancel();
        self.level.detach();
        if let Some(capture) = self.capture.take() {
            warn!("Discarding active capture on reset");
            capture.release();
        }

        // Dropping the handle revokes it
        self.preview = None;
        self.asset = None;
        self.chunks.clear();
        self.chunks_recorded = 0;
        self.error_reason = None;
        self.descriptor = None;

        self.transition(RecordingState::Idle);
    }

    fn fail(&mut self, reason: AudioError) {
        self.timer.cancel();
        self.level.detach();
        if let Some(capture) = self.capture.take() {
            capture.release();
        }
        self.chunks.clear();

        error!("Recording failed: {}", reason);
        self.error_reason = Some(reason.clone());
        self.transition(RecordingState::Error);
        self.emit(RecordingEvent::Error { reason });
    }

    fn on_encoder_event(&mut self, event: Option<EncoderEvent>) {
        match event {
            Some(EncoderEvent::DataAvailable(chunk)) => {
                if self.state == RecordingState::Recording {
                    self.chunks.push(chunk);
                    self.chunks_recorded += 1;
                    self.publish();
                } else {
                    warn!(
                        "Dropping {} byte chunk delivered while {}",
                        chunk.len(),
                        self.state.as_str()
                    );
                }
            }
            Some(EncoderEvent::Fault(reason)) => {
                self.fail(AudioError::EncoderFault(reason));
            }
            None => {
                self.fail(AudioError::EncoderFault(
                    "encoder stopped delivering events".to_string(),
                ));
            }
        }
    }

    async fn on_tick(&mut self) {
        if self.state != RecordingState::Recording {
            self.timer.cancel();
            return;
        }

        let before = self.elapsed_seconds;
        self.sync_elapsed();
        if self.elapsed_seconds == before {
            return;
        }

        self.emit(RecordingEvent::Tick {
            elapsed_seconds: self.elapsed_seconds,
        });
        self.publish();

        if self.elapsed_seconds >= self.config.max_duration_secs {
            info!(
                "Maximum duration of {}s reached, stopping",
                self.config.max_duration_secs
            );
            // Errors are already reported through fail()
            let _ = self.complete().await;
        }
    }

    /// Whole seconds spent Recording, capped at the maximum duration
    fn sync_elapsed(&mut self) {
        let counted = self
            .timer
            .elapsed()
            .as_secs()
            .min(self.config.max_duration_secs);
        self.elapsed_seconds = self.elapsed_seconds.max(counted);
    }

    fn teardown(&mut self) {
        self.timer.cancel();
        self.level.detach();
        if let Some(capture) = self.capture.take() {
            capture.release();
        }
        self.preview = None;
    }

    fn transition(&mut self, next: RecordingState) {
        if self.state != next {
            info!("Recording: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
        self.emit(RecordingEvent::StateChanged(next));
        self.publish();
    }

    fn emit(&self, event: RecordingEvent) {
        // Nobody listening is fine
        let _ = self.events.send(event);
    }

    fn publish(&self) {
        self.snapshot.send_replace(RecordingSnapshot {
            state: self.state,
            elapsed_seconds: self.elapsed_seconds,
            max_duration_seconds: self.config.max_duration_secs,
            format: self.descriptor.as_ref().map(|d| d.format.clone()),
            chunks_recorded: self.chunks_recorded,
            error_reason: self.error_reason.as_ref().map(ToString::to_string),
            asset_id: self.asset.as_ref().map(|a| a.id()),
        });
    }

    fn invalid(&self, action: &'static str) -> AudioError {
        AudioError::InvalidTransition {
            state: self.state.as_str(),
            action,
        }
    }
}

async fn next_encoder_event(capture: &mut Option<ActiveCapture>) -> Option<EncoderEvent> {
    match capture {
        Some(capture) => capture.events.recv().await,
        None => std::future::pending().await,
    }
}

/// Cloneable control surface of a running `RecordingSession`
#[derive(Clone)]
pub struct RecordingHandle {
    commands: mpsc::Sender<Command>,
    snapshot: watch::Receiver<RecordingSnapshot>,
    level: LevelMonitor,
}

impl RecordingHandle {
    pub async fn start(&self) -> AudioResult<()> {
        self.send(Action::Start).await
    }

    pub async fn pause(&self) -> AudioResult<()> {
        self.send(Action::Pause).await
    }

    pub async fn resume(&self) -> AudioResult<()> {
        self.send(Action::Resume).await
    }

    pub async fn stop(&self) -> AudioResult<()> {
        self.send(Action::Stop).await
    }

    /// Return to Idle, revoking the previous asset's preview handle
    pub async fn reset(&self) -> AudioResult<()> {
        self.send(Action::Reset).await
    }

    pub fn snapshot(&self) -> RecordingSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn state(&self) -> RecordingState {
        self.snapshot.borrow().state
    }

    /// Watch snapshot changes
    pub fn subscribe(&self) -> watch::Receiver<RecordingSnapshot> {
        self.snapshot.clone()
    }

    /// Current input level (0.0 - 1.0); 0.0 unless Recording
    pub fn level(&self) -> f32 {
        self.level.sample()
    }

    pub fn level_monitor(&self) -> &LevelMonitor {
        &self.level
    }

    async fn send(&self, action: Action) -> AudioResult<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command { action, reply })
            .await
            .map_err(|_| AudioError::Cancelled)?;
        response.await.map_err(|_| AudioError::Cancelled)?
    }
}
