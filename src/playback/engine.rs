use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::download::download_filename;
use super::sink::{MediaLocator, PlaybackSink, SinkEvent};
use super::speed::PlaybackSpeed;
use crate::audio::{AssetFetcher, AssetHandle, AssetRegistry, AudioAsset, EncodingFormat, RemoteReference};
use crate::error::{AudioError, AudioResult};
use crate::waveform::{WaveformEnvelope, WaveformExtractor, WaveformSource};

/// Playback state machine states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybackState {
    Idle,
    Loading,
    Playing,
    Paused,
    Ended,
    Error,
}

impl PlaybackState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Loading => "loading",
            Self::Playing => "playing",
            Self::Paused => "paused",
            Self::Ended => "ended",
            Self::Error => "in error",
        }
    }
}

/// What the engine plays: exactly one of an in-memory asset or a remote one
#[derive(Debug, Clone)]
pub enum PlaybackSource {
    InMemory(Arc<AudioAsset>),
    Remote(RemoteReference),
}

impl PlaybackSource {
    pub fn format(&self) -> &EncodingFormat {
        match self {
            PlaybackSource::InMemory(asset) => asset.format(),
            PlaybackSource::Remote(reference) => &reference.format,
        }
    }

    fn waveform_source(&self) -> WaveformSource {
        match self {
            PlaybackSource::InMemory(asset) => WaveformSource::InMemory(Arc::clone(asset)),
            PlaybackSource::Remote(reference) => WaveformSource::Remote(reference.clone()),
        }
    }
}

/// Outward notifications from the engine
#[derive(Debug, Clone, PartialEq)]
pub enum PlaybackEvent {
    TimeUpdate(f64),
    Ended,
    Error(AudioError),
}

/// Normalized horizontal position of a pointer on a seek surface
pub fn position_fraction(x: f64, width: f64) -> f64 {
    if width <= 0.0 || x.is_nan() {
        return 0.0;
    }
    (x / width).clamp(0.0, 1.0)
}

/// Seek target for a normalized position
pub fn fraction_to_time(fraction: f64, duration: f64) -> f64 {
    let fraction = if fraction.is_nan() { 0.0 } else { fraction.clamp(0.0, 1.0) };
    fraction * duration
}

/// The playback state machine
///
/// Owned by its caller, who drains sink progress with `next_event()`.
/// In-memory sources are handed to the sink through a temporary asset
/// handle that is revoked on retarget, `unload()` and drop.
pub struct PlaybackEngine {
    sink: Box<dyn PlaybackSink>,
    sink_events: mpsc::UnboundedReceiver<SinkEvent>,
    registry: AssetRegistry,
    waveforms: Option<Arc<WaveformExtractor>>,
    fetcher: Option<Arc<dyn AssetFetcher>>,

    state: PlaybackState,
    current_time: f64,
    duration: f64,
    volume: f32,
    muted: bool,
    pre_mute_volume: f32,
    speed: PlaybackSpeed,

    source: Option<PlaybackSource>,
    handle: Option<AssetHandle>,
    ready: bool,
    error_reason: Option<AudioError>,
    waveform: Option<Arc<WaveformEnvelope>>,
}

impl PlaybackEngine {
    pub fn new(
        sink: Box<dyn PlaybackSink>,
        sink_events: mpsc::UnboundedReceiver<SinkEvent>,
        registry: AssetRegistry,
    ) -> Self {
        Self {
            sink,
            sink_events,
            registry,
            waveforms: None,
            fetcher: None,
            state: PlaybackState::Idle,
            current_time: 0.0,
            duration: 0.0,
            volume: 1.0,
            muted: false,
            pre_mute_volume: 1.0,
            speed: PlaybackSpeed::Normal,
            source: None,
            handle: None,
            ready: false,
            error_reason: None,
            waveform: None,
        }
    }

    /// Use an extractor for scrub visuals
    pub fn with_waveforms(mut self, extractor: Arc<WaveformExtractor>) -> Self {
        self.waveforms = Some(extractor);
        self
    }

    /// Needed to download remote sources
    pub fn with_fetcher(mut self, fetcher: Arc<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn state(&self) -> PlaybackState {
        self.state
    }

    pub fn current_time(&self) -> f64 {
        self.current_time
    }

    pub fn duration(&self) -> f64 {
        self.duration
    }

    /// Slider volume; the output is silent while muted
    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    pub fn effective_volume(&self) -> f32 {
        if self.muted {
            0.0
        } else {
            self.volume
        }
    }

    pub fn speed(&self) -> PlaybackSpeed {
        self.speed
    }

    pub fn source(&self) -> Option<&PlaybackSource> {
        self.source.as_ref()
    }

    pub fn error_reason(&self) -> Option<&AudioError> {
        self.error_reason.as_ref()
    }

    /// Playback progress (0.0 - 1.0)
    pub fn progress(&self) -> f64 {
        if self.duration <= 0.0 {
            0.0
        } else {
            self.current_time / self.duration
        }
    }

    /// Assign a new source and prepare it
    ///
    /// Retargeting revokes the previous in-memory handle.
    pub async fn load(&mut self, source: PlaybackSource) -> AudioResult<()> {
        self.sink.pause();
        self.handle = None;
        self.waveform = None;
        self.error_reason = None;
        self.source = Some(source);
        self.ready = false;
        self.current_time = 0.0;
        self.duration = 0.0;

        self.set_state(PlaybackState::Loading);
        match self.prepare().await {
            Ok(()) => {
                self.set_state(PlaybackState::Paused);
                Ok(())
            }
            Err(e) => {
                self.fail(e.clone());
                Err(e)
            }
        }
    }

    async fn prepare(&mut self) -> AudioResult<()> {
        let locator = match &self.source {
            Some(PlaybackSource::InMemory(asset)) => {
                let handle = self.registry.register(Arc::clone(asset));
                let locator = MediaLocator::Handle(handle.url().to_string());
                self.handle = Some(handle);
                locator
            }
            Some(PlaybackSource::Remote(reference)) => MediaLocator::Remote(reference.clone()),
            None => return Err(AudioError::NoSource),
        };

        let duration = self.sink.load(&locator).await?;
        self.duration = if duration.is_finite() { duration.max(0.0) } else { 0.0 };
        self.sink.set_rate(self.speed.rate());
        self.sink.set_volume(self.effective_volume());
        self.ready = true;

        debug!("Playback source ready: {:.2}s", self.duration);
        Ok(())
    }

    /// Begin or resume playback
    pub async fn play(&mut self) -> AudioResult<()> {
        match self.state {
            PlaybackState::Error => return Err(self.invalid("play")),
            PlaybackState::Playing => return Ok(()),
            _ => {}
        }
        if self.source.is_none() {
            return Err(AudioError::NoSource);
        }

        if !self.ready {
            self.set_state(PlaybackState::Loading);
            if let Err(e) = self.prepare().await {
                self.fail(e.clone());
                return Err(e);
            }
        }

        if self.state == PlaybackState::Ended {
            self.current_time = 0.0;
            self.sink.seek(0.0);
        }

        if let Err(e) = self.sink.play() {
            self.fail(e.clone());
            return Err(e);
        }
        self.set_state(PlaybackState::Playing);
        Ok(())
    }

    /// Pause, keeping the current position
    pub fn pause(&mut self) -> AudioResult<()> {
        if self.state != PlaybackState::Playing {
            return Err(self.invalid("pause"));
        }
        self.sink.pause();
        self.set_state(PlaybackState::Paused);
        Ok(())
    }

    pub async fn toggle(&mut self) -> AudioResult<()> {
        if self.state == PlaybackState::Playing {
            self.pause()
        } else {
            self.play().await
        }
    }

    /// Rewind to 0 and go Idle, whatever the current state
    pub fn stop(&mut self) {
        self.sink.pause();
        self.sink.seek(0.0);
        self.current_time = 0.0;
        self.error_reason = None;
        self.set_state(PlaybackState::Idle);
    }

    /// Drop the source and revoke its handle
    pub fn unload(&mut self) {
        self.stop();
        self.handle = None;
        self.source = None;
        self.ready = false;
        self.duration = 0.0;
        self.waveform = None;
    }

    /// Move to `seconds`, clamped to `[0, duration]`; returns the target
    pub fn seek(&mut self, seconds: f64) -> AudioResult<f64> {
        if self.state == PlaybackState::Error {
            return Err(self.invalid("seek"));
        }

        let requested = if seconds.is_nan() { 0.0 } else { seconds };
        let target = requested.clamp(0.0, self.duration);

        self.current_time = target;
        self.sink.seek(target);

        if self.state == PlaybackState::Ended && target < self.duration {
            self.set_state(PlaybackState::Paused);
        }
        Ok(target)
    }

    pub fn skip_by(&mut self, delta: f64) -> AudioResult<f64> {
        self.seek(self.current_time + delta)
    }

    pub fn seek_fraction(&mut self, fraction: f64) -> AudioResult<f64> {
        self.seek(fraction_to_time(fraction, self.duration))
    }

    /// Seek from a click on the waveform surface
    pub fn seek_from_waveform(&mut self, x: f64, width: f64) -> AudioResult<f64> {
        self.seek_fraction(position_fraction(x, width))
    }

    /// Seek from a click on the progress bar
    pub fn seek_from_progress_bar(&mut self, x: f64, width: f64) -> AudioResult<f64> {
        self.seek_fraction(position_fraction(x, width))
    }

    /// Set the volume, clamped to [0, 1]
    ///
    /// While muted the output stays silent and the remembered pre-mute
    /// volume is left alone.
    pub fn set_volume(&mut self, volume: f32) {
        let volume = if volume.is_nan() { 0.0 } else { volume.clamp(0.0, 1.0) };
        self.volume = volume;
        if !self.muted {
            self.sink.set_volume(volume);
        }
    }

    pub fn mute(&mut self) {
        if self.muted {
            return;
        }
        self.pre_mute_volume = self.volume;
        self.muted = true;
        self.sink.set_volume(0.0);
    }

    pub fn unmute(&mut self) {
        if !self.muted {
            return;
        }
        self.muted = false;
        self.volume = self.pre_mute_volume;
        self.sink.set_volume(self.volume);
    }

    pub fn toggle_mute(&mut self) {
        if self.muted {
            self.unmute();
        } else {
            self.mute();
        }
    }

    /// Set one of the allowed speeds; anything else is rejected unchanged
    pub fn set_speed(&mut self, rate: f32) -> AudioResult<()> {
        let speed = PlaybackSpeed::try_from(rate)?;
        self.speed = speed;
        self.sink.set_rate(speed.rate());
        debug!("Playback speed set to {}", speed);
        Ok(())
    }

    /// Wait for the next sink event and apply it
    ///
    /// Returns `None` once the sink has gone away.
    pub async fn next_event(&mut self) -> Option<PlaybackEvent> {
        loop {
            let event = self.sink_events.recv().await?;
            if let Some(event) = self.handle_sink_event(event) {
                return Some(event);
            }
        }
    }

    /// Apply one sink event; stale progress outside `Playing` is ignored
    pub fn handle_sink_event(&mut self, event: SinkEvent) -> Option<PlaybackEvent> {
        match event {
            SinkEvent::TimeUpdate(t) => {
                if self.state != PlaybackState::Playing {
                    return None;
                }
                self.current_time = if t.is_nan() { 0.0 } else { t.clamp(0.0, self.duration) };
                Some(PlaybackEvent::TimeUpdate(self.current_time))
            }
            SinkEvent::Ended => {
                if self.state != PlaybackState::Playing {
                    return None;
                }
                self.current_time = self.duration;
                self.set_state(PlaybackState::Ended);
                Some(PlaybackEvent::Ended)
            }
            SinkEvent::Fault(reason) => {
                let e = AudioError::PlaybackFault(reason);
                self.fail(e.clone());
                Some(PlaybackEvent::Error(e))
            }
        }
    }

    /// Envelope for scrub visuals, extracted once per source
    ///
    /// `None` when no extractor is configured or extraction failed.
    pub async fn waveform(&mut self) -> Option<Arc<WaveformEnvelope>> {
        if let Some(envelope) = &self.waveform {
            return Some(Arc::clone(envelope));
        }

        let extractor = self.waveforms.as_ref()?;
        let source = self.source.as_ref()?.waveform_source();
        let envelope = extractor.extract_or_omit(source).await?;
        self.waveform = Some(Arc::clone(&envelope));
        Some(envelope)
    }

    /// Write the current asset into `dir`; returns the written path
    pub async fn download(&self, dir: &Path) -> AudioResult<PathBuf> {
        let source = self.source.as_ref().ok_or(AudioError::NoSource)?;

        let (bytes, remote_name) = match source {
            PlaybackSource::InMemory(asset) => (asset.bytes().to_vec(), None),
            PlaybackSource::Remote(reference) => {
                let fetcher = self.fetcher.as_ref().ok_or_else(|| {
                    AudioError::TransferFailure("no fetcher configured for remote assets".to_string())
                })?;
                (fetcher.fetch(reference).await?, reference.filename.as_deref())
            }
        };

        let filename = download_filename(remote_name, source.format(), Utc::now());
        let path = dir.join(filename);

        tokio::fs::write(&path, &bytes).await.map_err(|e| {
            AudioError::TransferFailure(format!("failed to write {}: {}", path.display(), e))
        })?;

        info!("Downloaded {} bytes to {}", bytes.len(), path.display());
        Ok(path)
    }

    fn fail(&mut self, reason: AudioError) {
        self.sink.pause();
        error!(
            "Playback failed at {:.2}s: {}",
            self.current_time, reason
        );
        self.error_reason = Some(reason);
        self.set_state(PlaybackState::Error);
    }

    fn set_state(&mut self, next: PlaybackState) {
        if self.state != next {
            debug!("Playback: {:?} -> {:?}", self.state, next);
        }
        self.state = next;
    }

    fn invalid(&self, action: &'static str) -> AudioError {
        AudioError::InvalidTransition {
            state: self.state.as_str(),
            action,
        }
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        self.sink.pause();
        if self.handle.take().is_some() {
            debug!("Playback engine dropped, asset handle revoked");
        }
    }
}
