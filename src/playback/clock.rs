//! Virtual playback clock
//!
//! Plays nothing audible: it advances a playhead in real time, scaled by
//! the playback rate, and reports it like a media element would. The CLI
//! `play` command drives it where no audio output is attached.

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

use super::sink::{MediaLocator, PlaybackSink, SinkEvent};
use crate::audio::AssetRegistry;
use crate::error::{AudioError, AudioResult};

#[derive(Debug)]
struct Playhead {
    position: f64,
    duration: f64,
    rate: f32,
    volume: f32,
}

pub struct ClockSink {
    registry: AssetRegistry,
    playhead: Arc<Mutex<Playhead>>,
    events: mpsc::UnboundedSender<SinkEvent>,
    update_interval: Duration,
    task: Option<JoinHandle<()>>,
}

impl ClockSink {
    pub fn new(
        registry: AssetRegistry,
        update_interval: Duration,
    ) -> (Self, mpsc::UnboundedReceiver<SinkEvent>) {
        let (events, events_rx) = mpsc::unbounded_channel();
        let sink = Self {
            registry,
            playhead: Arc::new(Mutex::new(Playhead {
                position: 0.0,
                duration: 0.0,
                rate: 1.0,
                volume: 1.0,
            })),
            events,
            update_interval,
            task: None,
        };
        (sink, events_rx)
    }

    pub fn volume(&self) -> f32 {
        lock(&self.playhead).volume
    }

    pub fn position(&self) -> f64 {
        lock(&self.playhead).position
    }

    fn halt(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait::async_trait]
impl PlaybackSink for ClockSink {
    async fn load(&mut self, locator: &MediaLocator) -> AudioResult<f64> {
        self.halt();

        let duration = match locator {
            MediaLocator::Handle(url) => self
                .registry
                .resolve(url)
                .map(|asset| asset.duration_seconds() as f64)
                .ok_or_else(|| AudioError::PlaybackFault(format!("unknown asset handle {}", url)))?,
            MediaLocator::Remote(reference) => reference.duration_seconds as f64,
        };

        let mut playhead = lock(&self.playhead);
        playhead.position = 0.0;
        playhead.duration = duration;
        Ok(duration)
    }

    fn play(&mut self) -> AudioResult<()> {
        if self.task.as_ref().is_some_and(|task| !task.is_finished()) {
            return Ok(());
        }

        let playhead = Arc::clone(&self.playhead);
        let events = self.events.clone();
        let period = self.update_interval;

        self.task = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.tick().await;

            loop {
                ticker.tick().await;

                let (position, ended) = {
                    let mut playhead = lock(&playhead);
                    let advanced = playhead.position + period.as_secs_f64() * playhead.rate as f64;
                    playhead.position = advanced.min(playhead.duration);
                    (playhead.position, advanced >= playhead.duration)
                };

                let _ = events.send(SinkEvent::TimeUpdate(position));
                if ended {
                    let _ = events.send(SinkEvent::Ended);
                    debug!("Clock sink reached end at {:.2}s", position);
                    break;
                }
            }
        }));
        Ok(())
    }

    fn pause(&mut self) {
        self.halt();
    }

    fn seek(&mut self, seconds: f64) {
        let mut playhead = lock(&self.playhead);
        playhead.position = seconds.clamp(0.0, playhead.duration);
    }

    fn set_rate(&mut self, rate: f32) {
        lock(&self.playhead).rate = rate;
    }

    fn set_volume(&mut self, volume: f32) {
        lock(&self.playhead).volume = volume;
    }
}

impl Drop for ClockSink {
    fn drop(&mut self) {
        self.halt();
    }
}

fn lock(playhead: &Mutex<Playhead>) -> std::sync::MutexGuard<'_, Playhead> {
    playhead.lock().unwrap_or_else(|e| e.into_inner())
}
