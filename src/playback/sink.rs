use crate::audio::RemoteReference;
use crate::error::AudioResult;

/// What a sink is asked to play
#[derive(Debug, Clone, PartialEq)]
pub enum MediaLocator {
    /// Temporary `asset://` handle of an in-memory asset
    Handle(String),
    Remote(RemoteReference),
}

/// Event reported by a sink while it plays
#[derive(Debug, Clone, PartialEq)]
pub enum SinkEvent {
    TimeUpdate(f64),
    Ended,
    Fault(String),
}

/// Audio output trait
///
/// A sink renders audio and reports progress on the event channel it was
/// created with. The `PlaybackEngine` owns the state machine; the sink only
/// does what it is told.
#[async_trait::async_trait]
pub trait PlaybackSink: Send {
    /// Prepare media and return its duration in seconds
    async fn load(&mut self, locator: &MediaLocator) -> AudioResult<f64>;

    fn play(&mut self) -> AudioResult<()>;

    fn pause(&mut self);

    fn seek(&mut self, seconds: f64);

    fn set_rate(&mut self, rate: f32);

    fn set_volume(&mut self, volume: f32);
}
