pub mod clock;
pub mod download;
pub mod engine;
pub mod sink;
pub mod speed;

pub use clock::ClockSink;
pub use download::download_filename;
pub use engine::{
    fraction_to_time, position_fraction, PlaybackEngine, PlaybackEvent, PlaybackSource,
    PlaybackState,
};
pub use sink::{MediaLocator, PlaybackSink, SinkEvent};
pub use speed::PlaybackSpeed;
