pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod playback;
pub mod recording;
pub mod upload;
pub mod waveform;

pub use audio::{
    AssetRegistry, AudioAsset, AudioFile, AudioFrame, AudioInput, CapabilityDescriptor,
    EncodingFormat, FormatNegotiator, LevelMonitor, Microphone, RemoteReference,
    SymphoniaDecoder, WavEncoderFactory, WavFileInput,
};
pub use config::Config;
pub use error::{AudioError, AudioResult};
pub use http::{create_router, AppState};
pub use playback::{ClockSink, PlaybackEngine, PlaybackSource, PlaybackSpeed, PlaybackState};
pub use recording::{
    RecordingConfig, RecordingEvent, RecordingHandle, RecordingSession, RecordingSnapshot,
    RecordingState,
};
pub use upload::{
    FsStore, NatsTransport, Transport, UploadCoordinator, UploadDestination, UploadSnapshot,
    UploadStatus, UploadTrigger,
};
pub use waveform::{WaveformEnvelope, WaveformExtractor, WaveformSource};
