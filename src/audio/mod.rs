pub mod asset;
pub mod backend;
pub mod decode;
pub mod device;
pub mod encoder;
pub mod file;
pub mod format;
pub mod level;

pub use asset::{AssetFetcher, AssetHandle, AssetRegistry, AudioAsset, RemoteReference};
pub use backend::{AudioFrame, AudioInput, PermissionStatus};
pub use decode::{AudioDecoder, DecodedAudio, SymphoniaDecoder};
pub use device::{DeviceLease, DeviceStream, Microphone, StreamTracks};
pub use encoder::{Encoder, EncoderEvent, EncoderFactory, WavEncoder, WavEncoderFactory};
pub use file::{AudioFile, WavFileInput};
pub use format::{
    CapabilityDescriptor, CapabilityProbe, DeviceClass, EncodingFormat, FormatNegotiator,
    Negotiation, StaticCapabilities,
};
pub use level::{frame_level, AnalysisGraph, LevelMonitor, Tap};
