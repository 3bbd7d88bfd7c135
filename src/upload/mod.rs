pub mod coordinator;
pub mod messages;
pub mod nats;
pub mod store;
pub mod task;
pub mod transport;

pub use coordinator::UploadCoordinator;
pub use messages::{AssetChunkMessage, AssetCompleteMessage};
pub use nats::NatsTransport;
pub use store::FsStore;
pub use task::{
    UploadDestination, UploadEvent, UploadOutcome, UploadProgress, UploadSnapshot, UploadStatus,
    UploadTrigger,
};
pub use transport::Transport;
