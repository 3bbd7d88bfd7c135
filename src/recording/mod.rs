//! Recording session management
//!
//! This module provides the `RecordingSession` state machine that manages:
//! - Format negotiation and device acquisition
//! - Encoder lifecycle and ordered chunk collection
//! - Duration bookkeeping with pause-safe ticking and auto-stop
//! - Live level monitoring while recording
//! - Asset assembly on completion

mod config;
mod session;
mod state;
mod timer;

pub use config::RecordingConfig;
pub use session::{RecordingHandle, RecordingSession};
pub use state::{RecordingEvent, RecordingSnapshot, RecordingState};
pub use timer::DurationTimer;
