//! HTTP control API
//!
//! - POST /recordings/{start,pause,resume,stop,reset} - Drive the capture session
//! - GET /recordings/status - Current recording snapshot
//! - POST /recordings/:asset_id/upload - Manually upload a completed recording
//! - GET /uploads/:asset_id - Upload progress
//! - POST /uploads/:asset_id/retry - Retry a failed upload
//! - GET /waveform?path=.. - Envelope of a stored asset
//! - GET /health - Health check

mod handlers;
mod routes;
mod state;

pub use routes::create_router;
pub use state::AppState;
