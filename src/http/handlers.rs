use super::state::AppState;
use crate::audio::RemoteReference;
use crate::error::AudioError;
use crate::recording::RecordingHandle;
use crate::upload::UploadTrigger;
use crate::waveform::WaveformSource;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, warn};
use uuid::Uuid;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Capture setup failed; the recorder stays in Error until reset
    pub reset_required: bool,
}

#[derive(Debug, Deserialize)]
pub struct WaveformQuery {
    /// Storage path of an uploaded asset
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct WaveformResponse {
    pub path: String,
    pub duration_seconds: u64,
    pub samples: Vec<f32>,
}

// ============================================================================
// Helpers
// ============================================================================

fn status_for(e: &AudioError) -> StatusCode {
    match e {
        AudioError::PermissionDenied => StatusCode::FORBIDDEN,
        AudioError::DeviceNotFound | AudioError::NoSource => StatusCode::NOT_FOUND,
        AudioError::DeviceBusy
        | AudioError::InvalidTransition { .. }
        | AudioError::UploadInFlight
        | AudioError::NotRetryable => StatusCode::CONFLICT,
        AudioError::FormatUnsupported
        | AudioError::InvalidSpeed(_)
        | AudioError::DecodeFailure(_) => StatusCode::UNPROCESSABLE_ENTITY,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn error_response(status: StatusCode, error: impl ToString) -> Response {
    error_body(status, error.to_string(), false)
}

fn error_body(status: StatusCode, error: String, reset_required: bool) -> Response {
    (
        status,
        Json(ErrorResponse {
            error,
            reset_required,
        }),
    )
        .into_response()
}

fn audio_error(e: AudioError) -> Response {
    error_body(status_for(&e), e.to_string(), e.is_capture_setup_error())
}

fn recorder(state: &AppState) -> Result<&RecordingHandle, Response> {
    state.recorder.as_ref().ok_or_else(|| {
        error_response(
            StatusCode::SERVICE_UNAVAILABLE,
            "no capture device configured",
        )
    })
}

/// Run a recording command and answer with the resulting snapshot
async fn drive<F, Fut>(state: &AppState, name: &str, command: F) -> Response
where
    F: FnOnce(RecordingHandle) -> Fut,
    Fut: std::future::Future<Output = Result<(), AudioError>>,
{
    let handle = match recorder(state) {
        Ok(handle) => handle.clone(),
        Err(response) => return response,
    };

    match command(handle.clone()).await {
        Ok(()) => {
            info!("Recording {} accepted", name);
            (StatusCode::OK, Json(handle.snapshot())).into_response()
        }
        Err(e) => {
            warn!("Recording {} rejected: {}", name, e);
            audio_error(e)
        }
    }
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /recordings/start
pub async fn start_recording(State(state): State<AppState>) -> impl IntoResponse {
    drive(&state, "start", |h| async move { h.start().await }).await
}

/// POST /recordings/pause
pub async fn pause_recording(State(state): State<AppState>) -> impl IntoResponse {
    drive(&state, "pause", |h| async move { h.pause().await }).await
}

/// POST /recordings/resume
pub async fn resume_recording(State(state): State<AppState>) -> impl IntoResponse {
    drive(&state, "resume", |h| async move { h.resume().await }).await
}

/// POST /recordings/stop
pub async fn stop_recording(State(state): State<AppState>) -> impl IntoResponse {
    drive(&state, "stop", |h| async move { h.stop().await }).await
}

/// POST /recordings/reset
pub async fn reset_recording(State(state): State<AppState>) -> impl IntoResponse {
    drive(&state, "reset", |h| async move { h.reset().await }).await
}

/// GET /recordings/status
pub async fn get_recording_status(State(state): State<AppState>) -> impl IntoResponse {
    match recorder(&state) {
        Ok(handle) => (StatusCode::OK, Json(handle.snapshot())).into_response(),
        Err(response) => response,
    }
}

/// POST /recordings/:asset_id/upload
/// Manually upload a completed recording
pub async fn upload_recording(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> impl IntoResponse {
    let asset = state.recordings.read().await.get(&asset_id).map(Arc::clone);

    let Some(asset) = asset else {
        return error_response(
            StatusCode::NOT_FOUND,
            format!("Recording {} not found", asset_id),
        );
    };

    match state
        .uploads
        .upload(asset, state.destination.clone(), UploadTrigger::Manual)
    {
        Ok(status) => {
            let snapshot = status.borrow().clone();
            (StatusCode::ACCEPTED, Json(snapshot)).into_response()
        }
        Err(e) => audio_error(e),
    }
}

/// GET /uploads/:asset_id
pub async fn get_upload_status(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.uploads.snapshot(asset_id) {
        Some(snapshot) => (StatusCode::OK, Json(snapshot)).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("No upload for {}", asset_id),
        ),
    }
}

/// POST /uploads/:asset_id/retry
pub async fn retry_upload(
    State(state): State<AppState>,
    Path(asset_id): Path<Uuid>,
) -> impl IntoResponse {
    match state.uploads.retry(asset_id) {
        Ok(status) => {
            let snapshot = status.borrow().clone();
            (StatusCode::ACCEPTED, Json(snapshot)).into_response()
        }
        Err(e) => audio_error(e),
    }
}

/// GET /waveform?path=..
/// Envelope of an asset in the filesystem store
pub async fn get_waveform(
    State(state): State<AppState>,
    Query(query): Query<WaveformQuery>,
) -> impl IntoResponse {
    let reference: RemoteReference = match state.store.locate(&query.path).await {
        Ok(reference) => reference,
        Err(e) => {
            return error_response(StatusCode::NOT_FOUND, e);
        }
    };
    let duration_seconds = reference.duration_seconds;

    match state
        .waveforms
        .extract(WaveformSource::Remote(reference))
        .await
    {
        Ok(envelope) => (
            StatusCode::OK,
            Json(WaveformResponse {
                path: query.path,
                duration_seconds,
                samples: envelope.samples.clone(),
            }),
        )
            .into_response(),
        Err(e) => {
            error!("Waveform extraction for {} failed: {}", query.path, e);
            audio_error(e)
        }
    }
}

/// GET /health
/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, "OK")
}
