// Integration tests for the HTTP control API
//
// Drives the router in-process with `tower::ServiceExt::oneshot`; the
// microphone is a WAV file written to a temp directory.

use anyhow::Result;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use practice_audio::audio::{Microphone, SymphoniaDecoder, WavEncoderFactory, WavFileInput};
use practice_audio::upload::{FsStore, UploadCoordinator, UploadDestination};
use practice_audio::waveform::WaveformExtractor;
use practice_audio::{create_router, AppState, AssetRegistry, RecordingConfig, RecordingSession};
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::ServiceExt;

fn write_tone(path: &Path) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..16000 {
        let t = i as f32 / 16000.0;
        writer.write_sample(((t * 220.0 * std::f32::consts::TAU).sin() * 10000.0) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

fn services(dir: &Path) -> (Arc<UploadCoordinator>, Arc<WaveformExtractor>, Arc<FsStore>) {
    let store = Arc::new(FsStore::new(dir.join("store"), 4096));
    let (coordinator, _events) = UploadCoordinator::new(store.clone());
    let waveforms = Arc::new(
        WaveformExtractor::new(Arc::new(SymphoniaDecoder), 100).with_fetcher(store.clone()),
    );
    (Arc::new(coordinator), waveforms, store)
}

fn app_without_recorder(dir: &Path) -> Router {
    let (uploads, waveforms, store) = services(dir);
    create_router(AppState::new(
        None,
        uploads,
        waveforms,
        store,
        UploadDestination::new("practice"),
    ))
}

async fn send(app: &Router, method: &str, uri: &str) -> Result<(StatusCode, Value)> {
    let response = app
        .clone()
        .oneshot(Request::builder().method(method).uri(uri).body(Body::empty())?)
        .await?;

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await?;
    let body = serde_json::from_slice(&bytes).unwrap_or(Value::String(
        String::from_utf8_lossy(&bytes).to_string(),
    ));
    Ok((status, body))
}

#[tokio::test]
async fn test_health_check() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app_without_recorder(dir.path());

    let (status, body) = send(&app, "GET", "/health").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, Value::String("OK".to_string()));
    Ok(())
}

#[tokio::test]
async fn test_recording_routes_need_a_device() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app_without_recorder(dir.path());

    let (status, body) = send(&app, "POST", "/recordings/start").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["error"], "no capture device configured");

    let (status, _) = send(&app, "GET", "/recordings/status").await?;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    Ok(())
}

#[tokio::test]
async fn test_unknown_upload_and_waveform() -> Result<()> {
    let dir = TempDir::new()?;
    let app = app_without_recorder(dir.path());
    let id = uuid::Uuid::new_v4();

    let (status, _) = send(&app, "GET", &format!("/uploads/{}", id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "POST", &format!("/uploads/{}/retry", id)).await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"], "upload is not in a retryable state");

    let (status, _) = send(&app, "POST", &format!("/recordings/{}/upload", id)).await?;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/waveform?path=practice/missing.wav").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    Ok(())
}

#[tokio::test]
async fn test_failed_capture_setup_requires_reset() -> Result<()> {
    let dir = TempDir::new()?;
    let (recorder, _events) = RecordingSession::spawn(
        RecordingConfig::default(),
        Microphone::new(WavFileInput::new(dir.path().join("missing.wav"))),
        Arc::new(WavEncoderFactory::new(16000, 1)),
        AssetRegistry::new(),
    );
    let (uploads, waveforms, store) = services(dir.path());
    let app = create_router(AppState::new(
        Some(recorder),
        uploads,
        waveforms,
        store,
        UploadDestination::new("practice"),
    ));

    let (status, body) = send(&app, "POST", "/recordings/start").await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["reset_required"], true);

    // Still in Error: a second start is a conflict, not a setup failure
    let (status, body) = send(&app, "POST", "/recordings/start").await?;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["reset_required"], false);

    let (status, body) = send(&app, "POST", "/recordings/reset").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    Ok(())
}

#[tokio::test]
async fn test_record_upload_and_visualize() -> Result<()> {
    let dir = TempDir::new()?;
    let input = dir.path().join("tone.wav");
    write_tone(&input)?;

    let config = RecordingConfig {
        sample_rate: 16000,
        channels: 1,
        ..Default::default()
    };
    let (recorder, recording_events) = RecordingSession::spawn(
        config,
        Microphone::new(WavFileInput::new(&input)),
        Arc::new(WavEncoderFactory::new(16000, 1)),
        AssetRegistry::new(),
    );

    let (uploads, waveforms, store) = services(dir.path());
    let state = AppState::new(
        Some(recorder),
        uploads,
        waveforms,
        store,
        UploadDestination::new("practice"),
    );
    state.track_recordings(recording_events);
    let app = create_router(state.clone());

    let (status, _) = send(&app, "POST", "/recordings/pause").await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, "POST", "/recordings/start").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "recording");
    assert_eq!(body["format"]["mime"], "audio/wav");

    tokio::time::sleep(Duration::from_millis(400)).await;

    let (status, body) = send(&app, "POST", "/recordings/stop").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "completed");
    let asset_id = body["asset_id"].as_str().expect("asset id").to_string();

    // The completion event is picked up asynchronously
    for _ in 0..50 {
        if !state.recordings.read().await.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let (status, body) = send(&app, "POST", &format!("/recordings/{}/upload", asset_id)).await?;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["trigger"], "manual");

    let mut remote_path = None;
    for _ in 0..100 {
        let (status, body) = send(&app, "GET", &format!("/uploads/{}", asset_id)).await?;
        assert_eq!(status, StatusCode::OK);
        if body["status"] == "completed" {
            assert_eq!(body["progress"]["percentage"], 100.0);
            remote_path = body["remote"]["path"].as_str().map(str::to_string);
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let remote_path = remote_path.expect("upload completed");

    let (status, body) = send(&app, "GET", &format!("/waveform?path={}", remote_path)).await?;
    assert_eq!(status, StatusCode::OK);
    let samples = body["samples"].as_array().expect("samples");
    assert_eq!(samples.len(), 100);
    assert!(samples.iter().any(|v| v.as_f64() == Some(1.0)));

    let (status, body) = send(&app, "POST", "/recordings/reset").await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["state"], "idle");
    Ok(())
}
