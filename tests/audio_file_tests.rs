// Integration tests for WAV file input
//
// These tests verify that we can read WAV files and replay them as a live
// capture device.

use anyhow::Result;
use practice_audio::audio::{AudioFile, AudioInput, Microphone, PermissionStatus, WavFileInput};
use practice_audio::AudioError;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::TempDir;

fn write_wav(path: &Path, sample_rate: u32, channels: u16, frames: u32) -> Result<()> {
    let spec = hound::WavSpec {
        channels,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for i in 0..frames * channels as u32 {
        writer.write_sample((i % 1000) as i16)?;
    }
    writer.finalize()?;
    Ok(())
}

#[test]
fn test_audio_file_open() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("take.wav");
    write_wav(&path, 16000, 2, 8000)?;

    let audio = AudioFile::open(&path)?;

    assert_eq!(audio.sample_rate, 16000);
    assert_eq!(audio.channels, 2);
    assert_eq!(audio.samples.len(), 16000);
    assert!((audio.duration_seconds - 0.5).abs() < 1e-9);
    assert!(audio.path.contains("take.wav"));

    // Interleaved [L, R, L, R, ...]
    assert_eq!(audio.samples.len() % audio.channels as usize, 0);
    Ok(())
}

#[test]
fn test_audio_file_nonexistent() {
    let path = PathBuf::from("/nonexistent/path/to/audio.wav");
    let result = AudioFile::open(&path);

    assert!(result.is_err(), "Opening nonexistent file should fail");
}

#[test]
fn test_audio_file_rejects_float_samples() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("float.wav");
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: 16000,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&path, spec)?;
    writer.write_sample(0.25f32)?;
    writer.finalize()?;

    assert!(AudioFile::open(&path).is_err());
    Ok(())
}

#[tokio::test]
async fn test_missing_input_file_is_unsupported() -> Result<()> {
    let input = WavFileInput::new("/nonexistent/input.wav");

    assert_eq!(input.request_permission().await, PermissionStatus::Unsupported);
    assert!(matches!(
        input.open_stream().await,
        Err(AudioError::DeviceNotFound)
    ));
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_replay_delivers_100ms_frames() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("take.wav");
    write_wav(&path, 16000, 1, 4000)?; // 250ms

    let input = WavFileInput::new(&path);
    assert_eq!(input.spec()?.sample_rate, 16000);
    assert_eq!(input.request_permission().await, PermissionStatus::Granted);

    let mut stream = input.open_stream().await?;
    let mut frames = stream.take_frames().expect("frames");
    assert!(stream.take_frames().is_none(), "Frames can only be taken once");

    let mut received = Vec::new();
    while let Some(frame) = frames.recv().await {
        received.push(frame);
    }

    assert_eq!(received.len(), 3);
    assert_eq!(received[0].samples.len(), 1600);
    assert_eq!(received[2].samples.len(), 800);
    assert_eq!(received[1].timestamp_ms, 100);
    assert_eq!(received[2].samples[0], (3200 % 1000) as i16);
    Ok(())
}

#[tokio::test(start_paused = true)]
async fn test_release_stops_replay() -> Result<()> {
    let dir = TempDir::new()?;
    let path = dir.path().join("long.wav");
    write_wav(&path, 16000, 1, 160_000)?; // 10s

    let microphone = Microphone::new(WavFileInput::new(&path));
    let mut stream = microphone.open().await?;
    let mut frames = stream.take_frames().expect("frames");
    assert!(microphone.is_in_use());

    frames.recv().await.expect("first frame");
    stream.release();
    assert!(!stream.is_live());
    assert!(!microphone.is_in_use());

    // Replay task is gone; the channel closes well before the file ends
    let drained = tokio::time::timeout(Duration::from_secs(1), async {
        while frames.recv().await.is_some() {}
    })
    .await;
    assert!(drained.is_ok());
    Ok(())
}
