use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use practice_audio::audio::{
    AudioAsset, AudioFile, EncodingFormat, Microphone, SymphoniaDecoder, WavEncoderFactory,
    WavFileInput,
};
use practice_audio::playback::PlaybackEvent;
use practice_audio::upload::{FsStore, NatsTransport, Transport, UploadCoordinator, UploadEvent};
use practice_audio::{
    create_router, AppState, AssetRegistry, ClockSink, Config, PlaybackEngine, PlaybackSource,
    RecordingConfig, RecordingEvent, RecordingHandle, RecordingSession, WaveformEnvelope,
    WaveformExtractor,
};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "practice-audio")]
#[command(about = "Capture, analyse and store practice recordings")]
struct Args {
    /// Config file (extension optional)
    #[arg(short, long, default_value = "config/practice-audio")]
    config: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the HTTP control API
    Serve,

    /// Record a WAV file through the capture pipeline
    Record {
        /// WAV file replayed as the microphone
        #[arg(short, long)]
        input: PathBuf,

        /// Override the maximum recording length in seconds
        #[arg(short, long)]
        max_duration: Option<u64>,

        /// Directory the finished recording is written to
        #[arg(short, long, default_value = ".")]
        out: PathBuf,

        /// Upload the recording once it completes
        #[arg(long)]
        upload: bool,
    },

    /// Play an audio file on the virtual clock, printing the playhead
    Play {
        file: PathBuf,

        /// Playback rate (0.5, 0.75, 1.0, 1.25, 1.5 or 2.0)
        #[arg(short, long, default_value_t = 1.0)]
        speed: f32,
    },

    /// Print the waveform envelope of an audio file as JSON
    Waveform {
        file: PathBuf,

        /// Number of envelope points
        #[arg(short, long)]
        resolution: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .init();

    let args = Args::parse();
    let cfg = Config::load(&args.config)?;

    info!("Practice Audio v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match args.command {
        Command::Serve => serve(cfg).await,
        Command::Record {
            input,
            max_duration,
            out,
            upload,
        } => record(cfg, input, max_duration, out, upload).await,
        Command::Play { file, speed } => play(cfg, file, speed).await,
        Command::Waveform { file, resolution } => waveform(cfg, file, resolution),
    }
}

async fn build_transport(cfg: &Config) -> Result<Arc<dyn Transport>> {
    match &cfg.upload.nats_url {
        Some(url) => {
            let transport =
                NatsTransport::connect(url, cfg.upload.nats_subject.clone(), cfg.upload.chunk_size)
                    .await?;
            Ok(Arc::new(transport))
        }
        None => Ok(Arc::new(FsStore::new(
            &cfg.upload.storage_path,
            cfg.upload.chunk_size,
        ))),
    }
}

/// Start a session replaying `input`, matching the encoder to the file
fn spawn_session(
    mut recording: RecordingConfig,
    input: WavFileInput,
) -> Result<(RecordingHandle, mpsc::UnboundedReceiver<RecordingEvent>)> {
    let spec = input.spec()?;
    recording.sample_rate = spec.sample_rate;
    recording.channels = spec.channels;

    info!(
        "Capture input {} ({}Hz, {} channels)",
        practice_audio::AudioInput::name(&input),
        spec.sample_rate,
        spec.channels
    );

    let encoders = Arc::new(WavEncoderFactory::new(spec.sample_rate, spec.channels));
    Ok(RecordingSession::spawn(
        recording,
        Microphone::new(input),
        encoders,
        AssetRegistry::new(),
    ))
}

async fn serve(cfg: Config) -> Result<()> {
    let transport = build_transport(&cfg).await?;
    let (coordinator, mut upload_events) = UploadCoordinator::new(transport);
    let coordinator = if cfg.upload.auto_upload {
        coordinator.with_auto_upload(cfg.upload.destination())
    } else {
        coordinator
    };

    let store = Arc::new(FsStore::new(&cfg.upload.storage_path, cfg.upload.chunk_size));
    let waveforms = Arc::new(
        WaveformExtractor::new(Arc::new(SymphoniaDecoder), cfg.waveform.resolution)
            .with_fetcher(store.clone()),
    );

    let (recorder, recording_events) = match &cfg.device.input_path {
        Some(path) => {
            let (handle, events) = spawn_session(cfg.recording.clone(), WavFileInput::new(path))?;
            (Some(handle), Some(events))
        }
        None => {
            warn!("No capture input configured; recording routes disabled");
            (None, None)
        }
    };

    let state = AppState::new(
        recorder,
        Arc::new(coordinator),
        waveforms,
        store,
        cfg.upload.destination(),
    );
    if let Some(events) = recording_events {
        state.track_recordings(events);
    }

    tokio::spawn(async move {
        while let Some(event) = upload_events.recv().await {
            if let UploadEvent::Finished { asset_id, outcome } = event {
                info!("Upload of {} finished: {:?}", asset_id, outcome);
            }
        }
    });

    let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("HTTP server listening on {}", addr);
    axum::serve(listener, create_router(state)).await?;

    Ok(())
}

async fn record(
    cfg: Config,
    input: PathBuf,
    max_duration: Option<u64>,
    out: PathBuf,
    upload: bool,
) -> Result<()> {
    let mut recording = cfg.recording.clone();
    if let Some(max) = max_duration {
        recording.max_duration_secs = max;
    }

    // Stop once the file has been replayed, unless the limit comes first
    let file = AudioFile::open(&input)?;
    let replay = Duration::from_secs_f64(file.duration_seconds.ceil());
    drop(file);

    let (handle, mut events) = spawn_session(recording, WavFileInput::new(&input))?;
    handle.start().await?;
    info!("Recording {} ...", input.display());

    let deadline = tokio::time::sleep(replay);
    tokio::pin!(deadline);

    let asset = loop {
        tokio::select! {
            _ = &mut deadline, if !deadline.is_elapsed() => {
                if let Err(e) = handle.stop().await {
                    warn!("Stop rejected: {}", e);
                }
            }
            event = events.recv() => match event {
                Some(RecordingEvent::Completed { asset, duration_seconds }) => {
                    info!("Recorded {}s ({} bytes)", duration_seconds, asset.len());
                    break asset;
                }
                Some(RecordingEvent::Error { reason }) => {
                    error!("Recording failed: {}", reason);
                    return Err(reason.into());
                }
                Some(_) => {}
                None => anyhow::bail!("recording session ended unexpectedly"),
            }
        }
    };

    tokio::fs::create_dir_all(&out).await?;
    let path = out.join(format!("{}.{}", asset.id(), asset.format().extension));
    tokio::fs::write(&path, asset.bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {}", path.display());

    if upload {
        let transport = build_transport(&cfg).await?;
        let (coordinator, _events) = UploadCoordinator::new(transport);
        let mut status = coordinator.upload(
            asset,
            cfg.upload.destination(),
            practice_audio::UploadTrigger::Manual,
        )?;

        loop {
            status.changed().await?;
            let snapshot = status.borrow().clone();
            if !snapshot.status.is_in_flight() {
                match snapshot.remote {
                    Some(remote) => info!("Uploaded to {}", remote.path),
                    None => anyhow::bail!(
                        "upload failed: {}",
                        snapshot.error.unwrap_or_default()
                    ),
                }
                break;
            }
        }
    }

    Ok(())
}

async fn play(cfg: Config, file: PathBuf, speed: f32) -> Result<()> {
    use practice_audio::audio::AudioDecoder;

    let bytes = tokio::fs::read(&file)
        .await
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extension = file
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("wav")
        .to_lowercase();

    let decoded = SymphoniaDecoder.decode(&bytes, Some(&extension))?;
    let format = EncodingFormat::new(format!("audio/{}", extension), extension);
    let asset = Arc::new(AudioAsset::from_bytes(
        bytes,
        format,
        decoded.duration_seconds().ceil() as u64,
    ));

    let registry = AssetRegistry::new();
    let (sink, sink_events) = ClockSink::new(registry.clone(), cfg.playback.time_update_interval());
    let waveforms = Arc::new(WaveformExtractor::new(
        Arc::new(SymphoniaDecoder),
        cfg.waveform.resolution,
    ));
    let mut engine =
        PlaybackEngine::new(Box::new(sink), sink_events, registry).with_waveforms(waveforms);

    engine.load(PlaybackSource::InMemory(asset)).await?;
    engine.set_speed(speed)?;
    if let Some(envelope) = engine.waveform().await {
        info!("Waveform ready ({} points)", envelope.len());
    }

    engine.play().await?;
    info!(
        "Playing {} ({:.1}s at {})",
        file.display(),
        engine.duration(),
        engine.speed()
    );

    while let Some(event) = engine.next_event().await {
        match event {
            PlaybackEvent::TimeUpdate(t) => println!("{:.2} / {:.2}", t, engine.duration()),
            PlaybackEvent::Ended => {
                info!("Playback ended");
                break;
            }
            PlaybackEvent::Error(e) => {
                error!("Playback failed: {}", e);
                return Err(e.into());
            }
        }
    }

    Ok(())
}

fn waveform(cfg: Config, file: PathBuf, resolution: Option<usize>) -> Result<()> {
    use practice_audio::audio::AudioDecoder;

    let bytes = std::fs::read(&file).with_context(|| format!("Failed to read {}", file.display()))?;
    let extension = file.extension().and_then(|e| e.to_str());

    let decoded = SymphoniaDecoder.decode(&bytes, extension)?;
    let envelope = WaveformEnvelope::from_samples(
        decoded.first_channel(),
        resolution.unwrap_or(cfg.waveform.resolution),
    );

    println!("{}", serde_json::to_string(&envelope.samples)?);
    Ok(())
}
