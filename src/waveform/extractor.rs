use futures::future::{abortable, AbortHandle, Aborted, BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

use super::envelope::WaveformEnvelope;
use crate::audio::{AssetFetcher, AudioAsset, AudioDecoder, RemoteReference};
use crate::error::{AudioError, AudioResult};

/// Asset to extract an envelope from
#[derive(Debug, Clone)]
pub enum WaveformSource {
    InMemory(Arc<AudioAsset>),
    Remote(RemoteReference),
}

impl WaveformSource {
    /// Identity used to coalesce concurrent extractions
    pub fn key(&self) -> String {
        match self {
            WaveformSource::InMemory(asset) => format!("asset:{}", asset.id()),
            WaveformSource::Remote(reference) => format!("remote:{}", reference.path),
        }
    }

    fn extension(&self) -> &str {
        match self {
            WaveformSource::InMemory(asset) => &asset.format().extension,
            WaveformSource::Remote(reference) => &reference.format.extension,
        }
    }
}

type EnvelopeResult = AudioResult<Arc<WaveformEnvelope>>;

struct InFlight {
    generation: u64,
    future: Shared<BoxFuture<'static, EnvelopeResult>>,
    abort: AbortHandle,
}

type InFlightMap = Arc<Mutex<HashMap<String, InFlight>>>;

/// One-shot, cancelable envelope extraction
///
/// A second request for a source that is already being decoded joins the
/// running extraction instead of starting another decode.
pub struct WaveformExtractor {
    decoder: Arc<dyn AudioDecoder>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
    resolution: usize,
    in_flight: InFlightMap,
    generation: AtomicU64,
}

impl WaveformExtractor {
    pub fn new(decoder: Arc<dyn AudioDecoder>, resolution: usize) -> Self {
        Self {
            decoder,
            fetcher: None,
            resolution,
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            generation: AtomicU64::new(0),
        }
    }

    /// Enable extraction from remote references
    pub fn with_fetcher(mut self, fetcher: Arc<dyn AssetFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    pub fn resolution(&self) -> usize {
        self.resolution
    }

    pub fn is_in_flight(&self, source: &WaveformSource) -> bool {
        lock(&self.in_flight).contains_key(&source.key())
    }

    /// Extract the envelope, joining an in-flight extraction of the same source
    pub async fn extract(&self, source: WaveformSource) -> EnvelopeResult {
        let key = source.key();

        let future = {
            let mut in_flight = lock(&self.in_flight);
            match in_flight.get(&key) {
                Some(existing) => {
                    debug!("Joining in-flight waveform extraction for {}", key);
                    existing.future.clone()
                }
                None => {
                    let generation = self.generation.fetch_add(1, Ordering::Relaxed);
                    let (work, abort) = abortable(extract_envelope(
                        Arc::clone(&self.decoder),
                        self.fetcher.clone(),
                        self.resolution,
                        source,
                    ));

                    let map = Arc::clone(&self.in_flight);
                    let entry_key = key.clone();
                    let future = async move {
                        let result = work.await.unwrap_or_else(|Aborted| Err(AudioError::Cancelled));
                        remove_if_current(&map, &entry_key, generation);
                        result
                    }
                    .boxed()
                    .shared();

                    in_flight.insert(
                        key,
                        InFlight {
                            generation,
                            future: future.clone(),
                            abort,
                        },
                    );
                    future
                }
            }
        };

        future.await
    }

    /// Extract, omitting the visualization on any failure
    pub async fn extract_or_omit(&self, source: WaveformSource) -> Option<Arc<WaveformEnvelope>> {
        match self.extract(source).await {
            Ok(envelope) => Some(envelope),
            Err(AudioError::DecodeFailure(reason)) => {
                warn!("Waveform omitted, decode failed: {}", reason);
                None
            }
            Err(e) => {
                warn!("Waveform omitted: {}", e);
                None
            }
        }
    }

    /// Cancel an in-flight extraction; every waiter gets `Cancelled`
    pub fn cancel(&self, source: &WaveformSource) -> bool {
        let key = source.key();
        match lock(&self.in_flight).remove(&key) {
            Some(entry) => {
                entry.abort.abort();
                info!("Cancelled waveform extraction for {}", key);
                true
            }
            None => false,
        }
    }
}

async fn extract_envelope(
    decoder: Arc<dyn AudioDecoder>,
    fetcher: Option<Arc<dyn AssetFetcher>>,
    resolution: usize,
    source: WaveformSource,
) -> EnvelopeResult {
    let fetched;
    let bytes: &[u8] = match &source {
        WaveformSource::InMemory(asset) => asset.bytes(),
        WaveformSource::Remote(reference) => {
            let fetcher = fetcher.ok_or_else(|| {
                AudioError::TransferFailure("no fetcher configured for remote assets".to_string())
            })?;
            fetched = fetcher.fetch(reference).await?;
            &fetched
        }
    };

    // Let joiners and cancellation in before the decode runs
    tokio::task::yield_now().await;

    let decoded = decoder.decode(bytes, Some(source.extension()))?;
    let envelope = WaveformEnvelope::from_samples(decoded.first_channel(), resolution);

    debug!(
        "Extracted {}-point waveform from {:.1}s of audio",
        envelope.len(),
        decoded.duration_seconds()
    );
    Ok(Arc::new(envelope))
}

fn remove_if_current(map: &InFlightMap, key: &str, generation: u64) {
    let mut in_flight = lock(map);
    if in_flight.get(key).map(|e| e.generation) == Some(generation) {
        in_flight.remove(key);
    }
}

fn lock(map: &InFlightMap) -> std::sync::MutexGuard<'_, HashMap<String, InFlight>> {
    map.lock().unwrap_or_else(|e| e.into_inner())
}
