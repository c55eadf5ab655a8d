//! Background asset work and its handoff to the main tick
//!
//! Every task carries the [`CancellationToken`] of the entity it works
//! for. Cancelling it cuts a download or its retry backoff short, and the
//! token is checked again once decode finishes. Results travel back over a
//! channel; the main tick drains it with [`AssetPipeline::poll`] and is
//! the only place frames are hydrated.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use shoal_core::{EntityId, ShoalError, ShoalResult};
use shoal_transport::{code_image_url, HttpFetcher, RetryPolicy};
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::{decode_animation, decode_still, RawFrame};

/// Asset pipeline configuration
#[derive(Clone, Debug)]
pub struct AssetConfig {
    pub download_retry: RetryPolicy,
    /// Templated endpoint producing the representational image
    pub code_endpoint: String,
    pub code_width: u32,
    pub code_height: u32,
}

impl Default for AssetConfig {
    fn default() -> Self {
        AssetConfig {
            download_retry: RetryPolicy::default(),
            code_endpoint: "https://api.qrserver.com/v1/create-qr-code/".to_string(),
            code_width: 256,
            code_height: 256,
        }
    }
}

/// Result of background work, addressed to one entity
#[derive(Debug)]
pub enum AssetEvent {
    /// Animation decoded (possibly into zero frames)
    Decoded { entity: EntityId, frames: Vec<RawFrame> },
    /// Animation never arrived
    DownloadFailed { entity: EntityId, error: ShoalError },
    /// Representational image fetch finished
    Representation {
        entity: EntityId,
        result: ShoalResult<RawFrame>,
    },
}

impl AssetEvent {
    pub fn entity(&self) -> EntityId {
        match self {
            AssetEvent::Decoded { entity, .. }
            | AssetEvent::DownloadFailed { entity, .. }
            | AssetEvent::Representation { entity, .. } => *entity,
        }
    }
}

/// Spawns download/decode/fetch tasks and collects their results
pub struct AssetPipeline {
    config: AssetConfig,
    fetcher: HttpFetcher,
    runtime: Handle,
    tx: mpsc::UnboundedSender<AssetEvent>,
    rx: mpsc::UnboundedReceiver<AssetEvent>,
    in_flight: Arc<AtomicUsize>,
}

struct InFlightGuard(Arc<AtomicUsize>);

impl InFlightGuard {
    fn enter(counter: &Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::AcqRel);
        InFlightGuard(counter.clone())
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

impl AssetPipeline {
    pub fn new(config: AssetConfig, runtime: Handle) -> ShoalResult<Self> {
        let fetcher = HttpFetcher::new(config.download_retry)?;
        Ok(Self::with_fetcher(config, fetcher, runtime))
    }

    pub fn with_fetcher(config: AssetConfig, fetcher: HttpFetcher, runtime: Handle) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        AssetPipeline {
            config,
            fetcher,
            runtime,
            tx,
            rx,
            in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &AssetConfig {
        &self.config
    }

    /// Tasks started and not yet finished
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Download `url` and decode it on a worker thread.
    ///
    /// Failures are reported as events; nothing here can fail the caller.
    pub fn initialize(&self, entity: EntityId, url: String, cancel: CancellationToken) {
        let fetcher = self.fetcher.clone();
        let tx = self.tx.clone();
        let guard = InFlightGuard::enter(&self.in_flight);

        self.runtime.spawn(async move {
            let _guard = guard;
            tracing::debug!(%entity, %url, "asset download started");

            let bytes = match fetcher.get_bytes(&url, &cancel).await {
                Ok(bytes) => bytes,
                Err(ShoalError::Cancelled) => {
                    tracing::debug!(%entity, "entity gone during download, abandoning");
                    return;
                }
                Err(error) => {
                    tracing::warn!(%entity, %url, %error, "asset download failed");
                    let _ = tx.send(AssetEvent::DownloadFailed { entity, error });
                    return;
                }
            };
            tracing::debug!(%entity, bytes = bytes.len(), "asset downloaded");

            let frames = match tokio::task::spawn_blocking(move || decode_animation(&bytes)).await {
                Ok(frames) => frames,
                Err(e) => {
                    tracing::error!(%entity, error = %e, "decode worker panicked");
                    Vec::new()
                }
            };
            if cancel.is_cancelled() {
                tracing::debug!(%entity, frames = frames.len(), "entity gone after decode, dropping frames");
                return;
            }
            tracing::debug!(%entity, frames = frames.len(), "asset decoded");
            let _ = tx.send(AssetEvent::Decoded { entity, frames });
        });
    }

    /// Fetch the representational image encoding `data`
    pub fn fetch_representation(&self, entity: EntityId, data: &str, cancel: CancellationToken) {
        let url = code_image_url(
            &self.config.code_endpoint,
            self.config.code_width,
            self.config.code_height,
            data,
        );
        let fetcher = self.fetcher.clone();
        let tx = self.tx.clone();
        let guard = InFlightGuard::enter(&self.in_flight);

        self.runtime.spawn(async move {
            let _guard = guard;
            let result = match url {
                Ok(url) => {
                    tracing::debug!(%entity, %url, "fetching representational image");
                    match fetcher.get_bytes(url.as_str(), &cancel).await {
                        Ok(bytes) => tokio::task::spawn_blocking(move || decode_still(&bytes))
                            .await
                            .unwrap_or_else(|e| Err(ShoalError::Decode(e.to_string()))),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };
            if cancel.is_cancelled() {
                tracing::debug!(%entity, "entity gone, dropping representational image");
                return;
            }
            let _ = tx.send(AssetEvent::Representation { entity, result });
        });
    }

    /// Drain every finished result without blocking
    pub fn poll(&mut self) -> Vec<AssetEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            events.push(event);
        }
        events
    }

    /// Wait for the next result
    pub async fn next_event(&mut self) -> Option<AssetEvent> {
        self.rx.recv().await
    }
}
