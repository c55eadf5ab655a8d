//! Spawn dispatch
//!
//! Drains the spawn queue filled by the ingester and turns each valid
//! payload into a placement request for the stage.

use rand::Rng;
use shoal_core::{SceneBounds, Vec2};
use shoal_transport::{SpawnEvent, SpawnReceiver};
use tokio::sync::mpsc::error::TryRecvError;

use crate::random_point;

/// A new entity to register
#[derive(Clone, Debug, PartialEq)]
pub struct SpawnRequest {
    pub url: String,
    pub position: Vec2,
}

/// Result of one drain
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Accepted requests, in queue order
    pub accepted: Vec<SpawnRequest>,
    /// Payloads dropped as malformed
    pub rejected: usize,
}

pub struct SpawnDispatcher {
    queue: SpawnReceiver,
    spawn_bounds: SceneBounds,
    max_per_tick: Option<usize>,
    closed: bool,
}

impl SpawnDispatcher {
    pub fn new(queue: SpawnReceiver, spawn_bounds: SceneBounds, max_per_tick: Option<usize>) -> Self {
        SpawnDispatcher {
            queue,
            spawn_bounds,
            max_per_tick,
            closed: false,
        }
    }

    /// True once every producer has gone away and the queue is empty
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Take the pending backlog (up to the per-tick cap) without blocking
    pub fn drain<R: Rng + ?Sized>(&mut self, rng: &mut R) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut taken = 0usize;

        while self.max_per_tick.map_or(true, |max| taken < max) {
            let payload = match self.queue.try_recv() {
                Ok(payload) => payload,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    if !self.closed {
                        tracing::info!("spawn queue closed");
                        self.closed = true;
                    }
                    break;
                }
            };
            taken += 1;

            match SpawnEvent::parse(&payload) {
                Ok(event) => report.accepted.push(SpawnRequest {
                    url: event.url,
                    position: random_point(&self.spawn_bounds, rng),
                }),
                Err(e) => {
                    tracing::debug!(error = %e, payload = %payload, "dropping spawn payload");
                    report.rejected += 1;
                }
            }
        }

        report
    }
}

impl std::fmt::Debug for SpawnDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SpawnDispatcher")
            .field("spawn_bounds", &self.spawn_bounds)
            .field("max_per_tick", &self.max_per_tick)
            .field("closed", &self.closed)
            .finish()
    }
}
