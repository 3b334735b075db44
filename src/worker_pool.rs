//! WorkerPool (C1): owns the media-engine workers and hands out
//! `(worker, router)` pairs to new conferences.
//!
//! Grounded on `media/worker_pool.rs` in the teacher (`Vec<Worker>` plus a
//! selection counter), generalized from round-robin to the spec's
//! `α·cpuUsage + β·routerCount` cost metric with a lowest-id tiebreak, and
//! from "log on death" to "quarantine and notify".

use crate::config::MediaSettings;
use crate::engine::{MediaEngine, Router, Worker};
use crate::error::{EngineError, SfuError, SfuResult};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// A worker plus the administrative state the pool layers on top of it:
/// quarantine status and a `Notify` so conferences backed by this worker
/// can react to quarantine without waiting for their next command.
pub struct WorkerEntry {
    pub worker: Box<dyn Worker>,
    quarantined: AtomicBool,
    pub quarantine_notify: Arc<Notify>,
}

impl WorkerEntry {
    pub fn is_quarantined(&self) -> bool {
        self.quarantined.load(Ordering::SeqCst) || self.worker.is_quarantined()
    }

    fn cost(&self, alpha: f64, beta: f64) -> f64 {
        alpha * self.worker.cpu_usage() + beta * self.worker.router_count() as f64
    }
}

impl std::fmt::Debug for WorkerEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerEntry")
            .field("id", &self.worker.id())
            .field("quarantined", &self.is_quarantined())
            .finish()
    }
}

/// Cost-metric tunables. Defaults make `beta` (router count) dominate, as
/// spec §4.1 asks for.
#[derive(Debug, Clone, Copy)]
pub struct CostWeights {
    pub alpha: f64,
    pub beta: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 10.0,
        }
    }
}

pub struct WorkerPool {
    entries: Vec<Arc<WorkerEntry>>,
    weights: CostWeights,
    codecs: serde_json::Value,
}

impl WorkerPool {
    /// Spawns `settings.worker_count` workers (default: hardware thread
    /// count, resolved by the caller before construction), each asked to
    /// instantiate ahead of time is NOT done here — routers are created
    /// lazily per conference, per spec §3 ("never shared across
    /// conferences").
    pub async fn new(engine: &dyn MediaEngine, settings: &MediaSettings) -> anyhow::Result<Self> {
        let mut entries = Vec::with_capacity(settings.worker_count as usize);
        for i in 0..settings.worker_count {
            let worker = engine
                .create_worker()
                .await
                .map_err(|e| anyhow::anyhow!("failed to create media worker {i}: {e}"))?;
            info!(worker_id = %worker.id(), ordinal = i, "media worker created");
            entries.push(Arc::new(WorkerEntry {
                worker,
                quarantined: AtomicBool::new(false),
                quarantine_notify: Arc::new(Notify::new()),
            }));
        }

        Ok(Self {
            entries,
            weights: CostWeights::default(),
            codecs: settings.codecs_json(),
        })
    }

    pub fn worker_count(&self) -> usize {
        self.entries.len()
    }

    pub fn quarantined_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_quarantined()).count()
    }

    /// Picks the worker minimizing `α·cpuUsage + β·routerCount`, ties
    /// broken by lowest worker id, then creates a fresh router on it
    /// pre-loaded with the configured codec list. Returns the entry (so
    /// the caller can subscribe to its quarantine notification) and the
    /// router handle.
    pub async fn acquire(&self) -> SfuResult<(Arc<WorkerEntry>, Box<dyn Router>)> {
        let candidate = self
            .entries
            .iter()
            .filter(|e| !e.is_quarantined())
            .min_by(|a, b| {
                let (ca, cb) = (a.cost(self.weights.alpha, self.weights.beta), b.cost(self.weights.alpha, self.weights.beta));
                ca.partial_cmp(&cb)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then_with(|| a.worker.id().cmp(&b.worker.id()))
            })
            .cloned();

        let entry = candidate.ok_or(SfuError::EngineUnavailable)?;

        let router = entry
            .worker
            .create_router(self.codecs.clone())
            .await
            .map_err(|e| SfuError::EngineError(EngineError::new(e)))?;

        Ok((entry, router))
    }

    /// Marks a worker ineligible for future `acquire()` calls and wakes
    /// every conference waiting on its quarantine notification so they can
    /// fail fast and force-disconnect their sockets (spec §4.1, §7).
    pub fn quarantine(&self, worker_id: &str, reason: &str) {
        if let Some(entry) = self.entries.iter().find(|e| e.worker.id() == worker_id) {
            let was_quarantined = entry.quarantined.swap(true, Ordering::SeqCst);
            if !was_quarantined {
                error!(worker_id, reason, "media worker quarantined");
                entry.quarantine_notify.notify_waiters();
            }
        } else {
            warn!(worker_id, "quarantine requested for unknown worker");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MediaSettings;
    use crate::engine::mock::MockEngine;

    fn settings(n: u32) -> MediaSettings {
        MediaSettings {
            worker_count: n,
            ..MediaSettings::default_for_tests()
        }
    }

    #[tokio::test]
    async fn acquire_breaks_ties_by_lowest_worker_id() {
        let engine = MockEngine::new();
        let pool = WorkerPool::new(&engine, &settings(3)).await.unwrap();

        let (entry, _router) = pool.acquire().await.unwrap();
        assert_eq!(entry.worker.id(), "worker-0");
    }

    #[tokio::test]
    async fn quarantined_worker_is_not_selected() {
        let engine = MockEngine::new();
        let pool = WorkerPool::new(&engine, &settings(2)).await.unwrap();

        pool.quarantine("worker-0", "simulated fatal error");

        let (entry, _router) = pool.acquire().await.unwrap();
        assert_eq!(entry.worker.id(), "worker-1");
    }

    #[tokio::test]
    async fn all_workers_quarantined_yields_engine_unavailable() {
        let engine = MockEngine::new();
        let pool = WorkerPool::new(&engine, &settings(1)).await.unwrap();
        pool.quarantine("worker-0", "simulated fatal error");

        let result = pool.acquire().await;
        assert!(matches!(result, Err(SfuError::EngineUnavailable)));
    }

    #[tokio::test]
    async fn quarantine_wakes_waiting_conferences() {
        let engine = MockEngine::new();
        let pool = WorkerPool::new(&engine, &settings(1)).await.unwrap();
        let (entry, _router) = pool.acquire().await.unwrap();

        let notify = entry.quarantine_notify.clone();
        let waiter = tokio::spawn(async move {
            notify.notified().await;
        });

        pool.quarantine("worker-0", "simulated fatal error");
        tokio::time::timeout(std::time::Duration::from_secs(1), waiter)
            .await
            .expect("quarantine notification should fire")
            .unwrap();
    }
}
