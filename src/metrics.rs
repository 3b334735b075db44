//! Observability (C6).
//!
//! Spec §4.6: gauges for current state are "derived from the registry, not
//! persisted separately", so `active_conferences`/`active_participants`/
//! `socket_connections` are set immediately before every scrape rather than
//! incremented/decremented at each call site. `joins_total`/`leaves_total`
//! are true monotonic counters, bumped by the gateway as joins/leaves
//! actually happen. Grounded on the `prometheus` crate's registry/encoder
//! pattern, the same exposition style as
//! `other_examples/manifests/Xiechengqi-selkies-core/Cargo.toml`'s use of
//! `prometheus = "0.13"` for a comparable WebRTC media server.

use prometheus::{Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Registry, TextEncoder};
use serde::Serialize;
use std::time::Instant;

pub struct Metrics {
    registry: Registry,
    active_conferences: IntGauge,
    active_participants: IntGauge,
    socket_connections: IntGauge,
    joins_total: IntCounter,
    leaves_total: IntCounter,
    join_latency_seconds: Histogram,
    produce_latency_seconds: Histogram,
    started_at: Instant,
}

impl Metrics {
    pub fn new() -> anyhow::Result<Self> {
        let registry = Registry::new();

        let active_conferences = IntGauge::new("active_conferences", "Number of live conferences")?;
        let active_participants = IntGauge::new("active_participants", "Number of joined participants across all conferences")?;
        let socket_connections = IntGauge::new("socket_connections", "Number of open signaling sockets")?;
        let joins_total = IntCounter::new("joins_total", "Total successful joinConference calls")?;
        let leaves_total = IntCounter::new("leaves_total", "Total leave completions, explicit or synthesized on disconnect")?;
        let join_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "join_latency_seconds",
            "Time from joinConference receipt to reply",
        ))?;
        let produce_latency_seconds = Histogram::with_opts(HistogramOpts::new(
            "produce_latency_seconds",
            "Time from produce receipt to reply",
        ))?;

        registry.register(Box::new(active_conferences.clone()))?;
        registry.register(Box::new(active_participants.clone()))?;
        registry.register(Box::new(socket_connections.clone()))?;
        registry.register(Box::new(joins_total.clone()))?;
        registry.register(Box::new(leaves_total.clone()))?;
        registry.register(Box::new(join_latency_seconds.clone()))?;
        registry.register(Box::new(produce_latency_seconds.clone()))?;

        Ok(Self {
            registry,
            active_conferences,
            active_participants,
            socket_connections,
            joins_total,
            leaves_total,
            join_latency_seconds,
            produce_latency_seconds,
            started_at: Instant::now(),
        })
    }

    pub fn record_join(&self) {
        self.joins_total.inc();
    }

    pub fn record_leave(&self) {
        self.leaves_total.inc();
    }

    pub fn observe_join_latency(&self, seconds: f64) {
        self.join_latency_seconds.observe(seconds);
    }

    pub fn observe_produce_latency(&self, seconds: f64) {
        self.produce_latency_seconds.observe(seconds);
    }

    pub fn uptime_seconds(&self) -> f64 {
        self.started_at.elapsed().as_secs_f64()
    }

    fn refresh_gauges(&self, active_conferences: i64, active_participants: i64, socket_connections: i64) {
        self.active_conferences.set(active_conferences);
        self.active_participants.set(active_participants);
        self.socket_connections.set(socket_connections);
    }

    /// Snapshots the registry/storage-derived gauges and renders everything
    /// in Prometheus text exposition format.
    pub fn render(&self, active_conferences: i64, active_participants: i64, socket_connections: i64) -> anyhow::Result<String> {
        self.refresh_gauges(active_conferences, active_participants, socket_connections);

        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        TextEncoder::new().encode(&metric_families, &mut buffer)?;
        Ok(String::from_utf8(buffer)?)
    }

    pub fn stats(&self, active_conferences: i64, active_participants: i64, socket_connections: i64) -> StatsSnapshot {
        self.refresh_gauges(active_conferences, active_participants, socket_connections);
        StatsSnapshot {
            active_conferences,
            active_participants,
            socket_connections,
            joins_total: self.joins_total.get(),
            leaves_total: self.leaves_total.get(),
            process_uptime_seconds: self.uptime_seconds(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub active_conferences: i64,
    pub active_participants: i64,
    pub socket_connections: i64,
    pub joins_total: u64,
    pub leaves_total: u64,
    pub process_uptime_seconds: f64,
}
