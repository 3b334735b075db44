//! An in-memory `MediaEngine` used by the test suite (and by the binary
//! when no real engine is wired in). Deterministic, fast, and supports
//! injecting a single failure into the next `produce()` call so the
//! "engine failure mid-produce" scenario (spec §8 scenario 6) is
//! reproducible without a real media engine.

use super::{
    Consumer, Direction, MediaEngine, MediaKind, Producer, Router, Transport, TransportDescriptor,
    TransportState, Worker,
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use uuid::Uuid;

fn next_id(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

/// Extracts the codec names from the opaque capability/codec-list JSON the
/// rest of the crate treats as a black box. The mock engine is the only
/// place allowed to look inside these blobs, and only to model
/// `can_consume` compatibility.
fn codec_names(value: &serde_json::Value) -> HashSet<String> {
    value
        .as_array()
        .map(|codecs| {
            codecs
                .iter()
                .filter_map(|c| c.get("mimeType").or_else(|| c.get("mime_type")))
                .filter_map(|m| m.as_str())
                .map(|s| s.to_ascii_lowercase())
                .collect()
        })
        .unwrap_or_default()
}

#[derive(Debug, Default)]
pub struct MockEngine {
    worker_counter: AtomicU32,
    /// Engine-wide fault-injection flag: set by
    /// [`MockEngine::inject_next_produce_failure`], consumed by whichever
    /// transport's `produce()` runs next, anywhere in the engine. This is
    /// the mechanism behind spec §8 scenario 6 ("engine failure
    /// mid-produce") — tests never need to reach into a specific
    /// transport to arrange it.
    fail_next_produce: Arc<AtomicBool>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: makes the next `produce()` call anywhere on this engine
    /// fail, exactly once.
    pub fn inject_next_produce_failure(&self) {
        self.fail_next_produce.store(true, Ordering::SeqCst);
    }
}

#[async_trait]
impl MediaEngine for MockEngine {
    async fn create_worker(&self) -> anyhow::Result<Box<dyn Worker>> {
        let id = self.worker_counter.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockWorker::new(id, self.fail_next_produce.clone())))
    }
}

#[derive(Debug)]
pub struct MockWorker {
    id: String,
    dead: AtomicBool,
    router_count: AtomicUsize,
    cpu_usage: Mutex<f64>,
    fail_next_produce: Arc<AtomicBool>,
}

impl MockWorker {
    fn new(ordinal: u32, fail_next_produce: Arc<AtomicBool>) -> Self {
        Self {
            id: format!("worker-{ordinal}"),
            dead: AtomicBool::new(false),
            router_count: AtomicUsize::new(0),
            cpu_usage: Mutex::new(0.0),
            fail_next_produce,
        }
    }

    /// Test hook: simulates the worker reporting a fatal error.
    pub fn kill(&self) {
        self.dead.store(true, Ordering::SeqCst);
    }

    /// Test hook: sets the synthetic CPU usage read by the cost metric.
    pub fn set_cpu_usage(&self, usage: f64) {
        *self.cpu_usage.lock().unwrap() = usage;
    }
}

#[async_trait]
impl Worker for MockWorker {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn cpu_usage(&self) -> f64 {
        *self.cpu_usage.lock().unwrap()
    }

    fn router_count(&self) -> usize {
        self.router_count.load(Ordering::Relaxed)
    }

    fn is_quarantined(&self) -> bool {
        self.dead.load(Ordering::SeqCst)
    }

    async fn create_router(&self, codecs: serde_json::Value) -> anyhow::Result<Box<dyn Router>> {
        if self.is_quarantined() {
            anyhow::bail!("worker {} is quarantined", self.id);
        }
        self.router_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(MockRouter::new(codecs, self.fail_next_produce.clone())))
    }
}

type ProducerCodecs = Arc<Mutex<std::collections::HashMap<String, String>>>;

#[derive(Debug)]
pub struct MockRouter {
    id: String,
    codecs: serde_json::Value,
    supported: Arc<HashSet<String>>,
    /// producer_id -> codec used, so `can_consume` can check compatibility
    /// against a peer's advertised capabilities. Shared with every
    /// transport created on this router so `produce()` can register
    /// directly without routing back through the router object.
    producer_codecs: ProducerCodecs,
    fail_next_produce: Arc<AtomicBool>,
}

impl MockRouter {
    fn new(codecs: serde_json::Value, fail_next_produce: Arc<AtomicBool>) -> Self {
        let supported = Arc::new(codec_names(&codecs));
        Self {
            id: next_id("router"),
            codecs,
            supported,
            producer_codecs: Arc::new(Mutex::new(std::collections::HashMap::new())),
            fail_next_produce,
        }
    }
}

#[async_trait]
impl Router for MockRouter {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn rtp_capabilities(&self) -> serde_json::Value {
        serde_json::json!({ "codecs": self.codecs })
    }

    fn can_consume(&self, producer_id: &str, rtp_capabilities: &serde_json::Value) -> bool {
        let producer_codec = match self.producer_codecs.lock().unwrap().get(producer_id) {
            Some(c) => c.clone(),
            None => return false,
        };
        let peer_codecs = codec_names(rtp_capabilities);
        peer_codecs.contains(&producer_codec) && self.supported.contains(&producer_codec)
    }

    async fn create_transport(&self, direction: Direction) -> anyhow::Result<Box<dyn Transport>> {
        Ok(Box::new(MockTransport::new(
            direction,
            self.producer_codecs.clone(),
            self.fail_next_produce.clone(),
        )))
    }
}

#[derive(Debug)]
pub struct MockTransport {
    id: String,
    producer_codecs: ProducerCodecs,
    state: Mutex<TransportState>,
    connected_dtls: Mutex<Option<serde_json::Value>>,
    fail_next_produce: Arc<AtomicBool>,
}

impl MockTransport {
    fn new(
        _direction: Direction,
        producer_codecs: ProducerCodecs,
        fail_next_produce: Arc<AtomicBool>,
    ) -> Self {
        Self {
            id: next_id("transport"),
            producer_codecs,
            state: Mutex::new(TransportState::New),
            connected_dtls: Mutex::new(None),
            fail_next_produce,
        }
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn descriptor(&self) -> TransportDescriptor {
        TransportDescriptor {
            id: self.id.clone(),
            ice_parameters: serde_json::json!({ "usernameFragment": next_id("ufrag") }),
            ice_candidates: serde_json::json!([]),
            dtls_parameters: serde_json::json!({ "role": "auto" }),
            sctp_parameters: None,
        }
    }

    fn state(&self) -> TransportState {
        *self.state.lock().unwrap()
    }

    fn connected_dtls(&self) -> Option<serde_json::Value> {
        self.connected_dtls.lock().unwrap().clone()
    }

    async fn connect(&self, dtls_parameters: serde_json::Value) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        let mut connected = self.connected_dtls.lock().unwrap();
        match *state {
            TransportState::New => {
                *state = TransportState::Connected;
                *connected = Some(dtls_parameters);
                Ok(())
            }
            TransportState::Connected if connected.as_ref() == Some(&dtls_parameters) => {
                // Idempotent retry with identical dtls parameters.
                Ok(())
            }
            _ => anyhow::bail!("transport {} is not in a connectable state", self.id),
        }
    }

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> anyhow::Result<Box<dyn Producer>> {
        if self.fail_next_produce.swap(false, Ordering::SeqCst) {
            anyhow::bail!("simulated engine failure creating producer on {}", self.id);
        }
        let codec = rtp_parameters
            .get("codecs")
            .and_then(|c| c.as_array())
            .and_then(|a| a.first())
            .and_then(|c| c.get("mimeType").or_else(|| c.get("mime_type")))
            .and_then(|m| m.as_str())
            .unwrap_or(match kind {
                MediaKind::Audio => "audio/opus",
                MediaKind::Video => "video/vp8",
            })
            .to_string();
        let producer = MockProducer::new(kind, codec.clone());
        self.producer_codecs
            .lock()
            .unwrap()
            .insert(producer.id(), codec.to_ascii_lowercase());
        Ok(Box::new(producer))
    }

    async fn consume(
        &self,
        producer_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> anyhow::Result<Box<dyn Consumer>> {
        Ok(Box::new(MockConsumer::new(
            producer_id.to_string(),
            kind,
            rtp_parameters,
        )))
    }

    async fn close(&self) -> anyhow::Result<()> {
        *self.state.lock().unwrap() = TransportState::Closed;
        Ok(())
    }
}

#[derive(Debug)]
struct MockProducer {
    id: String,
    kind: MediaKind,
    #[allow(dead_code)]
    codec: String,
    paused: AtomicBool,
    closed: AtomicBool,
}

impl MockProducer {
    fn new(kind: MediaKind, codec: String) -> Self {
        Self {
            id: next_id("producer"),
            kind,
            codec,
            paused: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Producer for MockProducer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    async fn pause(&self) -> anyhow::Result<()> {
        self.paused.store(true, Ordering::Relaxed);
        Ok(())
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

#[derive(Debug)]
struct MockConsumer {
    id: String,
    producer_id: String,
    kind: MediaKind,
    rtp_parameters: serde_json::Value,
    paused: AtomicBool,
}

impl MockConsumer {
    fn new(producer_id: String, kind: MediaKind, rtp_parameters: serde_json::Value) -> Self {
        Self {
            id: next_id("consumer"),
            producer_id,
            kind,
            rtp_parameters,
            // Spec §4.3 step 3: every consumer starts paused.
            paused: AtomicBool::new(true),
        }
    }
}

#[async_trait]
impl Consumer for MockConsumer {
    fn id(&self) -> String {
        self.id.clone()
    }

    fn producer_id(&self) -> String {
        self.producer_id.clone()
    }

    fn kind(&self) -> MediaKind {
        self.kind
    }

    fn rtp_parameters(&self) -> serde_json::Value {
        self.rtp_parameters.clone()
    }

    fn is_paused(&self) -> bool {
        self.paused.load(Ordering::Relaxed)
    }

    async fn resume(&self) -> anyhow::Result<()> {
        self.paused.store(false, Ordering::Relaxed);
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opus_capabilities() -> serde_json::Value {
        serde_json::json!([{ "mimeType": "audio/opus" }, { "mimeType": "video/vp8" }])
    }

    #[tokio::test]
    async fn router_can_consume_only_registered_compatible_codecs() {
        let engine = MockEngine::new();
        let worker = engine.create_worker().await.unwrap();
        let router = worker.create_router(opus_capabilities()).await.unwrap();

        let transport = router.create_transport(Direction::Producer).await.unwrap();
        let producer = transport
            .produce(
                MediaKind::Audio,
                serde_json::json!({ "codecs": [{ "mimeType": "audio/opus" }] }),
            )
            .await
            .unwrap();

        assert!(router.can_consume(&producer.id(), &opus_capabilities()));
        assert!(!router.can_consume(
            &producer.id(),
            &serde_json::json!([{ "mimeType": "video/h264" }])
        ));
    }

    #[tokio::test]
    async fn produce_failure_can_be_injected_and_is_single_shot() {
        let engine = MockEngine::new();
        let worker = engine.create_worker().await.unwrap();
        let router = worker.create_router(opus_capabilities()).await.unwrap();
        let transport = router.create_transport(Direction::Producer).await.unwrap();
        transport
            .connect(serde_json::json!({"fingerprint": "x"}))
            .await
            .unwrap();

        engine.inject_next_produce_failure();

        let failed = transport
            .produce(MediaKind::Audio, serde_json::json!({}))
            .await;
        assert!(failed.is_err());

        // The injected failure only applies once; the retry succeeds.
        let ok = transport
            .produce(
                MediaKind::Audio,
                serde_json::json!({ "codecs": [{ "mimeType": "audio/opus" }] }),
            )
            .await;
        assert!(ok.is_ok());
    }
}
