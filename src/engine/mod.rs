//! The `MediaEngine` boundary.
//!
//! Everything the spec calls "an external collaborator" — workers, routers,
//! transports, producers, consumers — is reached only through the traits in
//! this module. A production build would adapt a real engine (the teacher
//! links the `mediasoup` crate directly); this crate ships only the trait
//! plus [`mock::MockEngine`], which is enough to drive every operation and
//! every scenario in spec §8.
//!
//! RTP capabilities and RTP parameters stay opaque `serde_json::Value`
//! payloads end to end, the same way the teacher never parses them either
//! (`serde_json::to_value(transport.ice_parameters())` and friends in
//! `room_manager.rs`).

pub mod mock;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which direction a transport was created for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Producer,
    Consumer,
}

/// Application-level tag on a producer (spec §3/GLOSSARY).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Audio,
    Video,
    Screenshare,
}

/// The media kind negotiated at the RTP level (distinct from `StreamType`:
/// a screenshare is still `Video` at this level).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Audio,
    Video,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportState {
    New,
    Connected,
    Failed,
    Closed,
}

/// Connection parameters handed back to the client after transport creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransportDescriptor {
    pub id: String,
    pub ice_parameters: serde_json::Value,
    pub ice_candidates: serde_json::Value,
    pub dtls_parameters: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sctp_parameters: Option<serde_json::Value>,
}

/// One created consumer, as handed back from `consumeFromParticipant`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerDescriptor {
    pub id: String,
    pub producer_id: String,
    pub kind: MediaKind,
    pub rtp_parameters: serde_json::Value,
    pub stream_type: StreamType,
    pub producer_participant_id: String,
}

/// A handle to a media-engine worker process/thread.
#[async_trait]
pub trait Worker: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    /// Instantaneous CPU-usage estimate in `[0.0, 1.0]`, used by the
    /// `WorkerPool` cost metric. Allowed to be stale (spec §5).
    fn cpu_usage(&self) -> f64;

    /// Number of routers currently live on this worker.
    fn router_count(&self) -> usize;

    fn is_quarantined(&self) -> bool;

    async fn create_router(&self, codecs: serde_json::Value) -> anyhow::Result<Box<dyn Router>>;
}

/// A per-conference router handle.
#[async_trait]
pub trait Router: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    /// Codec/header-extension descriptor handed to joining clients.
    fn rtp_capabilities(&self) -> serde_json::Value;

    /// Whether this router can forward `producer_id`'s media to a peer
    /// advertising `rtp_capabilities`.
    fn can_consume(&self, producer_id: &str, rtp_capabilities: &serde_json::Value) -> bool;

    async fn create_transport(&self, direction: Direction) -> anyhow::Result<Box<dyn Transport>>;
}

/// A per-participant ICE/DTLS/SRTP endpoint.
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn descriptor(&self) -> TransportDescriptor;

    fn state(&self) -> TransportState;

    /// The dtls parameters passed to the last successful `connect`, if any —
    /// lets a caller tell a renegotiation attempt on an already-connected
    /// transport apart from a same-params retry without invoking the engine.
    fn connected_dtls(&self) -> Option<serde_json::Value>;

    async fn connect(&self, dtls_parameters: serde_json::Value) -> anyhow::Result<()>;

    async fn produce(
        &self,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> anyhow::Result<Box<dyn Producer>>;

    async fn consume(
        &self,
        producer_id: &str,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
    ) -> anyhow::Result<Box<dyn Consumer>>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// A server-side object receiving RTP from a client's producer transport.
#[async_trait]
pub trait Producer: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn kind(&self) -> MediaKind;

    fn is_paused(&self) -> bool;

    async fn pause(&self) -> anyhow::Result<()>;

    async fn resume(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// A server-side object forwarding one producer's RTP to one consumer
/// transport.
#[async_trait]
pub trait Consumer: Send + Sync + fmt::Debug {
    fn id(&self) -> String;

    fn producer_id(&self) -> String;

    fn kind(&self) -> MediaKind;

    fn rtp_parameters(&self) -> serde_json::Value;

    fn is_paused(&self) -> bool;

    async fn resume(&self) -> anyhow::Result<()>;

    async fn close(&self) -> anyhow::Result<()>;
}

/// Top-level entry point: creates workers, each pre-loaded with the
/// configured codec list.
#[async_trait]
pub trait MediaEngine: Send + Sync {
    async fn create_worker(&self) -> anyhow::Result<Box<dyn Worker>>;
}
