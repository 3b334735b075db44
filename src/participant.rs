//! Participant (C2): per-peer state container.
//!
//! Grounded on the teacher's `ParticipantMedia` in `media/room_manager.rs`
//! (send/recv transport pair, producer/consumer collections keyed by id),
//! generalized behind the `MediaEngine` trait boundary and given the
//! explicit contract methods spec §4.2 names (`attachTransport`,
//! `connectTransport`, `close`, mute/unmute) instead of the teacher's
//! free-standing `RoomManager` methods operating directly on mediasoup
//! types.

use crate::engine::{Direction, MediaKind, Producer, StreamType, Transport, TransportState};
use crate::error::{SfuError, SfuResult};
use std::collections::HashMap;
use tracing::debug;

struct ProducerEntry {
    producer: Box<dyn Producer>,
    stream_type: StreamType,
}

struct ConsumerEntry {
    consumer: Box<dyn crate::engine::Consumer>,
}

/// All per-peer state for one conference membership. Owned exclusively by
/// the `Conference` actor that created it; never shared or locked.
pub struct Participant {
    pub id: String,
    pub display_name: String,
    pub info: serde_json::Value,
    pub socket_id: String,
    pub audio_muted: bool,
    pub video_muted: bool,
    producer_transport: Option<Box<dyn Transport>>,
    consumer_transport: Option<Box<dyn Transport>>,
    producers: HashMap<String, ProducerEntry>,
    consumers: HashMap<String, ConsumerEntry>,
    /// producer_id -> consumer_id, so `AlreadyConsuming` can be detected
    /// without scanning `consumers`.
    consuming: HashMap<String, String>,
}

/// Everything closed by `Participant::close`, for the caller's cleanup
/// report (spec §4.3 `leave`).
#[derive(Debug, Default)]
pub struct ClosedResources {
    pub closed_producer_ids: Vec<String>,
    pub closed_consumer_ids: Vec<String>,
}

impl Participant {
    pub fn new(
        id: String,
        display_name: String,
        info: serde_json::Value,
        socket_id: String,
    ) -> Self {
        Self {
            id,
            display_name,
            info,
            socket_id,
            audio_muted: false,
            video_muted: false,
            producer_transport: None,
            consumer_transport: None,
            producers: HashMap::new(),
            consumers: HashMap::new(),
            consuming: HashMap::new(),
        }
    }

    fn transport_slot(&self, direction: Direction) -> &Option<Box<dyn Transport>> {
        match direction {
            Direction::Producer => &self.producer_transport,
            Direction::Consumer => &self.consumer_transport,
        }
    }

    fn transport_slot_mut(&mut self, direction: Direction) -> &mut Option<Box<dyn Transport>> {
        match direction {
            Direction::Producer => &mut self.producer_transport,
            Direction::Consumer => &mut self.consumer_transport,
        }
    }

    pub fn transport(&self, direction: Direction) -> Option<&dyn Transport> {
        self.transport_slot(direction).as_deref()
    }

    /// Spec §4.2: fails with `AlreadyExists` if this direction is already
    /// attached.
    pub fn attach_transport(
        &mut self,
        direction: Direction,
        transport: Box<dyn Transport>,
    ) -> SfuResult<()> {
        let slot = self.transport_slot_mut(direction);
        if slot.is_some() {
            return Err(SfuError::AlreadyExists(format!(
                "{direction:?} transport already attached for participant {}",
                self.id
            )));
        }
        *slot = Some(transport);
        Ok(())
    }

    /// Spec §4.2: `NotFound` if the direction has no transport yet,
    /// `InvalidState` if it isn't in `new`. Retrying the exact same dtls
    /// params on an already-connected transport succeeds without
    /// re-invoking the engine; a *different* set of params on an
    /// already-connected transport is rejected locally as `InvalidState`
    /// rather than forwarded to the engine.
    pub async fn connect_transport(
        &self,
        direction: Direction,
        dtls_parameters: serde_json::Value,
    ) -> SfuResult<()> {
        let transport = self
            .transport_slot(direction)
            .as_deref()
            .ok_or_else(|| SfuError::NotFound(format!("{direction:?} transport")))?;

        match transport.state() {
            TransportState::New => {}
            TransportState::Connected => {
                if transport.connected_dtls().as_ref() != Some(&dtls_parameters) {
                    return Err(SfuError::InvalidState(format!(
                        "{direction:?} transport is already connected with different dtls parameters"
                    )));
                }
            }
            other => {
                return Err(SfuError::InvalidState(format!(
                    "{direction:?} transport is in state {other:?}"
                )));
            }
        }

        transport.connect(dtls_parameters).await?;
        Ok(())
    }

    pub fn add_producer(&mut self, id: String, producer: Box<dyn Producer>, stream_type: StreamType) {
        self.producers.insert(id, ProducerEntry { producer, stream_type });
    }

    pub fn add_consumer(&mut self, id: String, producer_id: String, consumer: Box<dyn crate::engine::Consumer>) {
        self.consuming.insert(producer_id, id.clone());
        self.consumers.insert(id, ConsumerEntry { consumer });
    }

    pub fn is_already_consuming(&self, producer_id: &str) -> bool {
        self.consuming.contains_key(producer_id)
    }

    /// This participant's consumer id bound to `producer_id`, if any. Used
    /// by the Conference to find every consumer that must close before a
    /// producer does (spec §4.3: "every consumer bound to it is closed
    /// first").
    pub fn consumer_for_producer(&self, producer_id: &str) -> Option<String> {
        self.consuming.get(producer_id).cloned()
    }

    pub fn producer_ids(&self) -> Vec<(String, StreamType, MediaKind)> {
        self.producers
            .iter()
            .map(|(id, entry)| (id.clone(), entry.stream_type, entry.producer.kind()))
            .collect()
    }

    pub fn has_producer(&self, producer_id: &str) -> bool {
        self.producers.contains_key(producer_id)
    }

    pub fn has_consumer(&self, consumer_id: &str) -> bool {
        self.consumers.contains_key(consumer_id)
    }

    pub async fn resume_consumer(&self, consumer_id: &str) -> SfuResult<()> {
        let entry = self
            .consumers
            .get(consumer_id)
            .ok_or_else(|| SfuError::NotFound(format!("consumer {consumer_id}")))?;
        entry.consumer.resume().await?;
        Ok(())
    }

    /// Closes one producer (and, implicitly, every consumer bound to it —
    /// callers pass those consumer ids in via `bound_consumer_ids` since
    /// the Conference, not the Participant, knows who else is consuming
    /// this producer across the conference). Spec §4.3 tie-break: consumers
    /// close before the producer.
    pub async fn close_producer(&mut self, producer_id: &str) -> SfuResult<()> {
        let entry = self
            .producers
            .remove(producer_id)
            .ok_or_else(|| SfuError::NotFound(format!("producer {producer_id}")))?;
        entry.producer.close().await?;
        self.consuming.retain(|pid, _| pid != producer_id);
        Ok(())
    }

    pub async fn close_consumer(&mut self, consumer_id: &str) -> SfuResult<()> {
        let entry = self
            .consumers
            .remove(consumer_id)
            .ok_or_else(|| SfuError::NotFound(format!("consumer {consumer_id}")))?;
        entry.consumer.close().await?;
        self.consuming.retain(|_, cid| cid != consumer_id);
        Ok(())
    }

    /// Spec §4.2: pause/resume every producer of the given stream type,
    /// flip the flag, return the affected producer ids.
    pub async fn mute(&mut self, stream_type: StreamType) -> SfuResult<Vec<String>> {
        let mut affected = Vec::new();
        for (id, entry) in self.producers.iter() {
            if entry.stream_type == stream_type {
                entry.producer.pause().await?;
                affected.push(id.clone());
            }
        }
        match stream_type {
            StreamType::Audio => self.audio_muted = true,
            StreamType::Video => self.video_muted = true,
            StreamType::Screenshare => {}
        }
        Ok(affected)
    }

    pub async fn unmute(&mut self, stream_type: StreamType) -> SfuResult<Vec<String>> {
        let mut affected = Vec::new();
        for (id, entry) in self.producers.iter() {
            if entry.stream_type == stream_type {
                entry.producer.resume().await?;
                affected.push(id.clone());
            }
        }
        match stream_type {
            StreamType::Audio => self.audio_muted = false,
            StreamType::Video => self.video_muted = false,
            StreamType::Screenshare => {}
        }
        Ok(affected)
    }

    /// Spec §4.2 `close()`: closes, in order, all consumers, all producers,
    /// the consumer transport, then the producer transport. Idempotent —
    /// calling it twice just closes nothing the second time.
    pub async fn close(&mut self) -> SfuResult<ClosedResources> {
        let mut report = ClosedResources::default();

        for (id, entry) in self.consumers.drain() {
            let _ = entry.consumer.close().await;
            report.closed_consumer_ids.push(id);
        }
        self.consuming.clear();

        for (id, entry) in self.producers.drain() {
            let _ = entry.producer.close().await;
            report.closed_producer_ids.push(id);
        }

        if let Some(transport) = self.consumer_transport.take() {
            let _ = transport.close().await;
        }
        if let Some(transport) = self.producer_transport.take() {
            let _ = transport.close().await;
        }

        debug!(
            participant_id = %self.id,
            closed_producers = report.closed_producer_ids.len(),
            closed_consumers = report.closed_consumer_ids.len(),
            "participant closed"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{MediaEngine, Worker};
    use crate::engine::mock::MockEngine;

    async fn producer_transport() -> Box<dyn Transport> {
        let engine = MockEngine::new();
        let worker = engine.create_worker().await.unwrap();
        let router = worker
            .create_router(serde_json::json!([{ "mimeType": "audio/opus" }]))
            .await
            .unwrap();
        router.create_transport(Direction::Producer).await.unwrap()
    }

    #[tokio::test]
    async fn attach_transport_rejects_second_attach_same_direction() {
        let mut participant = Participant::new(
            "p1".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "sock-1".to_string(),
        );
        participant
            .attach_transport(Direction::Producer, producer_transport().await)
            .unwrap();

        let result = participant.attach_transport(Direction::Producer, producer_transport().await);
        assert!(matches!(result, Err(SfuError::AlreadyExists(_))));
    }

    #[tokio::test]
    async fn connect_transport_without_attach_is_not_found() {
        let participant = Participant::new(
            "p1".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "sock-1".to_string(),
        );
        let result = participant
            .connect_transport(Direction::Producer, serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(SfuError::NotFound(_))));
    }

    #[tokio::test]
    async fn connect_transport_is_idempotent_on_identical_params() {
        let mut participant = Participant::new(
            "p1".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "sock-1".to_string(),
        );
        participant
            .attach_transport(Direction::Producer, producer_transport().await)
            .unwrap();

        let dtls = serde_json::json!({"fingerprint": "aa:bb"});
        participant
            .connect_transport(Direction::Producer, dtls.clone())
            .await
            .unwrap();
        participant
            .connect_transport(Direction::Producer, dtls)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn connect_transport_rejects_different_params_once_connected() {
        let mut participant = Participant::new(
            "p1".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "sock-1".to_string(),
        );
        participant
            .attach_transport(Direction::Producer, producer_transport().await)
            .unwrap();

        participant
            .connect_transport(Direction::Producer, serde_json::json!({"fingerprint": "aa:bb"}))
            .await
            .unwrap();

        let result = participant
            .connect_transport(Direction::Producer, serde_json::json!({"fingerprint": "cc:dd"}))
            .await;
        assert!(matches!(result, Err(SfuError::InvalidState(_))));
    }

    #[tokio::test]
    async fn close_is_idempotent_and_reports_what_it_closed() {
        let mut participant = Participant::new(
            "p1".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "sock-1".to_string(),
        );
        participant
            .attach_transport(Direction::Producer, producer_transport().await)
            .unwrap();

        let report1 = participant.close().await.unwrap();
        assert!(report1.closed_producer_ids.is_empty());

        let report2 = participant.close().await.unwrap();
        assert!(report2.closed_producer_ids.is_empty());
        assert!(report2.closed_consumer_ids.is_empty());
    }
}
