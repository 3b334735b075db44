//! Conference (C3): the single-logical-owner actor that serializes every
//! state-mutating operation against one conference's participants.
//!
//! Grounded on the teacher's `MediaRoom`/`RoomManager` (`media/room_manager.rs`)
//! for the shape of the per-room state and operations, reworked per spec §5
//! and §9's "re-architecture" notes from a `DashMap<ObjectId, MediaRoom>`
//! guarded ad hoc into one `tokio::task` per conference that owns its state
//! outright, driven by a `tokio::sync::mpsc` command channel with
//! `tokio::sync::oneshot` replies, exactly the "reified request +
//! reply-channel" pattern §9 calls for instead of nested callbacks.

use crate::engine::{
    ConsumerDescriptor, Direction, MediaKind, Router, StreamType, TransportDescriptor,
};
use crate::error::{SfuError, SfuResult};
use crate::participant::{ClosedResources, Participant};
use crate::worker_pool::WorkerEntry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::timeout;
use tracing::{debug, warn};

/// Spec §5: server-imposed deadline on any handler that invokes the
/// `MediaEngine`. Expiry surfaces as `OperationTimeout` and completes the
/// operation there — nothing past the timed-out await is ever run.
const OPERATION_TIMEOUT: Duration = Duration::from_secs(10);

async fn with_timeout<T>(fut: impl std::future::Future<Output = SfuResult<T>>) -> SfuResult<T> {
    match timeout(OPERATION_TIMEOUT, fut).await {
        Ok(result) => result,
        Err(_) => Err(SfuError::OperationTimeout),
    }
}

/// Notifications a conference fans out to every participant socket, one
/// per-conference broadcast channel (§9: never a process-wide bus).
#[derive(Debug, Clone)]
pub enum ConferenceEvent {
    ParticipantJoined {
        participant_id: String,
        display_name: String,
        info: serde_json::Value,
    },
    NewProducer {
        producer_id: String,
        participant_id: String,
        participant_name: String,
        stream_type: StreamType,
        kind: MediaKind,
    },
    ProducerClosed {
        producer_id: String,
        participant_id: String,
        kind: MediaKind,
    },
    ConsumerClosed {
        consumer_id: String,
        participant_id: String,
        /// The participant whose action closed this consumer — the owner
        /// themselves for a direct `closeConsumer`, or the producer's owner
        /// when this is a cascade close from `closeProducer`. Used by the
        /// gateway to skip re-delivering a self-triggered notification to
        /// its own actor; never sent on the wire.
        origin_participant_id: String,
    },
    ParticipantLeft {
        participant_id: String,
        closed_producer_ids: Vec<String>,
        closed_consumer_ids: Vec<String>,
    },
    AudioMuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    AudioUnmuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    VideoMuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    VideoUnmuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    /// Spec §7: emitted once, immediately before the gateway force-disconnects
    /// every socket bound to a conference whose worker was quarantined.
    ConferenceTerminated,
}

pub struct JoinResult {
    pub rtp_capabilities: serde_json::Value,
}

pub struct LeaveResult {
    pub closed: ClosedResources,
}

type Reply<T> = oneshot::Sender<SfuResult<T>>;

enum Command {
    Join {
        participant_id: String,
        display_name: String,
        info: serde_json::Value,
        socket_id: String,
        reply: Reply<JoinResult>,
    },
    CreateTransport {
        participant_id: String,
        direction: Direction,
        reply: Reply<TransportDescriptor>,
    },
    ConnectTransport {
        participant_id: String,
        direction: Direction,
        dtls_parameters: serde_json::Value,
        reply: Reply<()>,
    },
    Produce {
        participant_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        stream_type: StreamType,
        reply: Reply<String>,
    },
    ConsumeFromParticipant {
        participant_id: String,
        target_participant_id: String,
        rtp_capabilities: serde_json::Value,
        reply: Reply<Vec<ConsumerDescriptor>>,
    },
    ResumeConsumer {
        participant_id: String,
        consumer_id: String,
        reply: Reply<()>,
    },
    CloseProducer {
        participant_id: String,
        producer_id: String,
        reply: Reply<()>,
    },
    CloseConsumer {
        participant_id: String,
        consumer_id: String,
        reply: Reply<()>,
    },
    MuteAudio {
        participant_id: String,
        reply: Reply<Vec<String>>,
    },
    UnmuteAudio {
        participant_id: String,
        reply: Reply<Vec<String>>,
    },
    MuteVideo {
        participant_id: String,
        reply: Reply<Vec<String>>,
    },
    UnmuteVideo {
        participant_id: String,
        reply: Reply<Vec<String>>,
    },
    Leave {
        participant_id: String,
        reply: Reply<LeaveResult>,
    },
    ParticipantCount {
        reply: oneshot::Sender<usize>,
    },
    GetParticipants {
        reply: oneshot::Sender<Vec<ParticipantSummary>>,
    },
}

/// One row of `getParticipants`' response (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ParticipantSummary {
    pub participant_id: String,
    pub participant_name: String,
}

/// A cheaply-cloned handle callers use to talk to a running conference
/// actor. The actor itself (`ConferenceState` + its run loop) never leaves
/// its owning task.
#[derive(Clone)]
pub struct ConferenceHandle {
    id: Arc<str>,
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<ConferenceEvent>,
}

impl ConferenceHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConferenceEvent> {
        self.events.subscribe()
    }

    async fn call<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> Command,
    ) -> SfuResult<T> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(make(tx))
            .await
            .map_err(|_| SfuError::EngineUnavailable)?;
        rx.await.map_err(|_| SfuError::EngineUnavailable)?
    }

    pub async fn join(
        &self,
        participant_id: String,
        display_name: String,
        info: serde_json::Value,
        socket_id: String,
    ) -> SfuResult<JoinResult> {
        self.call(|reply| Command::Join {
            participant_id,
            display_name,
            info,
            socket_id,
            reply,
        })
        .await
    }

    pub async fn create_transport(
        &self,
        participant_id: String,
        direction: Direction,
    ) -> SfuResult<TransportDescriptor> {
        self.call(|reply| Command::CreateTransport {
            participant_id,
            direction,
            reply,
        })
        .await
    }

    pub async fn connect_transport(
        &self,
        participant_id: String,
        direction: Direction,
        dtls_parameters: serde_json::Value,
    ) -> SfuResult<()> {
        self.call(|reply| Command::ConnectTransport {
            participant_id,
            direction,
            dtls_parameters,
            reply,
        })
        .await
    }

    pub async fn produce(
        &self,
        participant_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        stream_type: StreamType,
    ) -> SfuResult<String> {
        self.call(|reply| Command::Produce {
            participant_id,
            kind,
            rtp_parameters,
            stream_type,
            reply,
        })
        .await
    }

    pub async fn consume_from_participant(
        &self,
        participant_id: String,
        target_participant_id: String,
        rtp_capabilities: serde_json::Value,
    ) -> SfuResult<Vec<ConsumerDescriptor>> {
        self.call(|reply| Command::ConsumeFromParticipant {
            participant_id,
            target_participant_id,
            rtp_capabilities,
            reply,
        })
        .await
    }

    pub async fn resume_consumer(&self, participant_id: String, consumer_id: String) -> SfuResult<()> {
        self.call(|reply| Command::ResumeConsumer {
            participant_id,
            consumer_id,
            reply,
        })
        .await
    }

    pub async fn close_producer(&self, participant_id: String, producer_id: String) -> SfuResult<()> {
        self.call(|reply| Command::CloseProducer {
            participant_id,
            producer_id,
            reply,
        })
        .await
    }

    pub async fn close_consumer(&self, participant_id: String, consumer_id: String) -> SfuResult<()> {
        self.call(|reply| Command::CloseConsumer {
            participant_id,
            consumer_id,
            reply,
        })
        .await
    }

    pub async fn mute_audio(&self, participant_id: String) -> SfuResult<Vec<String>> {
        self.call(|reply| Command::MuteAudio { participant_id, reply }).await
    }

    pub async fn unmute_audio(&self, participant_id: String) -> SfuResult<Vec<String>> {
        self.call(|reply| Command::UnmuteAudio { participant_id, reply }).await
    }

    pub async fn mute_video(&self, participant_id: String) -> SfuResult<Vec<String>> {
        self.call(|reply| Command::MuteVideo { participant_id, reply }).await
    }

    pub async fn unmute_video(&self, participant_id: String) -> SfuResult<Vec<String>> {
        self.call(|reply| Command::UnmuteVideo { participant_id, reply }).await
    }

    pub async fn leave(&self, participant_id: String) -> SfuResult<LeaveResult> {
        self.call(|reply| Command::Leave { participant_id, reply }).await
    }

    /// Used by the registry's `removeIfEmpty` after a leave completes.
    pub async fn participant_count(&self) -> usize {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::ParticipantCount { reply: tx }).await.is_err() {
            return 0;
        }
        rx.await.unwrap_or(0)
    }

    pub async fn get_participants(&self) -> Vec<ParticipantSummary> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::GetParticipants { reply: tx }).await.is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }
}

struct ConferenceState {
    id: Arc<str>,
    router: Box<dyn Router>,
    worker: Arc<WorkerEntry>,
    participants: HashMap<String, Participant>,
    max_participants: u32,
    degraded: bool,
    events: broadcast::Sender<ConferenceEvent>,
}

impl ConferenceState {
    fn emit(&self, event: ConferenceEvent) {
        // No subscribers yet (e.g. a lone joiner) is not an error.
        let _ = self.events.send(event);
    }

    fn participant(&self, id: &str) -> SfuResult<&Participant> {
        self.participants
            .get(id)
            .ok_or_else(|| SfuError::NotFound(format!("participant {id}")))
    }

    fn participant_mut(&mut self, id: &str) -> SfuResult<&mut Participant> {
        self.participants
            .get_mut(id)
            .ok_or_else(|| SfuError::NotFound(format!("participant {id}")))
    }

    fn ensure_not_degraded(&self) -> SfuResult<()> {
        if self.degraded {
            return Err(SfuError::EngineUnavailable);
        }
        Ok(())
    }

    fn handle_join(
        &mut self,
        participant_id: String,
        display_name: String,
        info: serde_json::Value,
        socket_id: String,
    ) -> SfuResult<JoinResult> {
        self.ensure_not_degraded()?;

        if participant_id.is_empty() {
            return Err(SfuError::ProtocolError("participantId must not be empty".to_string()));
        }
        if self.participants.contains_key(&participant_id) {
            return Err(SfuError::DuplicateParticipant(participant_id));
        }
        if self.max_participants > 0 && self.participants.len() as u32 >= self.max_participants {
            return Err(SfuError::CapacityExceeded);
        }

        self.participants.insert(
            participant_id.clone(),
            Participant::new(participant_id.clone(), display_name.clone(), info.clone(), socket_id),
        );

        // Invariant 1 (spec §8): participantJoined precedes any newProducer
        // from this participant on every recipient timeline. Emitting it
        // synchronously, before the reply unblocks the caller to produce
        // anything, is what guarantees the ordering.
        self.emit(ConferenceEvent::ParticipantJoined {
            participant_id,
            display_name,
            info,
        });

        Ok(JoinResult {
            rtp_capabilities: self.router.rtp_capabilities(),
        })
    }

    async fn handle_create_transport(
        &mut self,
        participant_id: String,
        direction: Direction,
    ) -> SfuResult<TransportDescriptor> {
        self.ensure_not_degraded()?;
        self.participant(&participant_id)?;

        let transport = with_timeout(async {
            self.router.create_transport(direction).await.map_err(SfuError::from)
        })
        .await?;
        let descriptor = transport.descriptor();

        self.participant_mut(&participant_id)?
            .attach_transport(direction, transport)?;

        Ok(descriptor)
    }

    async fn handle_connect_transport(
        &mut self,
        participant_id: String,
        direction: Direction,
        dtls_parameters: serde_json::Value,
    ) -> SfuResult<()> {
        self.ensure_not_degraded()?;
        let participant = self.participant(&participant_id)?;
        with_timeout(participant.connect_transport(direction, dtls_parameters)).await
    }

    async fn handle_produce(
        &mut self,
        participant_id: String,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        stream_type: StreamType,
    ) -> SfuResult<String> {
        self.ensure_not_degraded()?;
        let participant = self.participant(&participant_id)?;
        let transport = participant
            .transport(Direction::Producer)
            .ok_or(SfuError::TransportNotConnected)?;
        if transport.state() != crate::engine::TransportState::Connected {
            return Err(SfuError::TransportNotConnected);
        }

        // Engine failure here (spec §8 scenario 6) must not mutate any
        // participant state: the `?` below returns before `add_producer`
        // runs, so the rollback is simply "never wrote anything". The same
        // holds for a timeout (spec §5): nothing is recorded until the
        // engine call actually resolves.
        let producer = with_timeout(async {
            transport.produce(kind, rtp_parameters).await.map_err(SfuError::from)
        })
        .await?;
        let producer_id = producer.id();

        let participant_name = participant.display_name.clone();

        let participant = self.participant_mut(&participant_id)?;
        participant.add_producer(producer_id.clone(), producer, stream_type);

        self.emit(ConferenceEvent::NewProducer {
            producer_id: producer_id.clone(),
            participant_id,
            participant_name,
            stream_type,
            kind,
        });

        Ok(producer_id)
    }

    async fn handle_consume(
        &mut self,
        participant_id: String,
        target_participant_id: String,
        rtp_capabilities: serde_json::Value,
    ) -> SfuResult<Vec<ConsumerDescriptor>> {
        self.ensure_not_degraded()?;

        if target_participant_id == participant_id {
            return Err(SfuError::InvalidTarget);
        }

        self.participant(&participant_id)?;
        let target_producers = self.participant(&target_participant_id)?.producer_ids();

        if self
            .participant(&participant_id)?
            .transport(Direction::Consumer)
            .is_none()
        {
            return Err(SfuError::TransportNotReady);
        }

        // Spec §7: a recoverable error partway through must never leave
        // orphaned engine-side consumers behind. Check every target producer
        // for an existing consumer up front, before creating any of this
        // call's consumers, so `AlreadyConsuming` can never fire after some
        // have already been registered.
        for (producer_id, _, _) in &target_producers {
            if self.participant(&participant_id)?.is_already_consuming(producer_id) {
                return Err(SfuError::AlreadyConsuming);
            }
        }

        let mut descriptors = Vec::new();
        for (producer_id, stream_type, kind) in target_producers {
            if !self.router.can_consume(&producer_id, &rtp_capabilities) {
                continue;
            }

            let consume_result = {
                let requester = self.participant(&participant_id)?;
                let consumer_transport = requester
                    .transport(Direction::Consumer)
                    .ok_or(SfuError::TransportNotReady)?;
                with_timeout(async {
                    consumer_transport
                        .consume(&producer_id, kind, rtp_capabilities.clone())
                        .await
                        .map_err(SfuError::from)
                })
                .await
            };

            let consumer = match consume_result {
                Ok(consumer) => consumer,
                Err(e) => {
                    self.rollback_consumers(&participant_id, &descriptors).await;
                    return Err(e);
                }
            };

            let descriptor = ConsumerDescriptor {
                id: consumer.id(),
                producer_id: producer_id.clone(),
                kind,
                rtp_parameters: consumer.rtp_parameters(),
                stream_type,
                producer_participant_id: target_participant_id.clone(),
            };

            self.participant_mut(&participant_id)?
                .add_consumer(descriptor.id.clone(), producer_id, consumer);
            descriptors.push(descriptor);
        }

        Ok(descriptors)
    }

    /// Closes every consumer already created by an in-progress `consume`
    /// call that failed partway through, so a later error never leaves
    /// engine-side consumers the caller was never told about.
    async fn rollback_consumers(&mut self, participant_id: &str, descriptors: &[ConsumerDescriptor]) {
        if let Ok(participant) = self.participant_mut(participant_id) {
            for descriptor in descriptors {
                let _ = participant.close_consumer(&descriptor.id).await;
            }
        }
    }

    async fn handle_resume_consumer(&mut self, participant_id: String, consumer_id: String) -> SfuResult<()> {
        self.ensure_not_degraded()?;
        let participant = self.participant(&participant_id)?;
        with_timeout(participant.resume_consumer(&consumer_id)).await
    }

    async fn handle_close_producer(&mut self, participant_id: String, producer_id: String) -> SfuResult<()> {
        self.ensure_not_degraded()?;
        let kind = self
            .participant(&participant_id)?
            .producer_ids()
            .into_iter()
            .find(|(id, _, _)| id == &producer_id)
            .map(|(_, _, kind)| kind)
            .ok_or_else(|| SfuError::NotFound(format!("producer {producer_id}")))?;

        // Spec §4.3: every consumer bound to this producer closes first,
        // emitting consumerClosed each, then producerClosed for the producer.
        let bound: Vec<(String, String)> = self
            .participants
            .iter()
            .filter_map(|(peer_id, peer)| {
                peer.consumer_for_producer(&producer_id)
                    .map(|cid| (peer_id.clone(), cid))
            })
            .collect();

        for (peer_id, consumer_id) in bound {
            if let Some(peer) = self.participants.get_mut(&peer_id) {
                if with_timeout(peer.close_consumer(&consumer_id)).await.is_ok() {
                    self.emit(ConferenceEvent::ConsumerClosed {
                        consumer_id,
                        participant_id: peer_id,
                        origin_participant_id: participant_id.clone(),
                    });
                }
            }
        }

        with_timeout(self.participant_mut(&participant_id)?.close_producer(&producer_id)).await?;

        self.emit(ConferenceEvent::ProducerClosed {
            producer_id,
            participant_id,
            kind,
        });
        Ok(())
    }

    async fn handle_close_consumer(&mut self, participant_id: String, consumer_id: String) -> SfuResult<()> {
        self.ensure_not_degraded()?;
        with_timeout(
            self.participant_mut(&participant_id)?
                .close_consumer(&consumer_id),
        )
        .await?;
        self.emit(ConferenceEvent::ConsumerClosed {
            consumer_id,
            origin_participant_id: participant_id.clone(),
            participant_id,
        });
        Ok(())
    }

    async fn handle_mute(&mut self, participant_id: String, stream_type: StreamType, mute: bool) -> SfuResult<Vec<String>> {
        self.ensure_not_degraded()?;
        let affected = if mute {
            with_timeout(self.participant_mut(&participant_id)?.mute(stream_type)).await?
        } else {
            with_timeout(self.participant_mut(&participant_id)?.unmute(stream_type)).await?
        };

        let event = match (stream_type, mute) {
            (StreamType::Audio, true) => ConferenceEvent::AudioMuted {
                participant_id,
                producer_ids: affected.clone(),
            },
            (StreamType::Audio, false) => ConferenceEvent::AudioUnmuted {
                participant_id,
                producer_ids: affected.clone(),
            },
            (StreamType::Video, true) => ConferenceEvent::VideoMuted {
                participant_id,
                producer_ids: affected.clone(),
            },
            (StreamType::Video, false) => ConferenceEvent::VideoUnmuted {
                participant_id,
                producer_ids: affected.clone(),
            },
            (StreamType::Screenshare, _) => return Ok(affected),
        };
        self.emit(event);
        Ok(affected)
    }

    async fn handle_leave(&mut self, participant_id: String) -> SfuResult<LeaveResult> {
        let mut participant = self
            .participants
            .remove(&participant_id)
            .ok_or_else(|| SfuError::NotFound(format!("participant {participant_id}")))?;

        let closed = with_timeout(participant.close()).await?;

        // Invariant 3 (spec §8): participantLeft is the terminal event for
        // this id; nothing else referencing it is emitted after this point.
        self.emit(ConferenceEvent::ParticipantLeft {
            participant_id,
            closed_producer_ids: closed.closed_producer_ids.clone(),
            closed_consumer_ids: closed.closed_consumer_ids.clone(),
        });

        Ok(LeaveResult { closed })
    }
}

/// Spawns the conference actor task and returns a handle to it. The actor
/// runs until every `ConferenceHandle` clone (and the registry's own copy)
/// is dropped, or the owning worker is quarantined and the task observes
/// `worker.quarantine_notify`.
pub fn spawn(
    id: String,
    router: Box<dyn Router>,
    worker: Arc<WorkerEntry>,
    max_participants: u32,
) -> ConferenceHandle {
    let id: Arc<str> = Arc::from(id);
    let (commands_tx, mut commands_rx) = mpsc::channel::<Command>(128);
    let (events_tx, _) = broadcast::channel(256);

    let handle = ConferenceHandle {
        id: id.clone(),
        commands: commands_tx,
        events: events_tx.clone(),
    };

    let mut state = ConferenceState {
        id: id.clone(),
        router,
        worker: worker.clone(),
        participants: HashMap::new(),
        max_participants,
        degraded: false,
        events: events_tx,
    };

    tokio::spawn(async move {
        let quarantine_notify = worker.quarantine_notify.clone();
        loop {
            tokio::select! {
                biased;

                _ = quarantine_notify.notified(), if !state.degraded => {
                    warn!(conference_id = %state.id, "conference degraded: backing worker was quarantined");
                    state.degraded = true;
                    state.emit(ConferenceEvent::ConferenceTerminated);
                }

                maybe_command = commands_rx.recv() => {
                    let Some(command) = maybe_command else { break };
                    dispatch(&mut state, command).await;
                }
            }
        }
        debug!(conference_id = %state.id, "conference actor stopped");
    });

    handle
}

async fn dispatch(state: &mut ConferenceState, command: Command) {
    match command {
        Command::Join { participant_id, display_name, info, socket_id, reply } => {
            let _ = reply.send(state.handle_join(participant_id, display_name, info, socket_id));
        }
        Command::CreateTransport { participant_id, direction, reply } => {
            let _ = reply.send(state.handle_create_transport(participant_id, direction).await);
        }
        Command::ConnectTransport { participant_id, direction, dtls_parameters, reply } => {
            let _ = reply.send(
                state
                    .handle_connect_transport(participant_id, direction, dtls_parameters)
                    .await,
            );
        }
        Command::Produce { participant_id, kind, rtp_parameters, stream_type, reply } => {
            let _ = reply.send(
                state
                    .handle_produce(participant_id, kind, rtp_parameters, stream_type)
                    .await,
            );
        }
        Command::ConsumeFromParticipant { participant_id, target_participant_id, rtp_capabilities, reply } => {
            let _ = reply.send(
                state
                    .handle_consume(participant_id, target_participant_id, rtp_capabilities)
                    .await,
            );
        }
        Command::ResumeConsumer { participant_id, consumer_id, reply } => {
            let _ = reply.send(state.handle_resume_consumer(participant_id, consumer_id).await);
        }
        Command::CloseProducer { participant_id, producer_id, reply } => {
            let _ = reply.send(state.handle_close_producer(participant_id, producer_id).await);
        }
        Command::CloseConsumer { participant_id, consumer_id, reply } => {
            let _ = reply.send(state.handle_close_consumer(participant_id, consumer_id).await);
        }
        Command::MuteAudio { participant_id, reply } => {
            let _ = reply.send(state.handle_mute(participant_id, StreamType::Audio, true).await);
        }
        Command::UnmuteAudio { participant_id, reply } => {
            let _ = reply.send(state.handle_mute(participant_id, StreamType::Audio, false).await);
        }
        Command::MuteVideo { participant_id, reply } => {
            let _ = reply.send(state.handle_mute(participant_id, StreamType::Video, true).await);
        }
        Command::UnmuteVideo { participant_id, reply } => {
            let _ = reply.send(state.handle_mute(participant_id, StreamType::Video, false).await);
        }
        Command::Leave { participant_id, reply } => {
            let _ = reply.send(state.handle_leave(participant_id).await);
        }
        Command::ParticipantCount { reply } => {
            let _ = reply.send(state.participants.len());
        }
        Command::GetParticipants { reply } => {
            let summaries = state
                .participants
                .values()
                .map(|p| ParticipantSummary {
                    participant_id: p.id.clone(),
                    participant_name: p.display_name.clone(),
                })
                .collect();
            let _ = reply.send(summaries);
        }
    }
}
