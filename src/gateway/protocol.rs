//! Wire protocol (part of C5 SignalingGateway).
//!
//! Grounded on the teacher's `ClientSignal`/`ServerSignal` tagged enums in
//! `media/signaling.rs` (`#[serde(tag = "type", content = "data")]`, one
//! struct-like variant per event), generalized to the request/response table
//! in spec §6: every inbound frame additionally carries a correlation id so
//! the gateway can reply `{id, status, data|error}` instead of the teacher's
//! fire-and-forget `media:*` events.

use crate::engine::{Direction, MediaKind, StreamType};
use crate::error::SfuError;
use serde::{Deserialize, Serialize};

/// One inbound WebSocket frame: a correlation id plus the tagged request.
#[derive(Debug, Clone, Deserialize)]
pub struct InboundMessage {
    pub id: String,
    #[serde(flatten)]
    pub request: ClientRequest,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ClientRequest {
    #[serde(rename = "joinConference")]
    JoinConference {
        conference_id: String,
        #[serde(default)]
        conference_name: Option<String>,
        participant_id: String,
        participant_name: String,
        #[serde(default)]
        participant_info: Option<serde_json::Value>,
    },
    #[serde(rename = "createTransport")]
    CreateTransport {
        conference_id: String,
        participant_id: String,
        direction: Direction,
    },
    #[serde(rename = "connectTransport")]
    ConnectTransport {
        conference_id: String,
        participant_id: String,
        direction: Direction,
        dtls_parameters: serde_json::Value,
    },
    #[serde(rename = "produce")]
    Produce {
        conference_id: String,
        participant_id: String,
        #[serde(default)]
        transport_id: Option<String>,
        kind: MediaKind,
        rtp_parameters: serde_json::Value,
        #[serde(default)]
        stream_type: Option<StreamType>,
    },
    #[serde(rename = "consumeParticipantMedia")]
    ConsumeParticipantMedia {
        conference_id: String,
        participant_id: String,
        target_participant_id: String,
        rtp_capabilities: serde_json::Value,
    },
    #[serde(rename = "unpauseConsumer")]
    UnpauseConsumer {
        conference_id: String,
        participant_id: String,
        consumer_id: String,
    },
    #[serde(rename = "closeProducer")]
    CloseProducer {
        conference_id: String,
        participant_id: String,
        extra_data: ProducerExtraData,
    },
    #[serde(rename = "closeConsumer")]
    CloseConsumer {
        conference_id: String,
        participant_id: String,
        extra_data: ConsumerExtraData,
    },
    #[serde(rename = "muteAudio")]
    MuteAudio {
        conference_id: String,
        participant_id: String,
    },
    #[serde(rename = "unmuteAudio")]
    UnmuteAudio {
        conference_id: String,
        participant_id: String,
    },
    #[serde(rename = "muteVideo")]
    MuteVideo {
        conference_id: String,
        participant_id: String,
    },
    #[serde(rename = "unmuteVideo")]
    UnmuteVideo {
        conference_id: String,
        participant_id: String,
    },
    #[serde(rename = "getParticipants")]
    GetParticipants { conference_id: String },
    #[serde(rename = "leaveConference")]
    LeaveConference {
        conference_id: String,
        participant_id: String,
    },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProducerExtraData {
    pub producer_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsumerExtraData {
    pub consumer_id: String,
}

impl ClientRequest {
    pub fn conference_id(&self) -> &str {
        match self {
            ClientRequest::JoinConference { conference_id, .. }
            | ClientRequest::CreateTransport { conference_id, .. }
            | ClientRequest::ConnectTransport { conference_id, .. }
            | ClientRequest::Produce { conference_id, .. }
            | ClientRequest::ConsumeParticipantMedia { conference_id, .. }
            | ClientRequest::UnpauseConsumer { conference_id, .. }
            | ClientRequest::CloseProducer { conference_id, .. }
            | ClientRequest::CloseConsumer { conference_id, .. }
            | ClientRequest::MuteAudio { conference_id, .. }
            | ClientRequest::UnmuteAudio { conference_id, .. }
            | ClientRequest::MuteVideo { conference_id, .. }
            | ClientRequest::UnmuteVideo { conference_id, .. }
            | ClientRequest::GetParticipants { conference_id }
            | ClientRequest::LeaveConference { conference_id, .. } => conference_id,
        }
    }

    /// `None` only for `joinConference` (populates the binding) and
    /// `getParticipants` (spec §6 table: payload is `{conferenceId}` only).
    pub fn participant_id(&self) -> Option<&str> {
        match self {
            ClientRequest::JoinConference { .. } | ClientRequest::GetParticipants { .. } => None,
            ClientRequest::CreateTransport { participant_id, .. }
            | ClientRequest::ConnectTransport { participant_id, .. }
            | ClientRequest::Produce { participant_id, .. }
            | ClientRequest::ConsumeParticipantMedia { participant_id, .. }
            | ClientRequest::UnpauseConsumer { participant_id, .. }
            | ClientRequest::CloseProducer { participant_id, .. }
            | ClientRequest::CloseConsumer { participant_id, .. }
            | ClientRequest::MuteAudio { participant_id, .. }
            | ClientRequest::UnmuteAudio { participant_id, .. }
            | ClientRequest::MuteVideo { participant_id, .. }
            | ClientRequest::UnmuteVideo { participant_id, .. }
            | ClientRequest::LeaveConference { participant_id, .. } => Some(participant_id),
        }
    }

    /// `joinConference` is the only request allowed before a binding exists
    /// (spec §4.5).
    pub fn is_join(&self) -> bool {
        matches!(self, ClientRequest::JoinConference { .. })
    }
}

/// Notifications the gateway fans out from `ConferenceEvent`s (spec §6).
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "camelCase")]
pub enum ServerNotification {
    #[serde(rename = "participantJoined")]
    ParticipantJoined {
        conference_id: String,
        participant_id: String,
        participant_name: String,
    },
    #[serde(rename = "participantLeft")]
    ParticipantLeft {
        participant_id: String,
        closed_producer_ids: Vec<String>,
        closed_consumer_ids: Vec<String>,
    },
    #[serde(rename = "newProducer")]
    NewProducer {
        producer_id: String,
        participant_id: String,
        participant_name: String,
        kind: MediaKind,
        stream_type: StreamType,
    },
    #[serde(rename = "producerClosed")]
    ProducerClosed {
        producer_id: String,
        participant_id: String,
        kind: MediaKind,
    },
    #[serde(rename = "consumerClosed")]
    ConsumerClosed {
        consumer_id: String,
        participant_id: String,
    },
    #[serde(rename = "audioMuted")]
    AudioMuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    #[serde(rename = "audioUnmuted")]
    AudioUnmuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    #[serde(rename = "videoMuted")]
    VideoMuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    #[serde(rename = "videoUnmuted")]
    VideoUnmuted {
        participant_id: String,
        producer_ids: Vec<String>,
    },
    /// Spec §7: sent to every socket bound to a conference whose worker was
    /// quarantined, immediately before the gateway force-disconnects it.
    #[serde(rename = "conferenceTerminated")]
    ConferenceTerminated { conference_id: String },
}

/// The `{status, data|error}` envelope for request replies (spec §4.5/§6).
#[derive(Debug, Clone, Serialize)]
pub struct OutboundResponse {
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorPayload>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ErrorPayload {
    pub kind: &'static str,
    pub message: String,
}

impl OutboundResponse {
    pub fn ok(id: String, data: serde_json::Value) -> Self {
        Self {
            id,
            status: "ok",
            data: Some(data),
            error: None,
        }
    }

    pub fn err(id: String, error: &SfuError) -> Self {
        Self {
            id,
            status: "error",
            data: None,
            error: Some(ErrorPayload {
                kind: error.kind(),
                message: error.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn join_conference_deserializes_with_correlation_id() {
        let raw = serde_json::json!({
            "id": "corr-1",
            "event": "joinConference",
            "data": {
                "conferenceId": "room-1",
                "participantId": "alice",
                "participantName": "Alice"
            }
        });
        let msg: InboundMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.id, "corr-1");
        assert!(msg.request.is_join());
        assert_eq!(msg.request.conference_id(), "room-1");
    }

    #[test]
    fn close_producer_nests_extra_data() {
        let raw = serde_json::json!({
            "id": "corr-2",
            "event": "closeProducer",
            "data": {
                "conferenceId": "room-1",
                "participantId": "alice",
                "extraData": { "producerId": "p1" }
            }
        });
        let msg: InboundMessage = serde_json::from_value(raw).unwrap();
        match msg.request {
            ClientRequest::CloseProducer { extra_data, .. } => {
                assert_eq!(extra_data.producer_id, "p1");
            }
            other => panic!("unexpected variant: {other:?}"),
        }
    }

    #[test]
    fn get_participants_has_no_participant_binding() {
        let raw = serde_json::json!({
            "id": "corr-3",
            "event": "getParticipants",
            "data": { "conferenceId": "room-1" }
        });
        let msg: InboundMessage = serde_json::from_value(raw).unwrap();
        assert_eq!(msg.request.participant_id(), None);
    }
}
