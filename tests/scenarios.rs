//! End-to-end scenario tests (spec §8) driven straight against
//! `ConferenceHandle`/`ConferenceRegistry` with a `MockEngine`, the same
//! boundary the gateway itself calls through. Each test subscribes to the
//! conference's broadcast channel before the participants under test act,
//! the way a socket connected for the whole scenario would, so event
//! ordering assertions reflect what a long-lived observer sees.

use sfu_core::config::MediaSettings;
use sfu_core::conference::ConferenceEvent;
use sfu_core::engine::mock::MockEngine;
use sfu_core::engine::{Direction, MediaKind, StreamType};
use sfu_core::error::SfuError;
use sfu_core::registry::ConferenceRegistry;
use sfu_core::worker_pool::WorkerPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::Receiver;

async fn registry(worker_count: u32, max_participants: u32) -> ConferenceRegistry {
    let engine = MockEngine::new();
    registry_with_engine(&engine, worker_count, max_participants).await
}

async fn registry_with_engine(engine: &MockEngine, worker_count: u32, max_participants: u32) -> ConferenceRegistry {
    let settings = MediaSettings {
        worker_count,
        ..MediaSettings::default_for_tests()
    };
    let pool = Arc::new(WorkerPool::new(engine, &settings).await.unwrap());
    ConferenceRegistry::new(pool, max_participants)
}

fn opus_vp8_capabilities() -> serde_json::Value {
    serde_json::json!([{ "mimeType": "audio/opus" }, { "mimeType": "video/vp8" }])
}

fn audio_only_capabilities() -> serde_json::Value {
    serde_json::json!([{ "mimeType": "audio/opus" }])
}

fn audio_rtp_params() -> serde_json::Value {
    serde_json::json!({ "codecs": [{ "mimeType": "audio/opus" }] })
}

fn video_rtp_params() -> serde_json::Value {
    serde_json::json!({ "codecs": [{ "mimeType": "video/vp8" }] })
}

async fn next_event(rx: &mut Receiver<ConferenceEvent>) -> ConferenceEvent {
    tokio::time::timeout(Duration::from_secs(1), rx.recv())
        .await
        .expect("event should arrive within timeout")
        .expect("broadcast channel should not close")
}

/// Joins `participant_id`, creates+connects both transports, ready to
/// produce/consume.
async fn join_and_wire(
    handle: &sfu_core::conference::ConferenceHandle,
    participant_id: &str,
    display_name: &str,
) {
    handle
        .join(
            participant_id.to_string(),
            display_name.to_string(),
            serde_json::json!({}),
            format!("socket-{participant_id}"),
        )
        .await
        .unwrap();

    for direction in [Direction::Producer, Direction::Consumer] {
        handle
            .create_transport(participant_id.to_string(), direction)
            .await
            .unwrap();
        handle
            .connect_transport(
                participant_id.to_string(),
                direction,
                serde_json::json!({ "fingerprint": format!("{participant_id}-{direction:?}") }),
            )
            .await
            .unwrap();
    }
}

#[tokio::test]
async fn scenario_1_two_party_audio_and_video() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    let mut events = handle.subscribe();

    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "bob", "Bob").await;

    let alice_audio = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    let alice_video = handle
        .produce("alice".to_string(), MediaKind::Video, video_rtp_params(), StreamType::Video)
        .await
        .unwrap();
    let bob_audio = handle
        .produce("bob".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    let bob_video = handle
        .produce("bob".to_string(), MediaKind::Video, video_rtp_params(), StreamType::Video)
        .await
        .unwrap();

    let producer_ids = [alice_audio, alice_video, bob_audio, bob_video];
    assert_eq!(producer_ids.iter().collect::<std::collections::HashSet<_>>().len(), 4);

    let alice_consumers = handle
        .consume_from_participant("alice".to_string(), "bob".to_string(), opus_vp8_capabilities())
        .await
        .unwrap();
    let bob_consumers = handle
        .consume_from_participant("bob".to_string(), "alice".to_string(), opus_vp8_capabilities())
        .await
        .unwrap();

    assert_eq!(alice_consumers.len(), 2);
    assert!(alice_consumers.iter().all(|c| c.producer_participant_id == "bob"));
    assert_eq!(bob_consumers.len(), 2);
    assert!(bob_consumers.iter().all(|c| c.producer_participant_id == "alice"));

    // Bob's participantJoined must precede every newProducer event, across
    // the whole observed stream (invariant 1, spec §8).
    let mut saw_any_new_producer = false;
    let mut saw_bob_joined = false;
    loop {
        match next_event(&mut events).await {
            ConferenceEvent::ParticipantJoined { participant_id, .. } if participant_id == "bob" => {
                assert!(!saw_any_new_producer, "bob's join must precede any newProducer");
                saw_bob_joined = true;
            }
            ConferenceEvent::NewProducer { .. } => {
                saw_any_new_producer = true;
                if saw_bob_joined {
                    break;
                }
            }
            _ => {}
        }
    }
}

#[tokio::test]
async fn scenario_2_screenshare_announcement() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();

    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "bob", "Bob").await;

    handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    handle
        .produce("alice".to_string(), MediaKind::Video, video_rtp_params(), StreamType::Video)
        .await
        .unwrap();

    let mut events = handle.subscribe();
    handle
        .produce(
            "alice".to_string(),
            MediaKind::Video,
            video_rtp_params(),
            StreamType::Screenshare,
        )
        .await
        .unwrap();

    let event = next_event(&mut events).await;
    match event {
        ConferenceEvent::NewProducer { kind, stream_type, .. } => {
            assert_eq!(kind, MediaKind::Video);
            assert_eq!(stream_type, StreamType::Screenshare);
        }
        other => panic!("expected NewProducer, got {other:?}"),
    }

    let consumers = handle
        .consume_from_participant("bob".to_string(), "alice".to_string(), opus_vp8_capabilities())
        .await
        .unwrap();
    assert_eq!(consumers.len(), 3);
    assert!(consumers.iter().any(|c| c.stream_type == StreamType::Screenshare));
}

#[tokio::test]
async fn scenario_3_spontaneous_disconnect() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();

    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "bob", "Bob").await;
    join_and_wire(&handle, "carol", "Carol").await;

    let carol_audio = handle
        .produce("carol".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();

    let mut events = handle.subscribe();
    let leave_result = handle.leave("carol".to_string()).await.unwrap();
    assert_eq!(leave_result.closed.closed_producer_ids, vec![carol_audio.clone()]);

    match next_event(&mut events).await {
        ConferenceEvent::ParticipantLeft { participant_id, closed_producer_ids, .. } => {
            assert_eq!(participant_id, "carol");
            assert_eq!(closed_producer_ids, vec![carol_audio]);
        }
        other => panic!("expected ParticipantLeft, got {other:?}"),
    }

    let remaining = handle.get_participants().await;
    assert!(!remaining.iter().any(|p| p.participant_id == "carol"));
    assert_eq!(remaining.len(), 2);

    // Conference still has Alice and Bob: removeIfEmpty is a no-op.
    registry.remove_if_empty("room-1").await;
    assert_eq!(registry.active_conference_count(), 1);
}

#[tokio::test]
async fn scenario_3b_last_participant_leaving_removes_the_conference() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "carol", "Carol").await;

    handle.leave("carol".to_string()).await.unwrap();
    registry.remove_if_empty("room-1").await;
    assert_eq!(registry.active_conference_count(), 0);
}

#[tokio::test]
async fn scenario_4_mute_round_trip() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();

    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "bob", "Bob").await;
    let alice_audio = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();

    let mut events = handle.subscribe();
    let muted = handle.mute_audio("alice".to_string()).await.unwrap();
    assert_eq!(muted, vec![alice_audio.clone()]);

    match next_event(&mut events).await {
        ConferenceEvent::AudioMuted { participant_id, producer_ids } => {
            assert_eq!(participant_id, "alice");
            assert_eq!(producer_ids, vec![alice_audio.clone()]);
        }
        other => panic!("expected AudioMuted, got {other:?}"),
    }

    let unmuted = handle.unmute_audio("alice".to_string()).await.unwrap();
    assert_eq!(unmuted, vec![alice_audio.clone()]);
    match next_event(&mut events).await {
        ConferenceEvent::AudioUnmuted { participant_id, producer_ids } => {
            assert_eq!(participant_id, "alice");
            assert_eq!(producer_ids, vec![alice_audio]);
        }
        other => panic!("expected AudioUnmuted, got {other:?}"),
    }
}

#[tokio::test]
async fn scenario_5_incompatible_codecs_are_skipped_not_errored() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();

    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "dave", "Dave").await;

    handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    handle
        .produce("alice".to_string(), MediaKind::Video, video_rtp_params(), StreamType::Video)
        .await
        .unwrap();

    // Dave's capabilities only include the audio codec.
    let consumers = handle
        .consume_from_participant("dave".to_string(), "alice".to_string(), audio_only_capabilities())
        .await
        .unwrap();

    assert_eq!(consumers.len(), 1);
    assert_eq!(consumers[0].stream_type, StreamType::Audio);
}

#[tokio::test]
async fn scenario_6_engine_failure_mid_produce_does_not_mutate_state() {
    let engine = MockEngine::new();
    let registry = registry_with_engine(&engine, 1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;

    engine.inject_next_produce_failure();
    let result = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await;
    assert!(matches!(result, Err(SfuError::EngineError(_))));

    // No producer was recorded: a retry from a clean state succeeds and
    // yields exactly one producer for Alice.
    let producer_id = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    assert!(!producer_id.is_empty());
}

#[tokio::test]
async fn boundary_consuming_own_producer_is_invalid_target() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;

    let result = handle
        .consume_from_participant("alice".to_string(), "alice".to_string(), opus_vp8_capabilities())
        .await;
    assert!(matches!(result, Err(SfuError::InvalidTarget)));
}

#[tokio::test]
async fn boundary_producing_before_connect_is_invalid_state() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    handle
        .join(
            "alice".to_string(),
            "Alice".to_string(),
            serde_json::json!({}),
            "socket-alice".to_string(),
        )
        .await
        .unwrap();
    handle
        .create_transport("alice".to_string(), Direction::Producer)
        .await
        .unwrap();

    let result = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await;
    assert!(matches!(result, Err(SfuError::TransportNotConnected)));
}

#[tokio::test]
async fn boundary_duplicate_join_is_rejected() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;

    let result = handle
        .join(
            "alice".to_string(),
            "Alice Again".to_string(),
            serde_json::json!({}),
            "socket-alice-2".to_string(),
        )
        .await;
    assert!(matches!(result, Err(SfuError::DuplicateParticipant(_))));
}

#[tokio::test]
async fn boundary_capacity_exceeded_when_max_participants_reached() {
    let registry = registry(1, 1).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;

    let result = handle
        .join(
            "bob".to_string(),
            "Bob".to_string(),
            serde_json::json!({}),
            "socket-bob".to_string(),
        )
        .await;
    assert!(matches!(result, Err(SfuError::CapacityExceeded)));
}

#[tokio::test]
async fn idempotence_leave_twice_only_the_first_succeeds() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;

    handle.leave("alice".to_string()).await.unwrap();
    let second = handle.leave("alice".to_string()).await;
    assert!(matches!(second, Err(SfuError::NotFound(_))));
}

#[tokio::test]
async fn idempotence_close_producer_twice_only_the_first_succeeds_and_broadcasts_once() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;
    let producer_id = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();

    let mut events = handle.subscribe();
    handle
        .close_producer("alice".to_string(), producer_id.clone())
        .await
        .unwrap();
    match next_event(&mut events).await {
        ConferenceEvent::ProducerClosed { producer_id: closed_id, .. } => assert_eq!(closed_id, producer_id),
        other => panic!("expected ProducerClosed, got {other:?}"),
    }

    let second = handle.close_producer("alice".to_string(), producer_id).await;
    assert!(matches!(second, Err(SfuError::NotFound(_))));
    let nothing_more = tokio::time::timeout(Duration::from_millis(100), events.recv()).await;
    assert!(nothing_more.is_err(), "no further broadcast expected after the second close");
}

#[tokio::test]
async fn closing_a_producer_closes_every_bound_consumer_first() {
    let registry = registry(1, 0).await;
    let handle = registry.get_or_create("room-1").await.unwrap();
    join_and_wire(&handle, "alice", "Alice").await;
    join_and_wire(&handle, "bob", "Bob").await;

    let alice_audio = handle
        .produce("alice".to_string(), MediaKind::Audio, audio_rtp_params(), StreamType::Audio)
        .await
        .unwrap();
    let bob_consumers = handle
        .consume_from_participant("bob".to_string(), "alice".to_string(), opus_vp8_capabilities())
        .await
        .unwrap();
    assert_eq!(bob_consumers.len(), 1);

    let mut events = handle.subscribe();
    handle
        .close_producer("alice".to_string(), alice_audio.clone())
        .await
        .unwrap();

    match next_event(&mut events).await {
        ConferenceEvent::ConsumerClosed { .. } => {}
        other => panic!("expected ConsumerClosed before ProducerClosed, got {other:?}"),
    }
    match next_event(&mut events).await {
        ConferenceEvent::ProducerClosed { producer_id, .. } => assert_eq!(producer_id, alice_audio),
        other => panic!("expected ProducerClosed, got {other:?}"),
    }
}
