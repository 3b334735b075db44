//! Outbound send helpers (part of C5 SignalingGateway).
//!
//! Grounded on the teacher's `broadcast`/`send_to_user` (`ws/dispatcher.rs`),
//! narrowed to single-socket sends since `GatewayStorage` is keyed one entry
//! per socket rather than per user with multiple tabs.

use super::storage::GatewayStorage;
use axum::extract::ws::Message;
use futures::SinkExt;
use tracing::warn;

pub async fn send_to_socket(storage: &GatewayStorage, socket_id: &str, message: &serde_json::Value) {
    let Some(sender) = storage.sender(socket_id) else {
        return;
    };
    let text = serde_json::to_string(message).unwrap_or_default();
    let mut guard = sender.lock().await;
    if let Err(e) = guard.send(Message::text(text)).await {
        warn!(socket_id, %e, "failed to send WS message");
    }
}

pub async fn broadcast_to_sockets(storage: &GatewayStorage, socket_ids: &[String], message: &serde_json::Value) {
    for socket_id in socket_ids {
        send_to_socket(storage, socket_id, message).await;
    }
}
