//! Per-socket connection registry (part of C5 SignalingGateway).
//!
//! Grounded on the teacher's `WsStorage`/`WsSender` (`ws/storage.rs`):
//! same `Arc<Mutex<SplitSink<...>>>` sender so outbound writes on one socket
//! never interleave mid-frame (spec §5), same `DashMap` for lock-free
//! lookups. Keyed by `socketId` rather than user id, and carrying the
//! `{conferenceId?, participantId?}` binding spec §4.5 assigns to every
//! socket plus the handle of its notification-forwarding task so both can be
//! torn down together on disconnect.

use axum::extract::ws::{Message, WebSocket};
use dashmap::DashMap;
use futures::stream::SplitSink;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

pub type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

/// The conference/participant a socket is bound to, set once by a
/// successful `joinConference` (spec §4.5).
#[derive(Debug, Clone)]
pub struct SocketBinding {
    pub conference_id: String,
    pub participant_id: String,
}

struct SocketEntry {
    sender: WsSender,
    binding: Mutex<Option<SocketBinding>>,
    forward_task: Mutex<Option<JoinHandle<()>>>,
}

/// Tracks every live WebSocket connection by `socketId`.
pub struct GatewayStorage {
    sockets: DashMap<String, Arc<SocketEntry>>,
}

impl GatewayStorage {
    pub fn new() -> Self {
        Self {
            sockets: DashMap::new(),
        }
    }

    pub fn register(&self, socket_id: String, sender: WsSender) {
        self.sockets.insert(
            socket_id,
            Arc::new(SocketEntry {
                sender,
                binding: Mutex::new(None),
                forward_task: Mutex::new(None),
            }),
        );
    }

    pub fn sender(&self, socket_id: &str) -> Option<WsSender> {
        self.sockets.get(socket_id).map(|e| e.sender.clone())
    }

    /// Spec §4.5: populated once by the first successful `joinConference`.
    pub async fn bind(&self, socket_id: &str, conference_id: String, participant_id: String) {
        if let Some(entry) = self.sockets.get(socket_id) {
            *entry.binding.lock().await = Some(SocketBinding {
                conference_id,
                participant_id,
            });
        }
    }

    pub async fn binding(&self, socket_id: &str) -> Option<SocketBinding> {
        let entry = self.sockets.get(socket_id)?;
        entry.binding.lock().await.clone()
    }

    /// Stores the handle of the per-(socket, conference) forwarding task so
    /// it can be aborted when the socket leaves or disconnects.
    pub async fn set_forward_task(&self, socket_id: &str, task: JoinHandle<()>) {
        if let Some(entry) = self.sockets.get(socket_id) {
            let mut slot = entry.forward_task.lock().await;
            if let Some(previous) = slot.replace(task) {
                previous.abort();
            }
        }
    }

    /// Clears the binding and aborts the forwarding task without dropping
    /// the socket itself, used by an explicit `leaveConference` (the socket
    /// may rejoin another conference afterward).
    pub async fn unbind(&self, socket_id: &str) {
        if let Some(entry) = self.sockets.get(socket_id) {
            *entry.binding.lock().await = None;
            if let Some(task) = entry.forward_task.lock().await.take() {
                task.abort();
            }
        }
    }

    /// Removes the socket, aborting its forwarding task if one is running,
    /// and returns its last known binding for synthetic-leave cleanup.
    pub async fn remove(&self, socket_id: &str) -> Option<SocketBinding> {
        let (_, entry) = self.sockets.remove(socket_id)?;
        if let Some(task) = entry.forward_task.lock().await.take() {
            task.abort();
        }
        entry.binding.lock().await.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.sockets.len()
    }
}

impl Default for GatewayStorage {
    fn default() -> Self {
        Self::new()
    }
}
