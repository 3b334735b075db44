//! SignalingGateway (C5): the WebSocket-facing edge of the conference core.
//!
//! Grounded on the teacher's `crates/api/src/ws/` module (`handler.rs`,
//! `storage.rs`, `dispatcher.rs`), reworked per spec §4.5/§6: correlation-id
//! framed request/response instead of fire-and-forget events, and one
//! forwarding task per (socket, conference) instead of manual broadcast
//! calls from each handler.

pub mod dispatcher;
pub mod handler;
pub mod protocol;
pub mod storage;

pub use handler::{ws_upgrade, GatewayState};
