//! Conference coordination and signaling core for a WebRTC SFU.
//!
//! See `DESIGN.md` for the grounding ledger and `SPEC_FULL.md` for the
//! requirements this crate implements. The module layout mirrors the
//! component table: `worker_pool` (C1), `participant` (C2), `conference`
//! (C3), `registry` (C4), `gateway` (C5), `metrics` (C6), `config` (C7).

pub mod conference;
pub mod config;
pub mod engine;
pub mod error;
pub mod gateway;
pub mod http;
pub mod metrics;
pub mod participant;
pub mod registry;
pub mod worker_pool;

use axum::routing::get;
use axum::Router;
use gateway::GatewayState;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Assembles the full HTTP/WebSocket surface (spec §6), grounded on the
/// teacher's `build_router` (`crates/api/src/lib.rs`): same CORS/trace
/// layering, same `/health` + upgrade-route shape, narrowed to this crate's
/// surface (`/stats`, `/metrics`, `/ws`) instead of the teacher's REST API.
pub fn build_router(state: GatewayState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(http::health_check))
        .route("/stats", get(http::stats))
        .route("/metrics", get(http::metrics))
        .route("/ws", get(gateway::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
