//! HTTP side-surface: `/health`, `/stats`, `/metrics` (spec §6).
//!
//! Grounded on the teacher's `health_check` handler shape (`crates/api/src/lib.rs`).

use crate::gateway::GatewayState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};

pub async fn health_check() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

pub async fn stats(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let snapshot = state
        .metrics
        .stats(
            state.registry.active_conference_count() as i64,
            state.registry.total_participant_count().await as i64,
            state.storage.connection_count() as i64,
        );
    Json(serde_json::to_value(snapshot).expect("StatsSnapshot always serializes"))
}

pub async fn metrics(State(state): State<GatewayState>) -> Response {
    let rendered = state.metrics.render(
        state.registry.active_conference_count() as i64,
        state.registry.total_participant_count().await as i64,
        state.storage.connection_count() as i64,
    );

    match rendered {
        Ok(text) => (StatusCode::OK, text).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
