//! The error taxonomy shared by every layer of the conference core.
//!
//! Mirrors the teacher's `ApiError`/`DaoError` split: one flat enum with a
//! `thiserror` message per variant, plus `IntoResponse` for the handful of
//! plain HTTP endpoints. WebSocket errors serialize straight into the
//! `{status:"error", error:{...}}` envelope instead (see `gateway::protocol`).

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

/// The taxonomy from spec §7. Every public operation in this crate returns
/// `Result<_, SfuError>`.
#[derive(Debug, Clone, Error)]
pub enum SfuError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authorization error: {0}")]
    AuthorizationError(String),

    #[error("invalid state: {0}")]
    InvalidState(String),

    #[error("incompatible codecs")]
    IncompatibleCodecs,

    #[error("capacity exceeded")]
    CapacityExceeded,

    #[error("engine error: {0}")]
    EngineError(#[from] EngineError),

    #[error("media engine unavailable for this conference")]
    EngineUnavailable,

    #[error("operation timed out")]
    OperationTimeout,

    #[error("protocol error: {0}")]
    ProtocolError(String),

    #[error("duplicate participant: {0}")]
    DuplicateParticipant(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("consuming own producer is not allowed")]
    InvalidTarget,

    #[error("already consuming this producer")]
    AlreadyConsuming,

    #[error("consumer transport not ready")]
    TransportNotReady,

    #[error("transport is not connected")]
    TransportNotConnected,
}

/// Opaque wrapper around whatever the concrete `MediaEngine` reports.
///
/// Kept `Clone` (via `Arc`) so a `SfuError` can be cloned into a reply that
/// is also logged, the way the teacher logs and responds from the same
/// `anyhow::Error` value.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub Arc<anyhow::Error>);

impl EngineError {
    pub fn new(err: anyhow::Error) -> Self {
        Self(Arc::new(err))
    }

    pub fn msg(message: impl Into<String>) -> Self {
        Self(Arc::new(anyhow::anyhow!(message.into())))
    }
}

impl From<anyhow::Error> for SfuError {
    fn from(err: anyhow::Error) -> Self {
        SfuError::EngineError(EngineError::new(err))
    }
}

impl SfuError {
    /// The taxonomy name, stable across releases, used as the `kind` field
    /// in the WS error envelope and logged alongside the human message.
    pub fn kind(&self) -> &'static str {
        match self {
            SfuError::NotFound(_) => "NotFound",
            SfuError::AuthorizationError(_) => "AuthorizationError",
            SfuError::InvalidState(_) => "InvalidState",
            SfuError::IncompatibleCodecs => "IncompatibleCodecs",
            SfuError::CapacityExceeded => "CapacityExceeded",
            SfuError::EngineError(_) => "EngineError",
            SfuError::EngineUnavailable => "EngineUnavailable",
            SfuError::OperationTimeout => "OperationTimeout",
            SfuError::ProtocolError(_) => "ProtocolError",
            SfuError::DuplicateParticipant(_) => "DuplicateParticipant",
            SfuError::AlreadyExists(_) => "AlreadyExists",
            SfuError::InvalidTarget => "InvalidTarget",
            SfuError::AlreadyConsuming => "AlreadyConsuming",
            SfuError::TransportNotReady => "TransportNotReady",
            SfuError::TransportNotConnected => "TransportNotConnected",
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    message: String,
}

impl IntoResponse for SfuError {
    fn into_response(self) -> Response {
        let status = match &self {
            SfuError::NotFound(_) => StatusCode::NOT_FOUND,
            SfuError::AuthorizationError(_) => StatusCode::FORBIDDEN,
            SfuError::InvalidState(_)
            | SfuError::ProtocolError(_)
            | SfuError::DuplicateParticipant(_)
            | SfuError::AlreadyExists(_)
            | SfuError::InvalidTarget
            | SfuError::AlreadyConsuming
            | SfuError::TransportNotReady
            | SfuError::TransportNotConnected => StatusCode::BAD_REQUEST,
            SfuError::IncompatibleCodecs => StatusCode::UNPROCESSABLE_ENTITY,
            SfuError::CapacityExceeded => StatusCode::TOO_MANY_REQUESTS,
            SfuError::EngineError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            SfuError::EngineUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            SfuError::OperationTimeout => StatusCode::GATEWAY_TIMEOUT,
        };

        let body = ErrorBody {
            error: self.kind().to_string(),
            message: self.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

pub type SfuResult<T> = Result<T, SfuError>;
