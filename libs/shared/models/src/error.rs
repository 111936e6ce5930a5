use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Failure taxonomy shared by every operation in the engine.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("queue full for {specialty} (limit {limit})")]
    QueueFull { specialty: String, limit: u32 },

    #[error("expired: {0}")]
    Expired(String),

    #[error("transient store failure: {0}")]
    Transient(String),

    #[error("unauthenticated: {0}")]
    Unauthenticated(String),
}

impl CoreError {
    /// Stable machine-readable tag, used by channel error events.
    pub fn kind(&self) -> &'static str {
        match self {
            CoreError::NotFound(_) => "not_found",
            CoreError::Forbidden(_) => "forbidden",
            CoreError::InvalidTransition { .. } => "invalid_transition",
            CoreError::Conflict(_) => "conflict",
            CoreError::QueueFull { .. } => "queue_full",
            CoreError::Expired(_) => "expired",
            CoreError::Transient(_) => "transient",
            CoreError::Unauthenticated(_) => "unauthenticated",
        }
    }

    /// Only an authentication failure severs the channel it arrived on.
    pub fn closes_channel(&self) -> bool {
        matches!(self, CoreError::Unauthenticated(_))
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        let status = match &self {
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::Forbidden(_) => StatusCode::FORBIDDEN,
            CoreError::InvalidTransition { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Conflict(_) => StatusCode::CONFLICT,
            CoreError::QueueFull { .. } => StatusCode::TOO_MANY_REQUESTS,
            CoreError::Expired(_) => StatusCode::GONE,
            CoreError::Transient(_) => StatusCode::SERVICE_UNAVAILABLE,
            CoreError::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
        };

        tracing::error!("Error: {}: {}", status, self);

        let body = Json(json!({
            "error": self.to_string(),
            "kind": self.kind(),
        }));

        (status, body).into_response()
    }
}
