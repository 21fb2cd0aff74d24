//! # error
//!
//! Centralised application error type.
//!
//! Every handler returns `Result<_, AppError>`. Axum's `IntoResponse` impl
//! converts these into structured JSON error bodies so the transport bridge
//! always gets a machine-readable response even on failure.
//!
//! Per-message failures (parse, correlation, symbol) are *not* errors — they
//! are classified outcomes recorded in the audit trail. `AppError` is for
//! genuinely exceptional paths: an unreachable audit sink, chiefly.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::audit::SinkError;

#[derive(Debug, Error)]
pub enum AppError {
    /// The audit sink is unreachable — idempotency can no longer be
    /// guaranteed, so dispatches abort rather than risk untracked orders.
    #[error("Audit sink failure: {0}")]
    Sink(#[from] SinkError),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::Sink(err) => (StatusCode::SERVICE_UNAVAILABLE, err.to_string()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Internal error: {err}"),
            ),
        };

        let body = Json(json!({
            "ok":    false,
            "error": message,
        }));

        (status, body).into_response()
    }
}
