//! # routes::ingest
//!
//! **Ingest Loop** — entry point for the transport bridge.
//!
//! | Method | Path                    | Description                          |
//! |--------|-------------------------|--------------------------------------|
//! | POST   | `/api/telegram/message` | One chat message, in channel order   |
//! | GET    | `/health`               | Liveness probe (no auth)             |
//!
//! The bridge POSTs each channel's messages sequentially; the response tells
//! it what the message became. A message that merely parked correlation state
//! (or was discarded) answers `ok: true` with no outcome — per-message
//! failures never poison the channel.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{debug, info};

use crate::error::AppError;
use crate::models::RawMessage;
use crate::state::SharedState;

/// POST /api/telegram/message — run one message through the pipeline.
pub async fn handle_message(
    State(state): State<SharedState>,
    Json(msg): Json<RawMessage>,
) -> Result<impl IntoResponse, AppError> {
    state.message_count.fetch_add(1, Ordering::Relaxed);
    debug!(
        message_id = msg.id,
        channel_id = msg.channel_id,
        reply_to = ?msg.reply_to_id,
        "📨 Message received"
    );

    let outcome = state.engine.handle_message(&msg).await?;

    match outcome {
        Some(outcome) => {
            state.dispatch_count.fetch_add(1, Ordering::Relaxed);
            info!(
                message_id = msg.id,
                status = ?outcome.status,
                attempts = outcome.attempts,
                "Message produced a terminal dispatch"
            );
            Ok(Json(json!({
                "ok":          true,
                "disposition": "DISPATCHED",
                "outcome":     outcome,
            })))
        }
        None => Ok(Json(json!({
            "ok":          true,
            "disposition": "NO_DISPATCH",
        }))),
    }
}

/// GET /health — liveness probe for the bridge and deploy tooling.
pub async fn health_check() -> impl IntoResponse {
    Json(json!({ "ok": true, "service": "slipstream" }))
}
