//! # routes::monitor
//!
//! | Method | Path                 | Description                                |
//! |--------|----------------------|--------------------------------------------|
//! | GET    | `/api/monitor/stats` | uptime, ingest counters, audit trail stats |

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;

use crate::error::AppError;
use crate::state::SharedState;

/// GET /api/monitor/stats — engine health at a glance.
pub async fn get_stats(
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    let audit = state.sink.stats().await?;
    let uptime_secs = (chrono::Utc::now() - state.started_at).num_seconds();

    Ok(Json(json!({
        "ok":              true,
        "uptime_secs":     uptime_secs,
        "trading_enabled": state.trading_enabled.load(Ordering::Relaxed),
        "messages_in":     state.message_count.load(Ordering::Relaxed),
        "dispatches":      state.dispatch_count.load(Ordering::Relaxed),
        "pending_entries": state.engine.pending_entries(),
        "audit":           audit,
    })))
}
