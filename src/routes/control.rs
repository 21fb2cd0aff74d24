//! # routes::control
//!
//! Live-trading switch — the operator's hand on the engine.
//!
//! | Method | Path                   | Description                  |
//! |--------|------------------------|------------------------------|
//! | POST   | `/api/trading/enable`  | Arm live dispatch            |
//! | POST   | `/api/trading/disable` | Back to dry-run              |
//! | GET    | `/api/trading/status`  | Current switch position      |
//!
//! The flag is read per dispatch, so flipping it never interrupts an
//! in-flight retry loop — only the next signal sees the change.

use axum::{extract::State, response::IntoResponse, Json};
use serde_json::json;
use std::sync::atomic::Ordering;
use tracing::{info, warn};

use crate::state::SharedState;

/// POST /api/trading/enable — arm live dispatch.
pub async fn enable_trading(State(state): State<SharedState>) -> impl IntoResponse {
    state.trading_enabled.store(true, Ordering::Relaxed);
    warn!("🟢 LIVE TRADING ENABLED — orders will reach the broker");

    Json(json!({
        "ok":      true,
        "message": "Live trading enabled",
    }))
}

/// POST /api/trading/disable — back to dry-run.
pub async fn disable_trading(State(state): State<SharedState>) -> impl IntoResponse {
    state.trading_enabled.store(false, Ordering::Relaxed);
    info!("🎭 Dry-run mode — orders recorded, not dispatched");

    Json(json!({
        "ok":      true,
        "message": "Dry-run mode — orders recorded, not dispatched",
    }))
}

/// GET /api/trading/status — current switch position.
pub async fn trading_status(State(state): State<SharedState>) -> impl IntoResponse {
    let live = state.trading_enabled.load(Ordering::Relaxed);
    Json(json!({
        "ok":              true,
        "trading_enabled": live,
        "mode":            if live { "LIVE" } else { "DRY_RUN" },
    }))
}
