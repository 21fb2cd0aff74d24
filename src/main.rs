//! # Slipstream — Signal Correlation & Execution Engine
//!
//! ```text
//!  ┌─────────────┐  POST /api/telegram/message  ┌───────────────────────────┐
//!  │  Transport  │ ───────────────────────────▶ │ Engine                    │
//!  │  Bridge     │                              │ ├─ extractor   📨 → 🧩    │
//!  └─────────────┘                              │ ├─ correlator  🔗         │
//!                                               │ ├─ resolver    🔍         │
//!  ┌─────────────┐  ← POST /order/send          │ ├─ executor    🎯         │
//!  │  MT5 EA     │ ◀─────────────────────────── │ └─ audit sink  📜         │
//!  └─────────────┘                              └───────────────────────────┘
//!
//!  ┌─────────────┐  POST /api/trading/enable|disable
//!  │  Operator   │  GET  /api/trading/status
//!  └─────────────┘  GET  /api/monitor/stats
//! ```

use std::net::SocketAddr;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod audit;
mod auth;
mod broker;
mod config;
#[cfg(feature = "postgres")]
mod db;
mod engine;
mod error;
mod models;
mod routes;
mod state;

use audit::AuditSink;
use auth::require_api_key;
use broker::Mt5HttpGateway;
use config::EngineConfig;
use routes::{
    control::{disable_trading, enable_trading, trading_status},
    ingest::{handle_message, health_check},
    monitor::get_stats,
};
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("slipstream=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║        SLIPSTREAM — Signal Execution Engine           ║
  ║  Extract · Correlate · Resolve · Dispatch · Audit     ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Config, broker, audit sink ─────────────────────────────────────────
    let config = EngineConfig::from_env();
    info!(
        mt5 = %config.mt5_base_url,
        trading_enabled = config.trading_enabled,
        ttl_min = config.correlation_ttl_min,
        "Engine configuration loaded"
    );

    let broker = Arc::new(Mt5HttpGateway::new(
        reqwest::Client::new(),
        config.mt5_base_url.clone(),
    ));
    let sink = build_sink().await?;

    // ── 4. Shared state ───────────────────────────────────────────────────────
    let state = build_state(config, broker, sink);
    let shutdown = state.shutdown.clone();

    // ── 5. CORS ───────────────────────────────────────────────────────────────
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // ── 6. Router ─────────────────────────────────────────────────────────────
    let app = Router::new()
        // ── Ingest Loop ───────────────────────────────────────────────────────
        .route("/api/telegram/message", post(handle_message))
        .route("/health",               get(health_check))
        // ── Trading Control ───────────────────────────────────────────────────
        .route("/api/trading/enable",   post(enable_trading))
        .route("/api/trading/disable",  post(disable_trading))
        .route("/api/trading/status",   get(trading_status))
        // ── Monitor ───────────────────────────────────────────────────────────
        .route("/api/monitor/stats",    get(get_stats))
        // ── Middleware ────────────────────────────────────────────────────────
        .layer(axum::middleware::from_fn(require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    // ── 7. Bind & Serve ───────────────────────────────────────────────────────
    let addr: SocketAddr = std::env::var("BIND_ADDR")
        .unwrap_or_else(|_| "0.0.0.0:3000".to_string())
        .parse()?;

    info!(?addr, "🚀 Slipstream server starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            // In-flight retry loops see this and stop after their current
            // attempt; outcomes are still recorded before exit.
            shutdown.store(true, Ordering::Relaxed);
            info!("🛑 Shutdown signal received — draining");
        })
        .await?;

    Ok(())
}

/// Pick the audit sink: PostgreSQL when built with the `postgres` feature and
/// `DATABASE_URL` is set, in-memory otherwise.
#[cfg(feature = "postgres")]
async fn build_sink() -> anyhow::Result<Arc<dyn AuditSink>> {
    match std::env::var("DATABASE_URL") {
        Ok(url) if !url.is_empty() => {
            let sink = db::PgAuditSink::connect(&url).await?;
            info!("📜 Audit sink: PostgreSQL");
            Ok(Arc::new(sink))
        }
        _ => {
            info!("📜 Audit sink: in-memory (DATABASE_URL not set)");
            Ok(Arc::new(audit::MemoryAuditSink::new()))
        }
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_sink() -> anyhow::Result<Arc<dyn AuditSink>> {
    info!("📜 Audit sink: in-memory");
    Ok(Arc::new(audit::MemoryAuditSink::new()))
}
