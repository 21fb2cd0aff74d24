//! # state
//!
//! Shared application state injected into every Axum handler: the assembled
//! [`Engine`], the runtime toggles and the ingest counters the monitor
//! endpoint reports.

use std::sync::atomic::{AtomicBool, AtomicU64};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::audit::AuditSink;
use crate::broker::BrokerGateway;
use crate::config::EngineConfig;
use crate::engine::executor::ExecutionGateway;
use crate::engine::resolver::SymbolResolver;
use crate::engine::Engine;

// ─── AppState ─────────────────────────────────────────────────────────────────

/// Top-level shared state. Cheap to clone — everything is behind an Arc.
#[derive(Clone)]
pub struct AppState {
    /// The full message → dispatch pipeline.
    pub engine: Arc<Engine>,

    /// Audit sink, shared with the engine — the monitor endpoint reads its
    /// counters directly.
    pub sink: Arc<dyn AuditSink>,

    // ── Runtime toggles ───────────────────────────────────────────────────────
    /// Live-trading switch. Off = dry-run: orders recorded, never dispatched.
    pub trading_enabled: Arc<AtomicBool>,
    /// Set on SIGINT; retry loops abort after their current attempt.
    pub shutdown: Arc<AtomicBool>,

    // ── Metrics ───────────────────────────────────────────────────────────────
    pub message_count: Arc<AtomicU64>,
    pub dispatch_count: Arc<AtomicU64>,
    pub started_at: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: EngineConfig,
        broker: Arc<dyn BrokerGateway>,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let trading_enabled = Arc::new(AtomicBool::new(config.trading_enabled));
        let shutdown = Arc::new(AtomicBool::new(false));

        let gateway = ExecutionGateway::new(
            broker,
            sink.clone(),
            trading_enabled.clone(),
            shutdown.clone(),
            config.max_attempts,
            std::time::Duration::from_millis(config.backoff_base_ms),
        );

        let engine = Engine::new(
            config,
            SymbolResolver::with_default_table(),
            gateway,
            sink.clone(),
        );

        Self {
            engine: Arc::new(engine),
            sink,
            trading_enabled,
            shutdown,
            message_count: Arc::new(AtomicU64::new(0)),
            dispatch_count: Arc::new(AtomicU64::new(0)),
            started_at: Utc::now(),
        }
    }
}

/// Convenience type alias
pub type SharedState = Arc<AppState>;

pub fn build_state(
    config: EngineConfig,
    broker: Arc<dyn BrokerGateway>,
    sink: Arc<dyn AuditSink>,
) -> SharedState {
    Arc::new(AppState::new(config, broker, sink))
}
