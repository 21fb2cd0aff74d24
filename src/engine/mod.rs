//! # engine
//!
//! The signal pipeline, assembled:
//!
//! ```text
//! RawMessage ─▶ extract ─▶ correlate ─▶ resolve ─▶ execute ─▶ ExecutionOutcome
//!                │            │            │          │
//!                └────────────┴────────────┴──────────┴──▶ audit sink
//! ```
//!
//! [`Engine::handle_message`] is the single entry point: one message in,
//! `Some(ExecutionOutcome)` out when a terminal dispatch happened, `None`
//! when the message only produced or consumed pending correlation state.
//!
//! Per-message failures never stop the channel: a bad message is audited and
//! the next one flows. The transport bridge POSTs each channel's messages in
//! order; the correlator's atomic transitions keep state consistent under
//! concurrent channels.

pub mod correlator;
pub mod executor;
pub mod extractor;
pub mod resolver;

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::audit::AuditSink;
use crate::config::EngineConfig;
use crate::error::AppError;
use crate::models::{AuditRecord, ExecutionOutcome, RawMessage, ResolvedOrder, Signal};

use correlator::{Correlation, Correlator, PendingEntry};
use executor::ExecutionGateway;
use resolver::{Resolution, SymbolResolver};

pub struct Engine {
    config: EngineConfig,
    resolver: SymbolResolver,
    correlator: Correlator,
    gateway: ExecutionGateway,
    sink: Arc<dyn AuditSink>,
}

impl Engine {
    pub fn new(
        config: EngineConfig,
        resolver: SymbolResolver,
        gateway: ExecutionGateway,
        sink: Arc<dyn AuditSink>,
    ) -> Self {
        let correlator = Correlator::new(chrono::Duration::minutes(config.correlation_ttl_min));
        Self {
            config,
            resolver,
            correlator,
            gateway,
            sink,
        }
    }

    /// Channels currently holding an unresolved entry (monitor surface).
    pub fn pending_entries(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Process one inbound message end to end.
    pub async fn handle_message(
        &self,
        msg: &RawMessage,
    ) -> Result<Option<ExecutionOutcome>, AppError> {
        // ── 1. Every message goes on the trail, signal or not ─────────────────
        self.sink.append(AuditRecord::message(msg)).await?;

        // ── 2. Extract ────────────────────────────────────────────────────────
        let fragment = extractor::extract(msg, &self.resolver);

        // ── 3. Correlate ──────────────────────────────────────────────────────
        let correlated = self
            .correlator
            .correlate(&fragment, msg.reply_to_id, Utc::now());

        if let Some((old, reason)) = correlated.evicted {
            self.audit_eviction(&old, reason).await?;
        }

        let signal = match correlated.result {
            Correlation::Ready(signal) => signal,
            Correlation::Held => {
                return Ok(None);
            }
            Correlation::Dropped(reason) => {
                self.sink
                    .append(AuditRecord::discard(msg.channel_id, vec![msg.id], reason))
                    .await?;
                return Ok(None);
            }
        };

        self.sink
            .append(AuditRecord::Signal {
                signal: signal.clone(),
            })
            .await?;

        // ── 4. Resolve symbol ─────────────────────────────────────────────────
        let symbol = match self.resolver.resolve(&signal.symbol_token) {
            Resolution::Canonical(symbol) => symbol,
            Resolution::Unresolved => {
                warn!(
                    token = %signal.symbol_token,
                    signal_id = %signal.id,
                    "Symbol token unresolved — signal halted"
                );
                self.sink
                    .append(AuditRecord::UnresolvedSymbol {
                        signal_id: signal.id,
                        symbol_token: signal.symbol_token.clone(),
                        noted_at: Utc::now(),
                    })
                    .await?;
                return Ok(None);
            }
        };

        // ── 5. Dispatch ───────────────────────────────────────────────────────
        let order = self.build_order(signal, symbol);
        info!(
            signal_id = %order.signal.id,
            symbol = %order.symbol,
            action = order.signal.action.as_wire(),
            sl = ?order.signal.stop_loss,
            tp = ?order.signal.take_profit,
            "🎯 Signal resolved — dispatching"
        );

        let outcome = self.gateway.execute(&order).await?;
        Ok(Some(outcome))
    }

    fn build_order(&self, signal: Signal, symbol: String) -> ResolvedOrder {
        let idempotency_key = signal.idempotency_key();
        ResolvedOrder {
            signal,
            symbol,
            volume: self.config.lot_size,
            slippage: self.config.max_slippage,
            magic: self.config.magic_number,
            idempotency_key,
        }
    }

    async fn audit_eviction(
        &self,
        old: &PendingEntry,
        reason: crate::models::DiscardReason,
    ) -> Result<(), AppError> {
        self.sink
            .append(AuditRecord::discard(
                old.fragment.channel_id,
                vec![old.fragment.source_message_id],
                reason,
            ))
            .await?;
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
