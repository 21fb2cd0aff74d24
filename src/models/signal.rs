//! # models::signal
//!
//! Defines [`Signal`] (a fully merged, executable trade directive),
//! [`ResolvedOrder`] (signal + canonical symbol + operational parameters)
//! and [`ExecutionOutcome`] (the terminal result of one dispatch).
//!
//! ## Why a fresh `Uuid` per signal?
//! Transport message ids can be redelivered; the signal id is minted here and
//! the idempotency key is derived from it, so duplicate *dispatches* of the
//! same signal collapse to one broker submission regardless of what the
//! transport does.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::fragment::{Fragment, TradeAction};

// ─── Signal ───────────────────────────────────────────────────────────────────

/// A fully merged trade directive, ready for symbol resolution.
///
/// Invariants held by construction: `action` is Buy/Sell and `symbol_token`
/// is non-empty. `stop_loss`/`take_profit` may both be absent if the source
/// messages never supplied them — that is not an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub id: Uuid,
    pub action: TradeAction,
    pub symbol_token: String,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    /// Ids of the 1 or 2 messages this signal was assembled from, in
    /// arrival order (entry first, params second).
    pub source_message_ids: Vec<i64>,
    pub channel_id: i64,
    pub created_at: DateTime<Utc>,
}

impl Signal {
    /// Build from a single COMPLETE fragment.
    pub fn from_complete(frag: &Fragment) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            action: frag.action?,
            symbol_token: frag.symbol_token.clone()?,
            stop_loss: frag.stop_loss,
            take_profit: frag.take_profit,
            source_message_ids: vec![frag.source_message_id],
            channel_id: frag.channel_id,
            created_at: Utc::now(),
        })
    }

    /// Merge an ENTRY_ONLY fragment with its PARAMS_ONLY follow-up.
    pub fn merged(entry: &Fragment, params: &Fragment) -> Option<Self> {
        Some(Self {
            id: Uuid::new_v4(),
            action: entry.action?,
            symbol_token: entry.symbol_token.clone()?,
            stop_loss: params.stop_loss,
            take_profit: params.take_profit,
            source_message_ids: vec![entry.source_message_id, params.source_message_id],
            channel_id: entry.channel_id,
            created_at: Utc::now(),
        })
    }

    /// Stable idempotency key for this signal — the dedup handle the audit
    /// sink enforces at-most-once dispatch on.
    pub fn idempotency_key(&self) -> String {
        format!("SIG-{}", self.id)
    }
}

// ─── ResolvedOrder ────────────────────────────────────────────────────────────

/// A signal plus everything the broker needs: canonical symbol, fixed lot
/// size, slippage tolerance, magic tag and the idempotency key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolvedOrder {
    pub signal: Signal,
    /// Canonical broker symbol (`"XAUUSD"`), never an alias.
    pub symbol: String,
    pub volume: f64,
    /// Max allowed slippage in points.
    pub slippage: u32,
    /// Marks orders placed by this engine, so they can be told apart from
    /// manual ones on the terminal side.
    pub magic: u64,
    pub idempotency_key: String,
}

// ─── ExecutionOutcome ─────────────────────────────────────────────────────────

/// Terminal status of one dispatch attempt sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OutcomeStatus {
    /// Broker accepted the order and assigned a ticket.
    Success,
    /// Broker refused with a terminal error — no retry.
    Rejected,
    /// Transient failures exhausted the retry ceiling, or the dispatch was
    /// aborted (shutdown, duplicate in flight).
    Error,
    /// Live trading is off; the order was recorded but never sent.
    SkippedDryRun,
}

/// The durable record of how a signal's dispatch ended.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub signal_id: Uuid,
    pub status: OutcomeStatus,
    /// Broker ticket number (present on `Success` only).
    pub broker_ticket: Option<u64>,
    /// Last broker error code (`"REQUOTE"`, `"MARKET_CLOSED"`, ...).
    pub error_code: Option<String>,
    /// Number of broker submissions actually attempted (0 under dry-run).
    pub attempts: u32,
}

impl ExecutionOutcome {
    pub fn success(signal_id: Uuid, ticket: u64, attempts: u32) -> Self {
        Self {
            signal_id,
            status: OutcomeStatus::Success,
            broker_ticket: Some(ticket),
            error_code: None,
            attempts,
        }
    }

    pub fn rejected(signal_id: Uuid, code: impl Into<String>, attempts: u32) -> Self {
        Self {
            signal_id,
            status: OutcomeStatus::Rejected,
            broker_ticket: None,
            error_code: Some(code.into()),
            attempts,
        }
    }

    pub fn error(signal_id: Uuid, code: impl Into<String>, attempts: u32) -> Self {
        Self {
            signal_id,
            status: OutcomeStatus::Error,
            broker_ticket: None,
            error_code: Some(code.into()),
            attempts,
        }
    }

    pub fn skipped_dry_run(signal_id: Uuid) -> Self {
        Self {
            signal_id,
            status: OutcomeStatus::SkippedDryRun,
            broker_ticket: None,
            error_code: None,
            attempts: 0,
        }
    }
}
