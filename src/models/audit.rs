//! # models::audit
//!
//! Defines [`AuditRecord`] — the append-only union persisted by the audit
//! sink. One record per noteworthy event: every inbound message, every
//! derived signal, every discard, every dispatch and its outcome.
//!
//! The trail must be sufficient to reconstruct, for any chat message, why it
//! did or did not result in a trade.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::signal::{ExecutionOutcome, ResolvedOrder, Signal};

// ─── DiscardReason ────────────────────────────────────────────────────────────

/// Why a message or pending entry was dropped without execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DiscardReason {
    /// The message carried nothing recognisable.
    NoMatch,
    /// Parameter-only message with no live pending entry to attach to.
    OrphanParams,
    /// The pending entry's correlation window had already closed.
    Expired,
    /// A newer entry replaced an unresolved pending entry — only the most
    /// recent unresolved entry is actionable.
    ExpiredSuperseded,
}

// ─── AuditRecord ──────────────────────────────────────────────────────────────

/// Append-only audit event. Never mutated after write.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "record", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditRecord {
    /// Every inbound message, signal or not.
    Message {
        message_id: i64,
        channel_id: i64,
        received_at: DateTime<Utc>,
        reply_to_id: Option<i64>,
        text: String,
    },

    /// A fully merged signal entering the resolution/execution stage.
    Signal { signal: Signal },

    /// A message or pending entry dropped before execution.
    Discard {
        channel_id: i64,
        /// Message id(s) involved: the discarded message, or the pending
        /// entry's source message.
        message_ids: Vec<i64>,
        reason: DiscardReason,
        noted_at: DateTime<Utc>,
    },

    /// A signal whose symbol token could not be mapped to a broker symbol.
    /// Halts that signal only; the channel keeps flowing.
    UnresolvedSymbol {
        signal_id: Uuid,
        symbol_token: String,
        noted_at: DateTime<Utc>,
    },

    /// The order as it was about to be dispatched (also written under
    /// dry-run, so skipped orders remain inspectable).
    Order {
        order: ResolvedOrder,
        noted_at: DateTime<Utc>,
    },

    /// Terminal result of a dispatch.
    Outcome {
        outcome: ExecutionOutcome,
        idempotency_key: String,
        recorded_at: DateTime<Utc>,
    },
}

impl AuditRecord {
    pub fn message(msg: &crate::models::RawMessage) -> Self {
        AuditRecord::Message {
            message_id: msg.id,
            channel_id: msg.channel_id,
            received_at: msg.timestamp,
            reply_to_id: msg.reply_to_id,
            text: msg.text.clone(),
        }
    }

    pub fn discard(channel_id: i64, message_ids: Vec<i64>, reason: DiscardReason) -> Self {
        AuditRecord::Discard {
            channel_id,
            message_ids,
            reason,
            noted_at: Utc::now(),
        }
    }

    /// Short tag used for logging and sink statistics.
    pub fn kind(&self) -> &'static str {
        match self {
            AuditRecord::Message { .. } => "MESSAGE",
            AuditRecord::Signal { .. } => "SIGNAL",
            AuditRecord::Discard { .. } => "DISCARD",
            AuditRecord::UnresolvedSymbol { .. } => "UNRESOLVED_SYMBOL",
            AuditRecord::Order { .. } => "ORDER",
            AuditRecord::Outcome { .. } => "OUTCOME",
        }
    }
}
