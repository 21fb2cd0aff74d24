//! # models::fragment
//!
//! Defines [`Fragment`] — the parse result of exactly one message, before
//! any correlation with other messages has happened.
//!
//! A fragment is a *candidate* directive: it may carry only the entry half
//! (`BUY GOLD NOW`), only the parameter half (`TP 2700 SL 2650`), both, or
//! nothing recognisable at all. The [`FragmentKind`] tag is what the
//! correlator dispatches on.

use serde::{Deserialize, Serialize};

// ─── TradeAction ──────────────────────────────────────────────────────────────

/// Trade direction extracted from the message text.
///
/// `LONG`/`SHORT` synonyms are normalised to `Buy`/`Sell` at extraction time,
/// so nothing downstream ever sees them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    /// Wire string used by the MT5 bridge (`"BUY"` / `"SELL"`).
    pub fn as_wire(&self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

// ─── FragmentKind ─────────────────────────────────────────────────────────────

/// Completeness classification of a single message's parse result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FragmentKind {
    /// Action + symbol + at least one of SL/TP in one message.
    Complete,
    /// Action + symbol, no numeric parameters — half a signal, the other
    /// half is expected as a follow-up message.
    EntryOnly,
    /// SL/TP labels with values, no action/symbol — the follow-up half.
    ParamsOnly,
    /// Nothing usable. Still audited, never executed.
    NoMatch,
}

// ─── Fragment ─────────────────────────────────────────────────────────────────

/// Parse result of one message. Never mutated after creation.
///
/// Classification is a pure function of the message text: it never consults
/// correlation state. A message that is a reply to a pending entry is still
/// classified on its own merits first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Fragment {
    /// Id of the message this fragment was parsed from.
    pub source_message_id: i64,
    pub channel_id: i64,
    pub action: Option<TradeAction>,
    /// Raw symbol token as found in the text (`"GOLD"`, `"XAUUSD"`, ...) —
    /// canonicalisation happens later in the resolver.
    pub symbol_token: Option<String>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub kind: FragmentKind,
}

impl Fragment {
    /// Classify from what was found. The kind is derived, never assigned
    /// independently of the fields.
    pub fn classify(
        source_message_id: i64,
        channel_id: i64,
        action: Option<TradeAction>,
        symbol_token: Option<String>,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Self {
        let has_entry = action.is_some() && symbol_token.is_some();
        let has_params = stop_loss.is_some() || take_profit.is_some();

        let kind = match (has_entry, has_params) {
            (true, true) => FragmentKind::Complete,
            (true, false) => FragmentKind::EntryOnly,
            (false, true) => FragmentKind::ParamsOnly,
            (false, false) => FragmentKind::NoMatch,
        };

        Self {
            source_message_id,
            channel_id,
            action,
            symbol_token,
            stop_loss,
            take_profit,
            kind,
        }
    }

    /// A fragment that carries nothing usable.
    pub fn no_match(source_message_id: i64, channel_id: i64) -> Self {
        Self::classify(source_message_id, channel_id, None, None, None, None)
    }
}
