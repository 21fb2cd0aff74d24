//! # engine::correlator
//!
//! **Correlator** — reconciles an entry-only fragment (`SELL GOLD NOW`) with
//! the parameter reply that follows it (`TP 2700 SL 2650`), per channel,
//! within a bounded time window.
//!
//! ## State
//! One keyed store `channel_id -> PendingEntry`, capacity 1 per channel:
//! only the most recent unresolved entry is actionable, so a second entry
//! evicts the first. All mutation funnels through [`Correlator::correlate`],
//! which makes each transition atomic and the TTL/eviction logic testable in
//! isolation.
//!
//! TTL expiry is checked lazily on every fragment for a channel — no
//! background timer. A late PARAMS_ONLY after expiry is reported as an
//! `EXPIRED` discard rather than silently dropped.
//!
//! Per-channel ordering is the only ordering guarantee; nothing here blocks.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info};

use crate::models::{DiscardReason, Fragment, FragmentKind, Signal};

// ─── PendingEntry ─────────────────────────────────────────────────────────────

/// A stored ENTRY_ONLY fragment awaiting its parameter reply.
#[derive(Debug, Clone)]
pub struct PendingEntry {
    pub fragment: Fragment,
    pub expires_at: DateTime<Utc>,
}

impl PendingEntry {
    fn new(fragment: Fragment, now: DateTime<Utc>, ttl: Duration) -> Self {
        Self {
            fragment,
            expires_at: now + ttl,
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// ─── Correlation result ───────────────────────────────────────────────────────

/// What one fragment did to the correlation state.
#[derive(Debug, Clone)]
pub enum Correlation {
    /// A fully merged signal — proceed to resolution and dispatch.
    Ready(Signal),
    /// The fragment was parked as (or replaced) a pending entry; nothing to
    /// execute yet.
    Held,
    /// The fragment itself was dropped.
    Dropped(DiscardReason),
}

/// [`Correlation`] plus any pending entry that was evicted as a side effect
/// (superseded or lazily expired). The caller audits both.
#[derive(Debug)]
pub struct CorrelationOutcome {
    pub result: Correlation,
    pub evicted: Option<(PendingEntry, DiscardReason)>,
}

impl CorrelationOutcome {
    fn plain(result: Correlation) -> Self {
        Self {
            result,
            evicted: None,
        }
    }
}

// ─── Correlator ───────────────────────────────────────────────────────────────

/// Stateful entry/reply matcher. One instance serves all channels.
pub struct Correlator {
    ttl: Duration,
    /// channel_id → the single live pending entry for that channel.
    /// A plain mutex: transitions are short and never held across await.
    pending: Mutex<HashMap<i64, PendingEntry>>,
}

impl Correlator {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Number of channels currently holding a pending entry.
    pub fn pending_count(&self) -> usize {
        self.pending.lock().map(|m| m.len()).unwrap_or(0)
    }

    /// Apply one fragment to the correlation state.
    ///
    /// `reply_to` is the transport-level reply link of the fragment's source
    /// message, if any. An explicit reply match always takes precedence over
    /// temporal-proximity matching.
    pub fn correlate(
        &self,
        frag: &Fragment,
        reply_to: Option<i64>,
        now: DateTime<Utc>,
    ) -> CorrelationOutcome {
        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            // A poisoned map only happens after a panic mid-transition;
            // recover the state rather than wedging every channel.
            Err(poisoned) => poisoned.into_inner(),
        };

        match frag.kind {
            // ── NO_MATCH: nothing to correlate ────────────────────────────────
            FragmentKind::NoMatch => {
                CorrelationOutcome::plain(Correlation::Dropped(DiscardReason::NoMatch))
            }

            // ── COMPLETE: emit immediately, clear any stale pending ───────────
            FragmentKind::Complete => {
                let evicted = pending.remove(&frag.channel_id).map(|old| {
                    info!(
                        channel_id = frag.channel_id,
                        stale_message_id = old.fragment.source_message_id,
                        "Complete signal supersedes stale pending entry"
                    );
                    (old, DiscardReason::ExpiredSuperseded)
                });

                match Signal::from_complete(frag) {
                    Some(signal) => CorrelationOutcome {
                        result: Correlation::Ready(signal),
                        evicted,
                    },
                    // Unreachable for a correctly classified COMPLETE.
                    None => CorrelationOutcome {
                        result: Correlation::Dropped(DiscardReason::NoMatch),
                        evicted,
                    },
                }
            }

            // ── ENTRY_ONLY: park it (replacing any older pending) ─────────────
            FragmentKind::EntryOnly => {
                let entry = PendingEntry::new(frag.clone(), now, self.ttl);
                let evicted = pending.insert(frag.channel_id, entry).map(|old| {
                    let reason = if old.is_expired(now) {
                        DiscardReason::Expired
                    } else {
                        DiscardReason::ExpiredSuperseded
                    };
                    info!(
                        channel_id = frag.channel_id,
                        old_message_id = old.fragment.source_message_id,
                        new_message_id = frag.source_message_id,
                        ?reason,
                        "Pending entry replaced"
                    );
                    (old, reason)
                });

                debug!(
                    channel_id = frag.channel_id,
                    message_id = frag.source_message_id,
                    expires_at = %(now + self.ttl),
                    "⏳ Entry parked, awaiting parameters"
                );

                CorrelationOutcome {
                    result: Correlation::Held,
                    evicted,
                }
            }

            // ── PARAMS_ONLY: try to complete the pending entry ────────────────
            FragmentKind::ParamsOnly => {
                let Some(entry) = pending.remove(&frag.channel_id) else {
                    return CorrelationOutcome::plain(Correlation::Dropped(
                        DiscardReason::OrphanParams,
                    ));
                };

                // Lazy TTL check — report the expiry eagerly now that a late
                // reply has surfaced it.
                if entry.is_expired(now) {
                    return CorrelationOutcome {
                        result: Correlation::Dropped(DiscardReason::Expired),
                        evicted: Some((entry, DiscardReason::Expired)),
                    };
                }

                // Explicit reply link beats temporal proximity: a reply to a
                // message that is no longer the live pending entry must not
                // attach to the wrong one.
                let matches = match reply_to {
                    Some(reply_id) => reply_id == entry.fragment.source_message_id,
                    None => true,
                };

                if !matches {
                    // The live entry stays parked for its real reply.
                    pending.insert(frag.channel_id, entry);
                    return CorrelationOutcome::plain(Correlation::Dropped(
                        DiscardReason::OrphanParams,
                    ));
                }

                match Signal::merged(&entry.fragment, frag) {
                    Some(signal) => {
                        info!(
                            channel_id = frag.channel_id,
                            entry_id = entry.fragment.source_message_id,
                            params_id = frag.source_message_id,
                            "🔗 Entry + params merged into signal"
                        );
                        CorrelationOutcome::plain(Correlation::Ready(signal))
                    }
                    None => CorrelationOutcome::plain(Correlation::Dropped(
                        DiscardReason::OrphanParams,
                    )),
                }
            }
        }
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;

    fn entry(id: i64, channel: i64) -> Fragment {
        Fragment::classify(
            id,
            channel,
            Some(TradeAction::Sell),
            Some("GOLD".into()),
            None,
            None,
        )
    }

    fn params(id: i64, channel: i64) -> Fragment {
        Fragment::classify(id, channel, None, None, Some(2650.0), Some(2700.0))
    }

    fn complete(id: i64, channel: i64) -> Fragment {
        Fragment::classify(
            id,
            channel,
            Some(TradeAction::Buy),
            Some("XAUUSD".into()),
            Some(4014.427),
            Some(4055.964),
        )
    }

    fn correlator() -> Correlator {
        Correlator::new(Duration::minutes(30))
    }

    #[test]
    fn complete_fragment_emits_signal_in_one_step() {
        let c = correlator();
        let out = c.correlate(&complete(100, 7), None, Utc::now());
        let Correlation::Ready(signal) = out.result else {
            panic!("expected Ready, got {:?}", out.result);
        };
        assert_eq!(signal.action, TradeAction::Buy);
        assert_eq!(signal.symbol_token, "XAUUSD");
        assert_eq!(signal.source_message_ids, vec![100]);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn entry_then_params_merges_with_source_ids_in_order() {
        let c = correlator();
        let now = Utc::now();

        let out = c.correlate(&entry(100, 7), None, now);
        assert!(matches!(out.result, Correlation::Held));
        assert_eq!(c.pending_count(), 1);

        let out = c.correlate(&params(101, 7), Some(100), now + Duration::minutes(5));
        let Correlation::Ready(signal) = out.result else {
            panic!("expected Ready");
        };
        assert_eq!(signal.action, TradeAction::Sell);
        assert_eq!(signal.symbol_token, "GOLD");
        assert_eq!(signal.stop_loss, Some(2650.0));
        assert_eq!(signal.take_profit, Some(2700.0));
        assert_eq!(signal.source_message_ids, vec![100, 101]);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn reply_less_params_match_by_proximity_within_ttl() {
        let c = correlator();
        let now = Utc::now();
        c.correlate(&entry(100, 7), None, now);

        let out = c.correlate(&params(101, 7), None, now + Duration::minutes(29));
        assert!(matches!(out.result, Correlation::Ready(_)));
    }

    #[test]
    fn params_after_ttl_expiry_are_reported_expired() {
        let c = correlator();
        let now = Utc::now();
        c.correlate(&entry(100, 7), None, now);

        let out = c.correlate(&params(101, 7), None, now + Duration::minutes(31));
        assert!(matches!(
            out.result,
            Correlation::Dropped(DiscardReason::Expired)
        ));
        let (old, reason) = out.evicted.expect("expired entry surfaced");
        assert_eq!(old.fragment.source_message_id, 100);
        assert_eq!(reason, DiscardReason::Expired);
        assert_eq!(c.pending_count(), 0);
    }

    #[test]
    fn second_entry_supersedes_the_first() {
        let c = correlator();
        let now = Utc::now();
        c.correlate(&entry(100, 7), None, now);

        let out = c.correlate(&entry(102, 7), None, now + Duration::minutes(1));
        assert!(matches!(out.result, Correlation::Held));
        let (old, reason) = out.evicted.expect("old entry evicted");
        assert_eq!(old.fragment.source_message_id, 100);
        assert_eq!(reason, DiscardReason::ExpiredSuperseded);

        // Params reply-linked to the superseded entry must not resurrect it.
        let out = c.correlate(&params(103, 7), Some(100), now + Duration::minutes(2));
        assert!(matches!(
            out.result,
            Correlation::Dropped(DiscardReason::OrphanParams)
        ));

        // Reply-linked to the live entry: merges.
        let out = c.correlate(&params(104, 7), Some(102), now + Duration::minutes(2));
        let Correlation::Ready(signal) = out.result else {
            panic!("expected Ready");
        };
        assert_eq!(signal.source_message_ids, vec![102, 104]);
    }

    #[test]
    fn orphan_params_with_no_pending_entry() {
        let c = correlator();
        let out = c.correlate(&params(101, 7), None, Utc::now());
        assert!(matches!(
            out.result,
            Correlation::Dropped(DiscardReason::OrphanParams)
        ));
    }

    #[test]
    fn channels_never_cross() {
        let c = correlator();
        let now = Utc::now();
        c.correlate(&entry(100, 7), None, now);

        // Params on another channel cannot consume channel 7's entry.
        let out = c.correlate(&params(200, 8), None, now);
        assert!(matches!(
            out.result,
            Correlation::Dropped(DiscardReason::OrphanParams)
        ));
        assert_eq!(c.pending_count(), 1);
    }

    #[test]
    fn complete_clears_stale_pending() {
        let c = correlator();
        let now = Utc::now();
        c.correlate(&entry(100, 7), None, now);

        let out = c.correlate(&complete(105, 7), None, now + Duration::minutes(1));
        assert!(matches!(out.result, Correlation::Ready(_)));
        let (old, reason) = out.evicted.expect("stale pending cleared");
        assert_eq!(old.fragment.source_message_id, 100);
        assert_eq!(reason, DiscardReason::ExpiredSuperseded);
        assert_eq!(c.pending_count(), 0);
    }
}
