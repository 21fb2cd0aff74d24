//! # engine::executor
//!
//! **Execution Gateway** — the only component allowed to talk to the broker.
//!
//! Guarantees, in order of importance:
//! 1. **At-most-once**: the audit sink's claim ledger is consulted before
//!    every dispatch; a key that already has an outcome replays it, a key
//!    claimed by a concurrent dispatch is refused. This holds across process
//!    restarts when a durable sink is configured.
//! 2. **Record before submit**: the order intent is appended to the audit
//!    trail before the broker sees it. If that write fails, the dispatch
//!    aborts — never a live order the trail doesn't know about.
//! 3. **Bounded retry**: transient failures (requote / timeout / connection)
//!    retry with exponential backoff up to a ceiling; terminal failures
//!    reject immediately. Shutdown aborts the loop after the current
//!    attempt and surfaces the last error.
//! 4. **Dry-run**: with live trading off, the would-be order is still
//!    recorded for inspection, the broker is never contacted.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{info, warn};

use crate::audit::{AuditSink, DispatchClaim};
use crate::broker::{BrokerGateway, OrderRequest};
use crate::error::AppError;
use crate::models::{AuditRecord, ExecutionOutcome, ResolvedOrder};

pub struct ExecutionGateway {
    broker: Arc<dyn BrokerGateway>,
    sink: Arc<dyn AuditSink>,
    /// Live-trading toggle, read per dispatch (flippable at runtime).
    trading_enabled: Arc<AtomicBool>,
    /// Set during shutdown: retry loops finish their current attempt and stop.
    shutdown: Arc<AtomicBool>,
    max_attempts: u32,
    backoff_base: Duration,
}

impl ExecutionGateway {
    pub fn new(
        broker: Arc<dyn BrokerGateway>,
        sink: Arc<dyn AuditSink>,
        trading_enabled: Arc<AtomicBool>,
        shutdown: Arc<AtomicBool>,
        max_attempts: u32,
        backoff_base: Duration,
    ) -> Self {
        Self {
            broker,
            sink,
            trading_enabled,
            shutdown,
            max_attempts: max_attempts.max(1),
            backoff_base,
        }
    }

    /// Dispatch a resolved order, exactly once per idempotency key.
    pub async fn execute(&self, order: &ResolvedOrder) -> Result<ExecutionOutcome, AppError> {
        let key = &order.idempotency_key;
        let signal_id = order.signal.id;

        // ── 1. Idempotency claim (atomic lookup-or-claim) ─────────────────────
        match self.sink.begin_dispatch(key).await? {
            DispatchClaim::Replay(stored) => {
                info!(%key, status = ?stored.status, "♻️  Duplicate dispatch — replaying stored outcome");
                return Ok(stored);
            }
            DispatchClaim::Racing => {
                warn!(%key, "Concurrent dispatch already holds this key — refusing");
                return Ok(ExecutionOutcome::error(signal_id, "DISPATCH_IN_FLIGHT", 0));
            }
            DispatchClaim::Fresh => {}
        }

        // ── 2. Record the order intent before any broker contact ──────────────
        if let Err(e) = self
            .sink
            .append(AuditRecord::Order {
                order: order.clone(),
                noted_at: Utc::now(),
            })
            .await
        {
            warn!(%key, error = %e, "Audit append failed — dispatch aborted, no broker contact");
            return self.abort_unsubmitted(key, e).await;
        }

        // ── 3. Dry-run short-circuit ──────────────────────────────────────────
        if !self.trading_enabled.load(Ordering::Relaxed) {
            info!(
                symbol = %order.symbol,
                action = order.signal.action.as_wire(),
                "🎭 DRY-RUN — order recorded, not dispatched"
            );
            let outcome = ExecutionOutcome::skipped_dry_run(signal_id);
            match self.finish(key, outcome).await {
                Ok(outcome) => Ok(outcome),
                // Still nothing at the broker, so the claim goes back too.
                Err(e) => self.abort_unsubmitted(key, e).await,
            }
        } else {
            // ── 4. Retry loop ─────────────────────────────────────────────────
            let outcome = self.dispatch_with_retry(order).await;
            // A finish failure here keeps the claim held: the order may be
            // live at the broker, and replaying could double-submit.
            self.finish(key, outcome).await
        }
    }

    /// Abort a dispatch that never reached the broker: hand the claim back
    /// so a later dispatch of the same key starts fresh instead of reading
    /// as a concurrent one.
    async fn abort_unsubmitted<E: Into<AppError>>(
        &self,
        key: &str,
        cause: E,
    ) -> Result<ExecutionOutcome, AppError> {
        if let Err(release) = self.sink.release_dispatch(key).await {
            warn!(%key, error = %release, "Claim release failed — key stays held");
        }
        Err(cause.into())
    }

    async fn dispatch_with_retry(&self, order: &ResolvedOrder) -> ExecutionOutcome {
        let request = OrderRequest::from_resolved(order);
        let signal_id = order.signal.id;
        let mut attempts: u32 = 0;

        loop {
            attempts += 1;

            match self.broker.submit_order(&request).await {
                Ok(ack) => {
                    info!(
                        ticket = ack.ticket,
                        attempts,
                        symbol = %order.symbol,
                        "✅ Order filled"
                    );
                    return ExecutionOutcome::success(signal_id, ack.ticket, attempts);
                }

                Err(e) if e.is_transient() => {
                    let code = e.code();
                    warn!(attempt = attempts, code, "Transient broker failure");

                    if attempts >= self.max_attempts {
                        warn!(code, attempts, "Retry ceiling reached — giving up");
                        return ExecutionOutcome::error(signal_id, code, attempts);
                    }
                    if self.shutdown.load(Ordering::Relaxed) {
                        warn!(code, attempts, "Shutdown in progress — aborting retry loop");
                        return ExecutionOutcome::error(signal_id, code, attempts);
                    }

                    // 500ms, 1s, 2s, ... up to the attempt ceiling.
                    let delay = self.backoff_base * 2u32.saturating_pow(attempts - 1);
                    tokio::time::sleep(delay).await;
                }

                Err(e) => {
                    warn!(code = e.code(), attempts, "Terminal broker failure — no retry");
                    return ExecutionOutcome::rejected(signal_id, e.code(), attempts);
                }
            }
        }
    }

    /// Persist the terminal outcome. The order has (possibly) been placed by
    /// now, so a failure here is a system-level fault, not a silent drop.
    async fn finish(
        &self,
        key: &str,
        outcome: ExecutionOutcome,
    ) -> Result<ExecutionOutcome, AppError> {
        self.sink.record_outcome(key, &outcome).await?;
        self.sink
            .append(AuditRecord::Outcome {
                outcome: outcome.clone(),
                idempotency_key: key.to_string(),
                recorded_at: Utc::now(),
            })
            .await?;
        Ok(outcome)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::{MemoryAuditSink, SinkError, SinkStats};
    use crate::broker::{BrokerAck, BrokerError};
    use crate::models::{Fragment, OutcomeStatus, Signal, TradeAction};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::atomic::AtomicU32;
    use std::sync::Mutex;

    /// Broker whose answers are scripted per call; counts submissions.
    struct ScriptedBroker {
        script: Mutex<VecDeque<Result<BrokerAck, BrokerError>>>,
        calls: AtomicU32,
    }

    impl ScriptedBroker {
        fn new(script: Vec<Result<BrokerAck, BrokerError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                calls: AtomicU32::new(0),
            }
        }

        fn calls(&self) -> u32 {
            self.calls.load(Ordering::Relaxed)
        }
    }

    #[async_trait]
    impl BrokerGateway for ScriptedBroker {
        async fn submit_order(&self, _req: &OrderRequest) -> Result<BrokerAck, BrokerError> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            self.script
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(BrokerAck { ticket: 1 }))
        }
    }

    fn order() -> ResolvedOrder {
        let frag = Fragment::classify(
            100,
            7,
            Some(TradeAction::Buy),
            Some("GOLD".into()),
            Some(2650.0),
            Some(2700.0),
        );
        let signal = Signal::from_complete(&frag).unwrap();
        let key = signal.idempotency_key();
        ResolvedOrder {
            signal,
            symbol: "XAUUSD".into(),
            volume: 0.01,
            slippage: 10,
            magic: 234_567,
            idempotency_key: key,
        }
    }

    fn gateway(
        broker: Arc<ScriptedBroker>,
        sink: Arc<MemoryAuditSink>,
        live: bool,
    ) -> ExecutionGateway {
        ExecutionGateway::new(
            broker,
            sink,
            Arc::new(AtomicBool::new(live)),
            Arc::new(AtomicBool::new(false)),
            3,
            Duration::from_millis(1),
        )
    }

    #[tokio::test]
    async fn requote_twice_then_success_within_ceiling() {
        let broker = Arc::new(ScriptedBroker::new(vec![
            Err(BrokerError::Requote),
            Err(BrokerError::Requote),
            Ok(BrokerAck { ticket: 555 }),
        ]));
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = gateway(broker.clone(), sink, true);

        let outcome = gw.execute(&order()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.broker_ticket, Some(555));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(broker.calls(), 3);
    }

    #[tokio::test]
    async fn terminal_failure_rejects_without_retry() {
        let broker = Arc::new(ScriptedBroker::new(vec![Err(BrokerError::MarketClosed)]));
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = gateway(broker.clone(), sink, true);

        let outcome = gw.execute(&order()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Rejected);
        assert_eq!(outcome.error_code.as_deref(), Some("MARKET_CLOSED"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(broker.calls(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_error_with_last_code() {
        let broker = Arc::new(ScriptedBroker::new(vec![
            Err(BrokerError::Requote),
            Err(BrokerError::Timeout),
            Err(BrokerError::Connection("refused".into())),
        ]));
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = gateway(broker.clone(), sink, true);

        let outcome = gw.execute(&order()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.error_code.as_deref(), Some("CONNECTION"));
        assert_eq!(outcome.attempts, 3);
        assert_eq!(broker.calls(), 3);
    }

    #[tokio::test]
    async fn duplicate_dispatch_replays_stored_outcome() {
        let broker = Arc::new(ScriptedBroker::new(vec![Ok(BrokerAck { ticket: 42 })]));
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = gateway(broker.clone(), sink, true);
        let order = order();

        let first = gw.execute(&order).await.unwrap();
        let second = gw.execute(&order).await.unwrap();

        assert_eq!(first.broker_ticket, Some(42));
        assert_eq!(second.broker_ticket, Some(42));
        assert_eq!(second.attempts, first.attempts);
        // Exactly one broker submission for the pair.
        assert_eq!(broker.calls(), 1);
    }

    #[tokio::test]
    async fn dry_run_never_contacts_broker_but_audits() {
        let broker = Arc::new(ScriptedBroker::new(vec![]));
        let sink = Arc::new(MemoryAuditSink::new());
        let gw = gateway(broker.clone(), sink.clone(), false);

        let outcome = gw.execute(&order()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::SkippedDryRun);
        assert_eq!(outcome.attempts, 0);
        assert_eq!(broker.calls(), 0);

        // Would-be order and its outcome are both on the trail.
        let kinds: Vec<&str> = sink.records().iter().map(|r| r.kind()).collect();
        assert!(kinds.contains(&"ORDER"));
        assert!(kinds.contains(&"OUTCOME"));
    }

    /// Sink whose first N appends fail; everything else delegates to the
    /// in-memory sink.
    struct FlakyAppendSink {
        inner: MemoryAuditSink,
        failures_left: AtomicU32,
    }

    impl FlakyAppendSink {
        fn failing_first(n: u32) -> Self {
            Self {
                inner: MemoryAuditSink::new(),
                failures_left: AtomicU32::new(n),
            }
        }
    }

    #[async_trait]
    impl AuditSink for FlakyAppendSink {
        async fn append(&self, record: AuditRecord) -> Result<(), SinkError> {
            if self.failures_left.load(Ordering::Relaxed) > 0 {
                self.failures_left.fetch_sub(1, Ordering::Relaxed);
                return Err(SinkError::Unavailable("audit store offline".into()));
            }
            self.inner.append(record).await
        }

        async fn begin_dispatch(&self, key: &str) -> Result<DispatchClaim, SinkError> {
            self.inner.begin_dispatch(key).await
        }

        async fn record_outcome(
            &self,
            key: &str,
            outcome: &ExecutionOutcome,
        ) -> Result<(), SinkError> {
            self.inner.record_outcome(key, outcome).await
        }

        async fn release_dispatch(&self, key: &str) -> Result<(), SinkError> {
            self.inner.release_dispatch(key).await
        }

        async fn lookup_by_idempotency_key(
            &self,
            key: &str,
        ) -> Result<Option<ExecutionOutcome>, SinkError> {
            self.inner.lookup_by_idempotency_key(key).await
        }

        async fn stats(&self) -> Result<SinkStats, SinkError> {
            self.inner.stats().await
        }
    }

    #[tokio::test]
    async fn sink_failure_aborts_dispatch_before_broker_contact() {
        let broker = Arc::new(ScriptedBroker::new(vec![Ok(BrokerAck { ticket: 1 })]));
        let sink = Arc::new(FlakyAppendSink::failing_first(u32::MAX));
        let gw = ExecutionGateway::new(
            broker.clone(),
            sink,
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicBool::new(false)),
            3,
            Duration::from_millis(1),
        );

        let result = gw.execute(&order()).await;
        assert!(result.is_err(), "unrecordable order must not dispatch");
        assert_eq!(broker.calls(), 0);
    }

    #[tokio::test]
    async fn aborted_dispatch_releases_claim_for_a_later_attempt() {
        let broker = Arc::new(ScriptedBroker::new(vec![Ok(BrokerAck { ticket: 77 })]));
        let sink = Arc::new(FlakyAppendSink::failing_first(1));
        let gw = ExecutionGateway::new(
            broker.clone(),
            sink,
            Arc::new(AtomicBool::new(true)),
            Arc::new(AtomicBool::new(false)),
            3,
            Duration::from_millis(1),
        );
        let order = order();

        // First dispatch dies on the audit write, before the broker.
        assert!(gw.execute(&order).await.is_err());
        assert_eq!(broker.calls(), 0);

        // The key was handed back, so the redelivery dispatches cleanly
        // instead of reporting a dispatch still in flight.
        let outcome = gw.execute(&order).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Success);
        assert_eq!(outcome.broker_ticket, Some(77));
        assert_eq!(broker.calls(), 1);
    }

    #[tokio::test]
    async fn shutdown_aborts_retry_loop_after_current_attempt() {
        let broker = Arc::new(ScriptedBroker::new(vec![
            Err(BrokerError::Requote),
            Err(BrokerError::Requote),
            Err(BrokerError::Requote),
        ]));
        let sink = Arc::new(MemoryAuditSink::new());
        let shutdown = Arc::new(AtomicBool::new(true));
        let gw = ExecutionGateway::new(
            broker.clone(),
            sink,
            Arc::new(AtomicBool::new(true)),
            shutdown,
            3,
            Duration::from_millis(1),
        );

        let outcome = gw.execute(&order()).await.unwrap();
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert_eq!(outcome.error_code.as_deref(), Some("REQUOTE"));
        assert_eq!(outcome.attempts, 1);
        assert_eq!(broker.calls(), 1);
    }
}
