//! # audit
//!
//! **Audit sink** — the durable, append-only record of everything the engine
//! saw, derived and did, plus the idempotency ledger that makes dispatch
//! at-most-once.
//!
//! The claim interface is the critical piece: `begin_dispatch` must be a
//! single serializable lookup-or-claim so two concurrent dispatches on the
//! same key can never both reach the broker. The gateway refuses to submit
//! an order it cannot durably record, so a sink failure here aborts the
//! dispatch.
//!
//! [`MemoryAuditSink`] is the default (state lives for the process);
//! a PostgreSQL sink is available behind the `postgres` feature.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use crate::models::{AuditRecord, ExecutionOutcome};

// ─── Errors ───────────────────────────────────────────────────────────────────

/// Failure to persist or read the audit trail. Fatal for the dispatch that
/// hit it — idempotency can no longer be guaranteed without the ledger.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),
}

// ─── Claim result ─────────────────────────────────────────────────────────────

/// What `begin_dispatch` found for an idempotency key.
#[derive(Debug)]
pub enum DispatchClaim {
    /// Key unseen — claimed for this dispatch, proceed to the broker.
    Fresh,
    /// A terminal outcome is already recorded — return it, do not dispatch.
    Replay(ExecutionOutcome),
    /// Another dispatch holds the claim and has not finished. Do not
    /// dispatch; surface as an error outcome.
    Racing,
}

// ─── Counters ─────────────────────────────────────────────────────────────────

/// Aggregate counts for the monitor surface.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SinkStats {
    pub messages: u64,
    pub signals: u64,
    pub discards: u64,
    pub orders: u64,
    pub outcomes: u64,
}

// ─── Trait ────────────────────────────────────────────────────────────────────

#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Append one record. Append-only: records are never updated or removed.
    async fn append(&self, record: AuditRecord) -> Result<(), SinkError>;

    /// Atomic lookup-or-claim on an idempotency key (see module docs).
    async fn begin_dispatch(&self, key: &str) -> Result<DispatchClaim, SinkError>;

    /// Record the terminal outcome for a claimed key, releasing the claim.
    async fn record_outcome(
        &self,
        key: &str,
        outcome: &ExecutionOutcome,
    ) -> Result<(), SinkError>;

    /// Hand back a claim whose dispatch aborted before any broker contact,
    /// so a later dispatch of the key starts fresh instead of reading as a
    /// concurrent one. A key with a recorded outcome is left untouched.
    async fn release_dispatch(&self, key: &str) -> Result<(), SinkError>;

    /// Recorded outcome for a key, if any.
    async fn lookup_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<ExecutionOutcome>, SinkError>;

    /// Aggregate counters for the monitor endpoint.
    async fn stats(&self) -> Result<SinkStats, SinkError>;
}

// ─── In-memory implementation ─────────────────────────────────────────────────

#[derive(Default)]
struct MemoryInner {
    records: Vec<AuditRecord>,
    /// key → None while a dispatch holds the claim, Some once terminal.
    outcomes: HashMap<String, Option<ExecutionOutcome>>,
}

/// Process-lifetime sink. A single mutex around both maps gives the
/// serializable lookup-or-claim for free.
#[derive(Default)]
pub struct MemoryAuditSink {
    inner: Mutex<MemoryInner>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, MemoryInner>, SinkError> {
        self.inner
            .lock()
            .map_err(|_| SinkError::Unavailable("audit state poisoned".into()))
    }

    /// Full trail snapshot — test and debugging helper.
    pub fn records(&self) -> Vec<AuditRecord> {
        self.inner
            .lock()
            .map(|g| g.records.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), SinkError> {
        debug!(kind = record.kind(), "📝 Audit append");
        self.lock()?.records.push(record);
        Ok(())
    }

    async fn begin_dispatch(&self, key: &str) -> Result<DispatchClaim, SinkError> {
        let mut inner = self.lock()?;
        match inner.outcomes.get(key) {
            Some(Some(outcome)) => Ok(DispatchClaim::Replay(outcome.clone())),
            Some(None) => Ok(DispatchClaim::Racing),
            None => {
                inner.outcomes.insert(key.to_string(), None);
                Ok(DispatchClaim::Fresh)
            }
        }
    }

    async fn record_outcome(
        &self,
        key: &str,
        outcome: &ExecutionOutcome,
    ) -> Result<(), SinkError> {
        self.lock()?
            .outcomes
            .insert(key.to_string(), Some(outcome.clone()));
        Ok(())
    }

    async fn release_dispatch(&self, key: &str) -> Result<(), SinkError> {
        let mut inner = self.lock()?;
        if let Some(None) = inner.outcomes.get(key) {
            inner.outcomes.remove(key);
        }
        Ok(())
    }

    async fn lookup_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<ExecutionOutcome>, SinkError> {
        Ok(self.lock()?.outcomes.get(key).cloned().flatten())
    }

    async fn stats(&self) -> Result<SinkStats, SinkError> {
        let inner = self.lock()?;
        let mut stats = SinkStats::default();
        for record in &inner.records {
            match record {
                AuditRecord::Message { .. } => stats.messages += 1,
                AuditRecord::Signal { .. } => stats.signals += 1,
                AuditRecord::Discard { .. } => stats.discards += 1,
                AuditRecord::UnresolvedSymbol { .. } => stats.discards += 1,
                AuditRecord::Order { .. } => stats.orders += 1,
                AuditRecord::Outcome { .. } => stats.outcomes += 1,
            }
        }
        Ok(stats)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
