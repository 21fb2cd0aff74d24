//! # db — PostgreSQL Audit Sink
//!
//! Durable [`AuditSink`] backed by `sqlx`. Two tables:
//! - `audit_records` — the append-only trail, one JSONB payload per record
//! - `dispatch_outcomes` — the idempotency ledger; the row itself is the claim
//!
//! The at-most-once guarantee rides on `INSERT .. ON CONFLICT DO NOTHING`:
//! exactly one dispatch wins the insert for a key, every other one reads the
//! existing row. This survives process restarts, which the in-memory sink
//! does not.
//!
//! ## Setup
//! 1. Install PostgreSQL and create a database
//! 2. Set `DATABASE_URL` in `.env`
//! 3. Migrations run automatically at startup
//!
//! Queries are runtime-checked (`sqlx::query`) so the crate builds without a
//! live database.

use anyhow::Context;
use async_trait::async_trait;
use sqlx::{postgres::PgPoolOptions, PgPool, Row};
use tracing::info;

use crate::audit::{AuditSink, DispatchClaim, SinkError, SinkStats};
use crate::models::{AuditRecord, ExecutionOutcome};

pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    /// Connect and apply migrations.
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        info!("Connecting to PostgreSQL...");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .acquire_timeout(std::time::Duration::from_secs(5))
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL")?;

        // Embedded migration SQL
        sqlx::query(include_str!("../migrations/001_init.sql"))
            .execute(&pool)
            .await
            .context("Failed to run migration 001_init.sql")?;

        info!("✅ PostgreSQL connected and migrations applied");
        Ok(Self { pool })
    }
}

fn db_err(e: sqlx::Error) -> SinkError {
    SinkError::Unavailable(e.to_string())
}

fn json_err(e: serde_json::Error) -> SinkError {
    SinkError::Unavailable(format!("payload serialization: {e}"))
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, record: AuditRecord) -> Result<(), SinkError> {
        let payload = serde_json::to_value(&record).map_err(json_err)?;

        sqlx::query("INSERT INTO audit_records (kind, payload) VALUES ($1, $2)")
            .bind(record.kind())
            .bind(payload)
            .execute(&self.pool)
            .await
            .map_err(db_err)?;

        Ok(())
    }

    async fn begin_dispatch(&self, key: &str) -> Result<DispatchClaim, SinkError> {
        // One statement claims or reveals the key; no transaction needed.
        let inserted = sqlx::query(
            "INSERT INTO dispatch_outcomes (idempotency_key) VALUES ($1)
             ON CONFLICT (idempotency_key) DO NOTHING",
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        if inserted.rows_affected() == 1 {
            return Ok(DispatchClaim::Fresh);
        }

        let row = sqlx::query(
            "SELECT outcome FROM dispatch_outcomes WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_one(&self.pool)
        .await
        .map_err(db_err)?;

        let outcome: Option<serde_json::Value> = row.try_get("outcome").map_err(db_err)?;
        match outcome {
            Some(value) => {
                let stored: ExecutionOutcome =
                    serde_json::from_value(value).map_err(json_err)?;
                Ok(DispatchClaim::Replay(stored))
            }
            // Claimed, no terminal outcome yet: a dispatch is in flight.
            None => Ok(DispatchClaim::Racing),
        }
    }

    async fn record_outcome(
        &self,
        key: &str,
        outcome: &ExecutionOutcome,
    ) -> Result<(), SinkError> {
        let payload = serde_json::to_value(outcome).map_err(json_err)?;

        sqlx::query(
            "UPDATE dispatch_outcomes
             SET outcome = $2, recorded_at = NOW()
             WHERE idempotency_key = $1",
        )
        .bind(key)
        .bind(payload)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn release_dispatch(&self, key: &str) -> Result<(), SinkError> {
        // Only an unfinished claim is handed back; a recorded outcome stays.
        sqlx::query(
            "DELETE FROM dispatch_outcomes
             WHERE idempotency_key = $1 AND outcome IS NULL",
        )
        .bind(key)
        .execute(&self.pool)
        .await
        .map_err(db_err)?;

        Ok(())
    }

    async fn lookup_by_idempotency_key(
        &self,
        key: &str,
    ) -> Result<Option<ExecutionOutcome>, SinkError> {
        let row = sqlx::query(
            "SELECT outcome FROM dispatch_outcomes WHERE idempotency_key = $1",
        )
        .bind(key)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err)?;

        let Some(row) = row else { return Ok(None) };
        let value: Option<serde_json::Value> = row.try_get("outcome").map_err(db_err)?;
        match value {
            Some(value) => Ok(Some(
                serde_json::from_value(value).map_err(json_err)?,
            )),
            None => Ok(None),
        }
    }

    async fn stats(&self) -> Result<SinkStats, SinkError> {
        let rows = sqlx::query(
            "SELECT kind, COUNT(*) AS n FROM audit_records GROUP BY kind",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(db_err)?;

        let mut stats = SinkStats::default();
        for row in rows {
            let kind: String = row.try_get("kind").map_err(db_err)?;
            let n: i64 = row.try_get("n").map_err(db_err)?;
            let n = n.max(0) as u64;
            match kind.as_str() {
                "MESSAGE" => stats.messages = n,
                "SIGNAL" => stats.signals = n,
                // Unresolved symbols count as discards, same as the
                // in-memory sink reports them.
                "DISCARD" | "UNRESOLVED_SYMBOL" => stats.discards += n,
                "ORDER" => stats.orders = n,
                "OUTCOME" => stats.outcomes = n,
                _ => {}
            }
        }
        Ok(stats)
    }
}
