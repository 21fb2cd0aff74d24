//! # models
//!
//! Core data types flowing through the engine, in pipeline order:
//!
//! ```text
//! RawMessage ──▶ Fragment ──▶ Signal ──▶ ResolvedOrder ──▶ ExecutionOutcome
//!                 (extract)  (correlate)  (resolve)         (execute)
//! ```
//!
//! Every type here is immutable once constructed — downstream stages build
//! new values instead of mutating upstream ones, which keeps the audit trail
//! trustworthy.

pub mod audit;
pub mod fragment;
pub mod message;
pub mod signal;

pub use audit::{AuditRecord, DiscardReason};
pub use fragment::{Fragment, FragmentKind, TradeAction};
pub use message::RawMessage;
pub use signal::{ExecutionOutcome, OutcomeStatus, ResolvedOrder, Signal};
