//! # models::message
//!
//! Defines [`RawMessage`], one chat message as forwarded by the transport
//! bridge to the `/api/telegram/message` endpoint.
//!
//! The bridge owns channel subscription and delivery; the engine only relies
//! on two of its guarantees: message ids are unique within a channel, and a
//! channel's messages are POSTed in arrival order.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single inbound chat message, exactly as received.
///
/// Immutable once received — the engine never rewrites message text, it only
/// derives [`Fragment`](crate::models::Fragment)s from it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawMessage {
    /// Transport-side message id (unique per channel).
    pub id: i64,

    /// The channel this message arrived on. Correlation state is keyed by
    /// this value; messages never match across channels.
    pub channel_id: i64,

    /// UTC timestamp assigned by the transport.
    pub timestamp: DateTime<Utc>,

    /// The raw message text. May span multiple lines.
    pub text: String,

    /// If this message was posted as an explicit reply, the id of the
    /// message it replies to (same channel).
    #[serde(default)]
    pub reply_to_id: Option<i64>,
}
