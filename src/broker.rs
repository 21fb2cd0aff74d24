//! # broker
//!
//! **Broker gateway** — the outbound seam to MetaTrader 5.
//!
//! ## MT5 bridge API contract
//! The bridge EA accepts POST `/order/send` and answers JSON:
//! ```json
//! { "retcode": 10009, "order": 123456, "comment": "Request completed" }
//! ```
//! retcode 10009 = `TRADE_RETCODE_DONE` (the only success code).
//!
//! The [`BrokerGateway`] trait exists so the execution gateway can be tested
//! against scripted brokers; [`Mt5HttpGateway`] is the production
//! implementation. Setting `MT5_BASE_URL=mock` simulates an instant fill,
//! useful when wiring up the transport bridge without a terminal running.

use async_trait::async_trait;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::models::ResolvedOrder;

// ─── Wire types ───────────────────────────────────────────────────────────────

/// Payload sent to the MT5 bridge endpoint.
#[derive(Debug, Clone, serde::Serialize)]
pub struct OrderRequest {
    pub symbol: String,
    pub action: &'static str, // "BUY" | "SELL"
    pub volume: f64,
    pub sl: f64, // 0.0 = not set (MT5 convention)
    pub tp: f64, // 0.0 = not set
    /// Max slippage in points.
    pub deviation: u32,
    /// Marks this engine's orders on the terminal side.
    pub magic: u64,
    pub comment: String,
}

impl OrderRequest {
    pub fn from_resolved(order: &ResolvedOrder) -> Self {
        Self {
            symbol: order.symbol.clone(),
            action: order.signal.action.as_wire(),
            volume: order.volume,
            sl: order.signal.stop_loss.unwrap_or(0.0),
            tp: order.signal.take_profit.unwrap_or(0.0),
            deviation: order.slippage,
            magic: order.magic,
            comment: format!("SLP-{}", &order.signal.id.to_string()[..8]),
        }
    }
}

/// Response from the MT5 bridge.
#[derive(Debug, serde::Deserialize)]
pub struct Mt5OrderResponse {
    /// MT5 return code — 10009 = success.
    pub retcode: u32,
    /// MT5 ticket (present when retcode = 10009).
    pub order: Option<u64>,
    pub comment: Option<String>,
}

/// Successful submission: the broker assigned a ticket.
#[derive(Debug, Clone, Copy)]
pub struct BrokerAck {
    pub ticket: u64,
}

// ─── Error classification ─────────────────────────────────────────────────────

/// Broker failures, split into the transient class (worth retrying) and the
/// terminal class (retrying cannot help).
#[derive(Debug, Clone, Error)]
pub enum BrokerError {
    #[error("requote")]
    Requote,
    #[error("broker call timed out")]
    Timeout,
    #[error("broker unreachable: {0}")]
    Connection(String),
    #[error("invalid symbol")]
    InvalidSymbol,
    #[error("insufficient funds")]
    InsufficientFunds,
    #[error("market closed")]
    MarketClosed,
    #[error("trading disabled")]
    TradingDisabled,
    #[error("rejected: {0}")]
    Rejected(String),
}

impl BrokerError {
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            BrokerError::Requote | BrokerError::Timeout | BrokerError::Connection(_)
        )
    }

    /// Stable code string recorded in outcomes and the audit trail.
    pub fn code(&self) -> &'static str {
        match self {
            BrokerError::Requote => "REQUOTE",
            BrokerError::Timeout => "TIMEOUT",
            BrokerError::Connection(_) => "CONNECTION",
            BrokerError::InvalidSymbol => "INVALID_SYMBOL",
            BrokerError::InsufficientFunds => "INSUFFICIENT_FUNDS",
            BrokerError::MarketClosed => "MARKET_CLOSED",
            BrokerError::TradingDisabled => "TRADING_DISABLED",
            BrokerError::Rejected(_) => "REJECTED",
        }
    }

    /// Map an MT5 retcode to a classified error.
    fn from_retcode(retcode: u32, comment: Option<String>) -> Self {
        match retcode {
            10004 => BrokerError::Requote,
            10013 | 10014 | 10022 => BrokerError::InvalidSymbol,
            10016 => BrokerError::Rejected("invalid stops".into()),
            10018 => BrokerError::MarketClosed,
            10019 => BrokerError::InsufficientFunds,
            10017 | 10027 => BrokerError::TradingDisabled,
            other => BrokerError::Rejected(format!(
                "retcode={other} comment={}",
                comment.as_deref().unwrap_or("unknown")
            )),
        }
    }
}

// ─── Gateway trait ────────────────────────────────────────────────────────────

/// The single outbound operation the engine needs from a broker.
#[async_trait]
pub trait BrokerGateway: Send + Sync {
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerAck, BrokerError>;
}

// ─── MT5 HTTP implementation ──────────────────────────────────────────────────

pub struct Mt5HttpGateway {
    client: reqwest::Client,
    base_url: String,
    timeout: std::time::Duration,
}

impl Mt5HttpGateway {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout: std::time::Duration::from_secs(5),
        }
    }
}

#[async_trait]
impl BrokerGateway for Mt5HttpGateway {
    async fn submit_order(&self, request: &OrderRequest) -> Result<BrokerAck, BrokerError> {
        if self.base_url == "mock" {
            info!("🎭 [BROKER] Mock mode — simulating fill");
            return Ok(BrokerAck { ticket: 999_999 });
        }

        let url = format!("{}/order/send", self.base_url);

        info!(
            symbol = %request.symbol,
            action = %request.action,
            volume = request.volume,
            sl = request.sl,
            tp = request.tp,
            url = %url,
            "🚀 [BROKER] Sending order to MT5"
        );

        // ── HTTP POST ─────────────────────────────────────────────────────────
        let response = self
            .client
            .post(&url)
            .json(request)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    warn!(error = %e, "MT5 call timed out");
                    BrokerError::Timeout
                } else {
                    error!(error = %e, "MT5 unreachable");
                    BrokerError::Connection(e.to_string())
                }
            })?;

        // ── HTTP status ───────────────────────────────────────────────────────
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "MT5 bridge returned HTTP error");
            return Err(BrokerError::Connection(format!("HTTP {status}: {body}")));
        }

        // ── Parse + retcode check ─────────────────────────────────────────────
        let mt5: Mt5OrderResponse = response.json().await.map_err(|e| {
            error!(error = %e, "MT5 response parse failed");
            BrokerError::Connection(format!("response parse error: {e}"))
        })?;

        if mt5.retcode != 10009 {
            let err = BrokerError::from_retcode(mt5.retcode, mt5.comment);
            warn!(retcode = mt5.retcode, code = err.code(), "MT5 refused order");
            return Err(err);
        }

        let ticket = mt5.order.ok_or_else(|| {
            BrokerError::Rejected("retcode 10009 without ticket".into())
        })?;

        info!(ticket, "✅ [BROKER] MT5 accepted order");
        Ok(BrokerAck { ticket })
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TradeAction;

    #[test]
    fn retcode_classification() {
        assert!(BrokerError::from_retcode(10004, None).is_transient());
        assert!(!BrokerError::from_retcode(10018, None).is_transient());
        assert_eq!(BrokerError::from_retcode(10019, None).code(), "INSUFFICIENT_FUNDS");
        assert_eq!(BrokerError::from_retcode(10027, None).code(), "TRADING_DISABLED");
        assert_eq!(BrokerError::from_retcode(99999, None).code(), "REJECTED");
    }

    #[tokio::test]
    async fn mock_mode_fills_without_network() {
        let gw = Mt5HttpGateway::new(reqwest::Client::new(), "mock");
        let req = OrderRequest {
            symbol: "XAUUSD".into(),
            action: TradeAction::Buy.as_wire(),
            volume: 0.01,
            sl: 0.0,
            tp: 0.0,
            deviation: 10,
            magic: 234567,
            comment: "SLP-test".into(),
        };
        let ack = gw.submit_order(&req).await.expect("mock fill");
        assert_eq!(ack.ticket, 999_999);
    }
}
