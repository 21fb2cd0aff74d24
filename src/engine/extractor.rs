//! # engine::extractor
//!
//! **Normalizer / Extractor** — turns one message's text into a
//! [`Fragment`], independently of any other message.
//!
//! Pure function of the text: case-insensitive, tolerant of filler words
//! (`now`, `!`, `..`) and the label zoo real channels produce
//! (`Stop loss :`, `SL -`, `take-profit`, `Target`, `TP1 ... TP2 ...`).
//!
//! ## Supported shapes
//! ```text
//! "Buy XAUUSD .. Gold now !\nStop loss : 4014.427\nTake profit : 4055.964"   → COMPLETE
//! "SELL GOLD NOW"                                                            → ENTRY_ONLY
//! "TP 2700 SL 2650"                                                          → PARAMS_ONLY
//! "React if you're ready to learn"                                           → NO_MATCH
//! ```

use std::sync::LazyLock;

use regex::Regex;
use tracing::{debug, warn};

use crate::engine::resolver::SymbolResolver;
use crate::models::{Fragment, RawMessage, TradeAction};

// ─── Static patterns ──────────────────────────────────────────────────────────

static RE_BUY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:BUY|LONG)\b").expect("buy pattern"));
static RE_SELL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:SELL|SHORT)\b").expect("sell pattern"));

/// `SL : 4,232.37`, `SL 2650`, `SL – 80000` — label variants are already
/// collapsed to `SL` by [`normalize`].
static RE_SL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bSL\b\s*[:–—-]*\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("sl pattern"));

/// Numbered take-profit: `TP1 2645 TP2 2640` — the first target wins.
static RE_TP1: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bTP\s*1\b\s*[:–—-]*\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("tp1 pattern"));

/// Plain take-profit. `TP\b` deliberately refuses to match inside `TP2`,
/// `TP3` — numbered targets other than TP1 are ignored.
static RE_TP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bTP\b\s*[:–—-]*\s*([0-9][0-9,]*(?:\.[0-9]+)?)").expect("tp pattern"));

/// Spaced metal/pair symbols: `xau usd` → `XAUUSD`, `eur usd` → `EURUSD`.
static RE_SPACED_USD_QUOTE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(XAU|XAG|EUR|GBP|AUD|NZD)\s+USD\b").expect("spaced quote pattern"));
static RE_SPACED_USD_BASE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bUSD\s+(JPY|CAD|CHF)\b").expect("spaced base pattern"));

// ─── Normalisation ────────────────────────────────────────────────────────────

/// Uppercase the text and collapse every label/symbol spelling variant into
/// the canonical `SL` / `TP` / joined-symbol forms the extraction patterns
/// expect.
fn normalize(text: &str) -> String {
    let mut t = text.to_uppercase();

    t = RE_SPACED_USD_QUOTE.replace_all(&t, "${1}USD").into_owned();
    t = RE_SPACED_USD_BASE.replace_all(&t, "USD${1}").into_owned();

    // Label variants. Hyphen/space/joined spellings all collapse to the
    // two-letter labels; TARGET is a TP synonym in the wild.
    for (from, to) in [
        ("STOP LOSS", "SL"),
        ("STOP-LOSS", "SL"),
        ("STOPLOSS", "SL"),
        ("TAKE PROFIT", "TP"),
        ("TAKE-PROFIT", "TP"),
        ("TAKEPROFIT", "TP"),
        ("TARGET", "TP"),
        // Decorative ".. Gold" suffix after an explicit symbol
        // ("Buy XAUUSD .. Gold now"); a bare "GOLD" elsewhere survives and
        // resolves through the alias table.
        ("..GOLD", ""),
        (".. GOLD", ""),
    ] {
        t = t.replace(from, to);
    }

    t
}

/// Pull the labelled price out of normalised text. A label whose value fails
/// to parse downgrades that field to absent rather than failing the whole
/// extraction.
fn extract_price(normalized: &str, re: &Regex) -> Option<f64> {
    let cap = re.captures(normalized)?;
    let raw = cap[1].replace(',', "");
    match raw.parse::<f64>() {
        Ok(v) => Some(v),
        Err(_) => {
            warn!(value = %&cap[1], "Labelled price failed to parse — field dropped");
            None
        }
    }
}

fn extract_action(normalized: &str) -> Option<TradeAction> {
    if RE_BUY.is_match(normalized) {
        return Some(TradeAction::Buy);
    }
    if RE_SELL.is_match(normalized) {
        return Some(TradeAction::Sell);
    }
    None
}

// ─── Quick pre-filter ─────────────────────────────────────────────────────────

/// Cheap check whether a message could possibly carry a signal, used before
/// full extraction. False positives are fine (full extraction decides);
/// false negatives are not.
pub fn looks_like_signal(text: &str) -> bool {
    let t = normalize(text);
    extract_action(&t).is_some() || RE_SL.is_match(&t) || RE_TP.is_match(&t) || RE_TP1.is_match(&t)
}

// ─── Extraction ───────────────────────────────────────────────────────────────

/// Parse one message into a [`Fragment`]. Classification never consults
/// correlation state; a reply to a pending entry is still parsed on its own
/// merits first.
pub fn extract(msg: &RawMessage, resolver: &SymbolResolver) -> Fragment {
    if msg.text.is_empty() || !looks_like_signal(&msg.text) {
        return Fragment::no_match(msg.id, msg.channel_id);
    }

    let normalized = normalize(&msg.text);

    let action = extract_action(&normalized);
    let symbol_token = resolver.find_token(&normalized);
    let stop_loss = extract_price(&normalized, &RE_SL);
    let take_profit =
        extract_price(&normalized, &RE_TP1).or_else(|| extract_price(&normalized, &RE_TP));

    let frag = Fragment::classify(
        msg.id,
        msg.channel_id,
        action,
        symbol_token,
        stop_loss,
        take_profit,
    );

    debug!(
        message_id = msg.id,
        channel_id = msg.channel_id,
        kind = ?frag.kind,
        action = ?frag.action,
        token = ?frag.symbol_token,
        sl = ?frag.stop_loss,
        tp = ?frag.take_profit,
        "📍 Extracted fragment"
    );

    frag
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::FragmentKind;
    use chrono::Utc;

    fn msg(text: &str) -> RawMessage {
        RawMessage {
            id: 1,
            channel_id: 77,
            timestamp: Utc::now(),
            text: text.to_string(),
            reply_to_id: None,
        }
    }

    fn parse(text: &str) -> Fragment {
        extract(&msg(text), &SymbolResolver::with_default_table())
    }

    #[test]
    fn complete_signal_with_filler_and_punctuation() {
        let f = parse("Buy XAUUSD .. Gold now !\nStop loss : 4014.427\nTake profit : 4055.964");
        assert_eq!(f.kind, FragmentKind::Complete);
        assert_eq!(f.action, Some(TradeAction::Buy));
        assert_eq!(f.symbol_token.as_deref(), Some("XAUUSD"));
        assert_eq!(f.stop_loss, Some(4014.427));
        assert_eq!(f.take_profit, Some(4055.964));
    }

    #[test]
    fn entry_only_with_alias_symbol() {
        let f = parse("SELL GOLD NOW");
        assert_eq!(f.kind, FragmentKind::EntryOnly);
        assert_eq!(f.action, Some(TradeAction::Sell));
        assert_eq!(f.symbol_token.as_deref(), Some("GOLD"));
        assert_eq!(f.stop_loss, None);
        assert_eq!(f.take_profit, None);
    }

    #[test]
    fn params_only_compact_labels() {
        let f = parse("TP 2700 SL 2650");
        assert_eq!(f.kind, FragmentKind::ParamsOnly);
        assert_eq!(f.action, None);
        assert_eq!(f.symbol_token, None);
        assert_eq!(f.take_profit, Some(2700.0));
        assert_eq!(f.stop_loss, Some(2650.0));
    }

    #[test]
    fn long_short_synonyms_normalise() {
        assert_eq!(parse("LONG GOLD MARKET").action, Some(TradeAction::Buy));
        assert_eq!(parse("SHORT EURUSD NOW").action, Some(TradeAction::Sell));
    }

    #[test]
    fn label_variants_all_parse() {
        for text in [
            "stoploss 80000 takeprofit 95000",
            "stop-loss 80000 take-profit 95000",
            "Stop Loss: 80,000\nTarget – 95000",
        ] {
            let f = parse(text);
            assert_eq!(f.stop_loss, Some(80000.0), "sl in {text:?}");
            assert_eq!(f.take_profit, Some(95000.0), "tp in {text:?}");
        }
    }

    #[test]
    fn numbered_take_profits_use_tp1() {
        let f = parse("SELL XAUUSD SL 2665 TP1 2645 TP2 2640 TP3 2635");
        assert_eq!(f.take_profit, Some(2645.0));
        assert_eq!(f.stop_loss, Some(2665.0));
    }

    #[test]
    fn comma_thousands_separators() {
        let f = parse("Cobalt SMC\nSELL GOLD NOW\n\nSL - 4,232.37\nTP - 4,205.58");
        assert_eq!(f.kind, FragmentKind::Complete);
        assert_eq!(f.stop_loss, Some(4232.37));
        assert_eq!(f.take_profit, Some(4205.58));
    }

    #[test]
    fn spaced_symbol_joins() {
        let f = parse("Buy xau usd now SL 2640 TP 2660");
        assert_eq!(f.symbol_token.as_deref(), Some("XAUUSD"));
    }

    #[test]
    fn chatter_is_no_match() {
        for text in [
            "I need to teach you guys this my new strategy, it's too good !",
            "React if you're ready to learn",
        ] {
            assert_eq!(parse(text).kind, FragmentKind::NoMatch, "{text:?}");
        }
    }

    #[test]
    fn sl_without_value_downgrades_to_absent() {
        // Label present, value missing: the field drops out, the rest of the
        // extraction survives.
        let f = parse("BUY GOLD NOW SL soon");
        assert_eq!(f.kind, FragmentKind::EntryOnly);
        assert_eq!(f.stop_loss, None);
    }
}
