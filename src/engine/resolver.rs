//! # engine::resolver
//!
//! **Symbol Resolver** — maps human symbol talk (`GOLD`, `CABLE`, `xau usd`)
//! to the broker's canonical symbols (`XAUUSD`, `GBPUSD`).
//!
//! Resolution is pure and side-effect-free: the alias table is built once at
//! startup and read-only afterwards. An unknown token is `Unresolved`, never
//! a crash — it halts that one signal with a classified failure while the
//! rest of the channel keeps flowing.
//!
//! ## Lookup order
//! 1. Exact case-insensitive alias-table hit (`GOLD` → `XAUUSD`)
//! 2. Token used verbatim if it already looks like a canonical symbol
//!    (`EURUSD`, `US30`, amplified indices like `US30_x10`)
//! 3. Amplified-suffix normalisation (`GOLD_x10` → alias base → `XAUUSD`)
//! 4. `Unresolved`

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

// ─── Static patterns ──────────────────────────────────────────────────────────

/// Candidate symbol tokens: 2–10 uppercase alphanumerics, optional `_xN`
/// amplified-index suffix (`US30_x10`, `USTEC_x100`).
static TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Z0-9]{2,10}(?:_[xX]\d+)?)\b").expect("token pattern"));

/// Strips the amplified-index suffix for base lookups.
static AMPLIFIED_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([A-Z0-9]{2,10})_[xX]\d+$").expect("amplified pattern"));

/// Words the token scan must never mistake for a symbol.
const STOPWORDS: &[&str] = &[
    "BUY", "SELL", "LONG", "SHORT", "NOW", "STOP", "LOSS", "TAKE", "PROFIT", "TARGET", "MARKET",
    "SL", "TP", "THE", "AND", "FOR", "WITH", "FROM", "THIS", "THAT", "HAVE", "WILL", "JUST",
    "MESSAGE", "DAY",
];

// ─── Resolution ───────────────────────────────────────────────────────────────

/// Outcome of one resolution attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Official broker symbol, ready for dispatch.
    Canonical(String),
    /// No mapping found. Classified failure, not an error.
    Unresolved,
}

// ─── SymbolResolver ───────────────────────────────────────────────────────────

/// Alias-table backed resolver. Built once, then shared read-only.
pub struct SymbolResolver {
    lookup: HashMap<String, String>,
    /// Valid broker symbols too short for the length heuristic (indices).
    known_short: HashSet<String>,
}

impl SymbolResolver {
    /// Build from an explicit alias table (tests inject small ones here).
    pub fn from_table<'a>(
        pairs: impl IntoIterator<Item = (&'a str, &'a str)>,
        known_short: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let lookup = pairs
            .into_iter()
            .map(|(a, c)| (a.to_uppercase(), c.to_uppercase()))
            .collect();
        let known_short = known_short.into_iter().map(|s| s.to_uppercase()).collect();
        Self {
            lookup,
            known_short,
        }
    }

    /// The full production table: metals, forex nicknames, majors, crypto,
    /// energies and indices.
    pub fn with_default_table() -> Self {
        Self::from_table(DEFAULT_ALIASES.iter().copied(), KNOWN_SHORT.iter().copied())
    }

    /// Scan normalised (uppercased) text for the first plausible symbol
    /// token. Returns the token *as found* — `"GOLD"` stays `"GOLD"` until
    /// [`resolve`](Self::resolve) maps it.
    pub fn find_token(&self, normalized: &str) -> Option<String> {
        // Pass 1: alias words win over bare pattern matches. Amplified
        // variants of an alias (`GOLD_x10`) count as alias hits too.
        for cap in TOKEN_RE.captures_iter(normalized) {
            let token = &cap[1];
            if self.lookup.contains_key(token) {
                return Some(token.to_string());
            }
            if let Some(base) = AMPLIFIED_RE.captures(token).and_then(|c| c.get(1)) {
                if self.lookup.contains_key(base.as_str()) {
                    return Some(token.to_string());
                }
            }
        }

        // Pass 2: bare tokens that already look like broker symbols. An
        // explicit `_xN` suffix is symbol-shaped on its own; whether it is
        // actually tradable is [`resolve`](Self::resolve)'s call.
        for cap in TOKEN_RE.captures_iter(normalized) {
            let token = &cap[1];
            if STOPWORDS.contains(&token) {
                continue;
            }
            if self.looks_canonical(token) || AMPLIFIED_RE.is_match(token) {
                return Some(token.to_string());
            }
        }

        None
    }

    /// Map a token to its canonical broker symbol.
    pub fn resolve(&self, token: &str) -> Resolution {
        let token = token.trim().to_uppercase();

        // ── 1. Alias table ────────────────────────────────────────────────────
        if let Some(official) = self.lookup.get(&token) {
            debug!(alias = %token, symbol = %official, "🔍 Resolved alias");
            return Resolution::Canonical(official.clone());
        }

        // ── 2. Verbatim canonical ─────────────────────────────────────────────
        if self.looks_canonical(&token) {
            return Resolution::Canonical(token);
        }

        // ── 3. Amplified-suffix normalisation ─────────────────────────────────
        if let Some(cap) = AMPLIFIED_RE.captures(&token) {
            let base = &cap[1];
            if let Some(official) = self.lookup.get(base) {
                debug!(alias = base, symbol = %official, "🔍 Resolved amplified alias base");
                return Resolution::Canonical(official.clone());
            }
            if self.known_short.contains(base) {
                // Amplified variants of known indices are themselves tradable.
                return Resolution::Canonical(token);
            }
        }

        Resolution::Unresolved
    }

    /// Heuristic for "already a broker symbol": a known short index, or a
    /// standard-length pair (6+ chars, at least one letter), optionally with
    /// an amplified suffix.
    fn looks_canonical(&self, token: &str) -> bool {
        if self.known_short.contains(token) {
            return true;
        }
        let base = AMPLIFIED_RE
            .captures(token)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or_else(|| token.to_string());
        if self.known_short.contains(&base) {
            return true;
        }
        (6..=10).contains(&base.len()) && base.chars().any(|c| c.is_ascii_alphabetic())
    }
}

// ─── Default table ────────────────────────────────────────────────────────────

/// Alias → official symbol. Order matters: earlier entries win a scan.
const DEFAULT_ALIASES: &[(&str, &str)] = &[
    // Precious metals
    ("GOLD", "XAUUSD"),
    ("XAU", "XAUUSD"),
    ("SILVER", "XAGUSD"),
    ("XAG", "XAGUSD"),
    ("PLATINUM", "XPTUSD"),
    ("XPT", "XPTUSD"),
    ("PALLADIUM", "XPDUSD"),
    ("XPD", "XPDUSD"),
    // Industrial metals
    ("ALUMINUM", "XALUSD"),
    ("ALUMINIUM", "XALUSD"),
    ("COPPER", "XCUUSD"),
    ("NICKEL", "XNIUSD"),
    ("LEAD", "XPBUSD"),
    ("ZINC", "XZNUSD"),
    // Forex nicknames
    ("FIBER", "EURUSD"),
    ("CABLE", "GBPUSD"),
    ("GOPHER", "USDJPY"),
    ("AUSSIE", "AUDUSD"),
    ("KIWI", "NZDUSD"),
    ("LOONIE", "USDCAD"),
    ("SWISSIE", "USDCHF"),
    // Major pairs
    ("EUR", "EURUSD"),
    ("EURO", "EURUSD"),
    ("GBP", "GBPUSD"),
    ("POUND", "GBPUSD"),
    ("JPY", "USDJPY"),
    ("YEN", "USDJPY"),
    ("AUD", "AUDUSD"),
    ("NZD", "NZDUSD"),
    ("CAD", "USDCAD"),
    ("CHF", "USDCHF"),
    ("FRANC", "USDCHF"),
    // Crypto
    ("BITCOIN", "BTCUSD"),
    ("BTC", "BTCUSD"),
    ("ETHEREUM", "ETHUSD"),
    ("ETH", "ETHUSD"),
    ("LITECOIN", "LTCUSD"),
    ("LTC", "LTCUSD"),
    ("RIPPLE", "XRPUSD"),
    ("XRP", "XRPUSD"),
    ("CARDANO", "ADAUSD"),
    ("ADA", "ADAUSD"),
    ("DOGECOIN", "DOGEUSD"),
    ("DOGE", "DOGEUSD"),
    ("SOLANA", "SOLUSD"),
    ("SOL", "SOLUSD"),
    // Energies
    ("OIL", "USOIL"),
    ("CRUDE", "USOIL"),
    ("WTI", "USOIL"),
    ("BRENT", "UKOIL"),
    ("GAS", "XNGUSD"),
    ("NATGAS", "XNGUSD"),
    ("NATURALGAS", "XNGUSD"),
    // Indices
    ("DOW", "US30"),
    ("DOWJONES", "US30"),
    ("NASDAQ", "USTEC"),
    ("NAS100", "USTEC"),
    ("NAS", "USTEC"),
    ("SPX", "US500"),
    ("SP500", "US500"),
    ("SNP", "US500"),
    ("FTSE", "UK100"),
    ("DAX", "DE30"),
    ("CAC", "FR40"),
    ("NIKKEI", "JP225"),
    ("ASX", "AUS200"),
    ("HANGSENG", "HK50"),
    ("HSI", "HK50"),
    ("STOXX", "STOXX50"),
    ("EUROSTOXX", "STOXX50"),
];

/// Valid symbols shorter than the 6-char heuristic.
const KNOWN_SHORT: &[&str] = &[
    "US30", "US500", "UK100", "DE30", "FR40", "JP225", "HK50", "USTEC", "AUS200", "STOXX50",
    "UKOIL", "USOIL",
];

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> SymbolResolver {
        SymbolResolver::with_default_table()
    }

    #[test]
    fn alias_hits_map_to_official_symbol() {
        assert_eq!(
            resolver().resolve("GOLD"),
            Resolution::Canonical("XAUUSD".into())
        );
        assert_eq!(
            resolver().resolve("cable"),
            Resolution::Canonical("GBPUSD".into())
        );
        assert_eq!(
            resolver().resolve("btc"),
            Resolution::Canonical("BTCUSD".into())
        );
    }

    #[test]
    fn canonical_tokens_pass_through_verbatim() {
        assert_eq!(
            resolver().resolve("EURUSD"),
            Resolution::Canonical("EURUSD".into())
        );
        assert_eq!(
            resolver().resolve("US30"),
            Resolution::Canonical("US30".into())
        );
        assert_eq!(
            resolver().resolve("US30_x10"),
            Resolution::Canonical("US30_X10".into())
        );
    }

    #[test]
    fn unknown_token_is_unresolved_not_a_crash() {
        assert_eq!(resolver().resolve("NONEXISTENT"), Resolution::Unresolved);
        assert_eq!(resolver().resolve("NONEX"), Resolution::Unresolved);
        assert_eq!(resolver().resolve(""), Resolution::Unresolved);
    }

    #[test]
    fn find_token_prefers_alias_over_bare_pattern() {
        let r = resolver();
        assert_eq!(r.find_token("SELL GOLD NOW"), Some("GOLD".into()));
        assert_eq!(r.find_token("BUY XAUUSD NOW !"), Some("XAUUSD".into()));
        // Stopwords and prices never become symbols.
        assert_eq!(r.find_token("TP 2700 SL 2650"), None);
    }

    #[test]
    fn find_token_accepts_known_short_indices() {
        assert_eq!(resolver().find_token("BUY US30 TODAY"), Some("US30".into()));
    }

    #[test]
    fn amplified_alias_is_found_and_resolves_to_base_symbol() {
        let r = resolver();
        assert_eq!(r.find_token("BUY GOLD_X10 NOW"), Some("GOLD_X10".into()));
        assert_eq!(r.resolve("GOLD_x10"), Resolution::Canonical("XAUUSD".into()));
        // Symbol-shaped but with an unknown base: surfaced as a candidate,
        // rejected at resolution.
        assert_eq!(r.find_token("BUY FOO_X10 NOW"), Some("FOO_X10".into()));
        assert_eq!(r.resolve("FOO_x10"), Resolution::Unresolved);
    }
}
