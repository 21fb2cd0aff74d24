//! # config
//!
//! Operational parameters, loaded once from the environment at startup.
//! Nothing trade-related is hardcoded in the engine itself — lot size,
//! slippage, magic tag, correlation window and retry policy all arrive
//! through here.
//!
//! | Variable             | Default                 | Meaning                         |
//! |----------------------|-------------------------|---------------------------------|
//! | `LOT_SIZE`           | `0.01`                  | Fixed volume per order          |
//! | `MAX_SLIPPAGE`       | `10`                    | Max slippage (points)           |
//! | `MAGIC_NUMBER`       | `234567`                | Bot-order marker on MT5 side    |
//! | `CORRELATION_TTL_MIN`| `30`                    | Entry/reply matching window     |
//! | `MAX_ATTEMPTS`       | `3`                     | Retry ceiling (transient class) |
//! | `BACKOFF_BASE_MS`    | `500`                   | First retry delay, doubles      |
//! | `TRADING_ENABLED`    | `false`                 | Dry-run unless explicitly on    |
//! | `MT5_BASE_URL`       | `http://localhost:8081` | MT5 bridge (`mock` = simulate)  |

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub lot_size: f64,
    pub max_slippage: u32,
    pub magic_number: u64,
    pub correlation_ttl_min: i64,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub trading_enabled: bool,
    pub mt5_base_url: String,
}

impl EngineConfig {
    pub fn from_env() -> Self {
        Self {
            lot_size: env_f64("LOT_SIZE", 0.01),
            max_slippage: env_u32("MAX_SLIPPAGE", 10),
            magic_number: env_u64("MAGIC_NUMBER", 234_567),
            correlation_ttl_min: env_i64("CORRELATION_TTL_MIN", 30),
            max_attempts: env_u32("MAX_ATTEMPTS", 3).max(1),
            backoff_base_ms: env_u64("BACKOFF_BASE_MS", 500),
            trading_enabled: env_bool("TRADING_ENABLED", false),
            mt5_base_url: std::env::var("MT5_BASE_URL")
                .unwrap_or_else(|_| "http://localhost:8081".to_string()),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lot_size: 0.01,
            max_slippage: 10,
            magic_number: 234_567,
            correlation_ttl_min: 30,
            max_attempts: 3,
            backoff_base_ms: 500,
            trading_enabled: false,
            mt5_base_url: "mock".to_string(),
        }
    }
}

fn env_f64(key: &str, default: f64) -> f64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn env_u32(key: &str, default: u32) -> u32 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn env_u64(key: &str, default: u64) -> u64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn env_i64(key: &str, default: i64) -> i64 {
    std::env::var(key).ok().and_then(|v| v.parse().ok()).unwrap_or(default)
}
fn env_bool(key: &str, default: bool) -> bool {
    std::env::var(key)
        .ok()
        .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(default)
}
