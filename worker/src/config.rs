//! Environment-driven configuration.
//!
//! Every knob has a default except the tracked markets: a pool address and
//! its two pool tokens must be configured explicitly, since the upstream
//! API has no way to resolve pool tokens for us.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use engine::analytics::AnalyticsCaps;
use engine::cycle::{CycleConfig, MarketSpec};
use engine::preview::PreviewConfig;
use thiserror::Error;
use tracing::info;

pub const DEFAULT_CHAIN_API_BASE: &str = "https://eth-sepolia.blockscout.com/api/v2";
pub const DEFAULT_EXPLORER_BASE: &str = "https://sepolia.etherscan.io";
/// Sepolia.
pub const DEFAULT_CHAIN_ID: u64 = 11_155_111;
pub const DEFAULT_STORAGE_ENDPOINT: &str = "https://node.lighthouse.storage";
pub const DEFAULT_STORAGE_GATEWAY: &str = "https://gateway.lighthouse.storage/ipfs";
pub const DEFAULT_STORAGE_ACCESS_CHAIN: &str = "Sepolia";
/// One whole token at 18 decimals.
pub const DEFAULT_STORAGE_ACCESS_MIN_BALANCE_WEI: u128 = 1_000_000_000_000_000_000;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required env var: {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub enabled: bool,
    pub api_key: Option<String>,
    pub endpoint: String,
    pub gateway_base: String,
    pub publish_interval_seconds: u64,
    pub timeout_seconds: u64,
    /// ERC20 contract whose holders may read published objects. Read
    /// gating is skipped entirely when unset.
    pub access_contract: Option<String>,
    pub access_chain: String,
    pub access_min_balance_wei: u128,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub chain_api_base: String,
    pub explorer_base: String,
    pub chain_id: u64,
    /// One or two tracked pools; cross-market signals need exactly two.
    pub markets: Vec<MarketSpec>,
    pub poll_seconds: u64,
    pub window_minutes: u64,
    pub window_size: usize,
    pub max_pages_per_cycle: usize,
    pub preview_rows: usize,
    pub preview_min_new: usize,
    pub dedup_capacity: usize,
    pub reference_price_usd: f64,
    pub delta_cap_percent: f64,
    pub spread_cap_percent: f64,
    pub trend_cap_percent: f64,
    pub data_dir: PathBuf,
    pub http_addr: SocketAddr,
    pub app_env: String,
    pub storage: StorageConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Core loader, fed by any key-value lookup so tests never touch
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let market_a = MarketSpec {
            address: required(&lookup, "MARKET_A")?,
            token0: required(&lookup, "MARKET_A_TOKEN0")?,
            token1: required(&lookup, "MARKET_A_TOKEN1")?,
        };
        let mut markets = vec![market_a];
        if let Some(address) = value(&lookup, "MARKET_B") {
            markets.push(MarketSpec {
                address,
                token0: required(&lookup, "MARKET_B_TOKEN0")?,
                token1: required(&lookup, "MARKET_B_TOKEN1")?,
            });
        }

        Ok(Self {
            chain_api_base: value(&lookup, "CHAIN_API_BASE")
                .unwrap_or_else(|| DEFAULT_CHAIN_API_BASE.to_string()),
            explorer_base: value(&lookup, "EXPLORER_BASE")
                .unwrap_or_else(|| DEFAULT_EXPLORER_BASE.to_string()),
            chain_id: parse(&lookup, "CHAIN_ID", DEFAULT_CHAIN_ID)?,
            markets,
            poll_seconds: parse(&lookup, "POLL_SECONDS", 15)?,
            window_minutes: parse(&lookup, "WINDOW_MINUTES", 60)?,
            window_size: parse(&lookup, "WINDOW_SIZE", 1_000)?,
            max_pages_per_cycle: parse(&lookup, "MAX_PAGES_PER_CYCLE", 10)?,
            preview_rows: parse(&lookup, "PREVIEW_ROWS", 10)?,
            preview_min_new: parse(&lookup, "PREVIEW_MIN_NEW", 2)?,
            dedup_capacity: parse(&lookup, "DEDUP_CAPACITY", 10_000)?,
            reference_price_usd: parse(&lookup, "REFERENCE_PRICE_USD", 2_500.0)?,
            delta_cap_percent: parse(&lookup, "DELTA_CAP_PERCENT", 1_000.0)?,
            spread_cap_percent: parse(&lookup, "SPREAD_CAP_PERCENT", 50.0)?,
            trend_cap_percent: parse(&lookup, "TREND_CAP_PERCENT", 200.0)?,
            data_dir: PathBuf::from(value(&lookup, "DATA_DIR").unwrap_or_else(|| "data".to_string())),
            http_addr: parse_addr(&lookup, "HTTP_ADDR", "127.0.0.1:8080")?,
            app_env: value(&lookup, "APP_ENV").unwrap_or_else(|| "development".to_string()),
            storage: StorageConfig {
                enabled: parse_bool(&lookup, "STORAGE_ENABLE"),
                api_key: value(&lookup, "STORAGE_API_KEY"),
                endpoint: value(&lookup, "STORAGE_ENDPOINT")
                    .unwrap_or_else(|| DEFAULT_STORAGE_ENDPOINT.to_string()),
                gateway_base: value(&lookup, "STORAGE_GATEWAY_BASE")
                    .unwrap_or_else(|| DEFAULT_STORAGE_GATEWAY.to_string()),
                publish_interval_seconds: parse(&lookup, "STORAGE_PUBLISH_INTERVAL_SECONDS", 300)?,
                timeout_seconds: parse(&lookup, "STORAGE_TIMEOUT_SECONDS", 30)?,
                access_contract: value(&lookup, "STORAGE_ACCESS_CONTRACT"),
                access_chain: value(&lookup, "STORAGE_ACCESS_CHAIN")
                    .unwrap_or_else(|| DEFAULT_STORAGE_ACCESS_CHAIN.to_string()),
                access_min_balance_wei: parse(
                    &lookup,
                    "STORAGE_ACCESS_MIN_BALANCE_WEI",
                    DEFAULT_STORAGE_ACCESS_MIN_BALANCE_WEI,
                )?,
            },
        })
    }

    pub fn production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn cycle_config(&self) -> CycleConfig {
        CycleConfig {
            markets: self.markets.clone(),
            window_minutes: self.window_minutes,
            window_size: self.window_size,
            max_pages_per_cycle: self.max_pages_per_cycle,
            explorer_base: self.explorer_base.clone(),
            preview: PreviewConfig {
                rows: self.preview_rows,
                min_new: self.preview_min_new,
                window_minutes: self.window_minutes,
                market_ids: self.markets.iter().map(|m| m.address.clone()).collect(),
                caps: AnalyticsCaps {
                    delta_cap_percent: self.delta_cap_percent,
                    spread_cap_percent: self.spread_cap_percent,
                    trend_cap_percent: self.trend_cap_percent,
                },
                ..PreviewConfig::default()
            },
        }
    }

    /// One-line startup summary. Secrets are reduced to presence flags and
    /// addresses are shortened; safe for any log sink.
    pub fn log_summary(&self) {
        let market_list: Vec<String> =
            self.markets.iter().map(|m| short_addr(&m.address)).collect();
        info!(
            chain_api_base = %self.chain_api_base,
            chain_id = self.chain_id,
            markets = ?market_list,
            poll_seconds = self.poll_seconds,
            window_minutes = self.window_minutes,
            window_size = self.window_size,
            dedup_capacity = self.dedup_capacity,
            data_dir = %self.data_dir.display(),
            http_addr = %self.http_addr,
            storage_enabled = self.storage.enabled,
            storage_api_key_set = self.storage.api_key.is_some(),
            app_env = %self.app_env,
            "configuration loaded"
        );
    }
}

fn value<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &'static str,
) -> Result<String, ConfigError> {
    value(lookup, key).ok_or(ConfigError::Missing(key))
}

fn parse<T, F>(lookup: &F, key: &'static str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    match value(lookup, key) {
        None => Ok(default),
        Some(raw) => raw
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
    }
}

fn parse_addr<F: Fn(&str) -> Option<String>>(
    lookup: &F,
    key: &'static str,
    default: &str,
) -> Result<SocketAddr, ConfigError> {
    let raw = value(lookup, key).unwrap_or_else(|| default.to_string());
    raw.parse()
        .map_err(|_| ConfigError::Invalid { key, value: raw })
}

fn parse_bool<F: Fn(&str) -> Option<String>>(lookup: &F, key: &str) -> bool {
    value(lookup, key).is_some_and(|v| {
        matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on")
    })
}

fn short_addr(addr: &str) -> String {
    match (addr.get(..6), addr.get(addr.len().saturating_sub(4)..)) {
        (Some(head), Some(tail)) if addr.len() > 12 => format!("{head}..{tail}"),
        _ => addr.to_string(),
    }
}
