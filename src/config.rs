use std::collections::HashMap;

use crate::error::{AppError, Result};

pub const HUB_WS_URL: &str = "wss://obyte.org/bb";
pub const RATE_API_URL: &str = "https://min-api.cryptocompare.com";
pub const SPORT_API_URL: &str = "https://api.football-data.org/v4";

/// Factory AA whose state vars enumerate every deployed market AA.
pub const FACTORY_AA: &str = "ZPOO7GQ6X4L7STBRSI4PVLEYEAYQ6CZE";

/// State-var prefix the factory writes for each deployed market.
pub const FACTORY_VAR_PREFIX: &str = "prediction_";

pub const SPORT_ORACLE: &str = "TKT4UESIKTTRALRRLWS4SENSTJX6ODCW";
pub const CURRENCY_ORACLES: &[&str] = &["F4KHJUCLJKY4JV7M5F754LAJX4EB7M4N"];

/// Markets shown per listing page.
pub const PAGE_LIMIT: usize = 5;

/// USD rate cache time-to-live.
pub const RATE_CACHE_TTL_SECS: u64 = 1800;

/// Hourly candles returned per market on the listing page.
pub const CANDLE_LIMIT: u32 = 24;

/// Upper bound on in-flight per-market enrichment fetches for one request.
pub const ENRICH_CONCURRENCY: usize = 16;

pub const SECONDS_PER_YEAR: u64 = 31_536_000;

/// Hub reconnect backoff values in milliseconds.
pub const RECONNECT_BACKOFF_MS: &[u64] = &[1_000, 2_000, 4_000, 8_000, 16_000];

/// Hub heartbeat interval (seconds).
pub const HUB_HEARTBEAT_SECS: u64 = 30;

/// Hub request timeout (seconds) — a response frame must arrive within this.
pub const HUB_REQUEST_TIMEOUT_SECS: u64 = 60;

/// One collateral asset markets may be denominated in.
#[derive(Debug, Clone, serde::Serialize)]
pub struct ReserveAsset {
    pub symbol: String,
    pub decimals: u32,
}

/// Mainnet reserve assets accepted for listing. Keyed by on-chain asset id.
fn default_reserve_assets() -> HashMap<String, ReserveAsset> {
    HashMap::from([
        (
            "base".to_string(),
            ReserveAsset { symbol: "GBYTE".to_string(), decimals: 9 },
        ),
        (
            "S/oCESzEO8G2hvQuI6HsyPr0foLfKwzs+GU73nO9H40=".to_string(),
            ReserveAsset { symbol: "USDC".to_string(), decimals: 4 },
        ),
    ])
}

#[derive(Debug, Clone)]
pub struct Config {
    pub hub_ws_url: String,
    pub rate_api_url: String,
    pub sport_api_url: String,
    /// API token for the sport data provider (SPORT_API_KEY). Empty disables
    /// the championship catalog; team abbreviations still resolve.
    pub sport_api_key: String,
    pub log_level: String,
    pub db_path: String,
    pub api_port: u16,
    pub factory_aa: String,
    pub sport_oracle: String,
    pub currency_oracles: Vec<String>,
    /// asset id → symbol/decimals for every reserve asset eligible for listing.
    pub reserve_assets: HashMap<String, ReserveAsset>,
    /// Path to the team abbreviation table (ABBREVIATIONS_PATH).
    pub abbreviations_path: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            hub_ws_url: std::env::var("HUB_WS_URL").unwrap_or_else(|_| HUB_WS_URL.to_string()),
            rate_api_url: std::env::var("RATE_API_URL")
                .unwrap_or_else(|_| RATE_API_URL.to_string()),
            sport_api_url: std::env::var("SPORT_API_URL")
                .unwrap_or_else(|_| SPORT_API_URL.to_string()),
            sport_api_key: std::env::var("SPORT_API_KEY").unwrap_or_default(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            db_path: std::env::var("DB_PATH").unwrap_or_else(|_| "markets.db".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "3001".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            factory_aa: std::env::var("FACTORY_AA").unwrap_or_else(|_| FACTORY_AA.to_string()),
            sport_oracle: std::env::var("SPORT_ORACLE")
                .unwrap_or_else(|_| SPORT_ORACLE.to_string()),
            currency_oracles: std::env::var("CURRENCY_ORACLES")
                .map(|s| {
                    s.split(',')
                        .map(|s| s.trim().to_string())
                        .filter(|s| !s.is_empty())
                        .collect()
                })
                .unwrap_or_else(|_| CURRENCY_ORACLES.iter().map(|s| s.to_string()).collect()),
            reserve_assets: default_reserve_assets(),
            abbreviations_path: std::env::var("ABBREVIATIONS_PATH")
                .unwrap_or_else(|_| "data/abbreviations.json".to_string()),
        })
    }

    /// Symbols of all supported reserve assets, for the batched rate request.
    pub fn reserve_symbols(&self) -> Vec<String> {
        self.reserve_assets.values().map(|a| a.symbol.clone()).collect()
    }
}
