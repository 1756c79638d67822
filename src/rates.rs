use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::Result;

/// External quote source: symbol → USD.
#[async_trait]
pub trait PriceProvider: Send + Sync {
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>>;
}

/// CryptoCompare `pricemulti` batch endpoint.
pub struct CryptoCompareProvider {
    client: reqwest::Client,
    base_url: String,
}

impl CryptoCompareProvider {
    pub fn new(base_url: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl PriceProvider for CryptoCompareProvider {
    async fn get_prices(&self, symbols: &[String]) -> Result<HashMap<String, f64>> {
        let url = format!(
            "{}/data/pricemulti?fsyms={}&tsyms=USD",
            self.base_url,
            symbols.join(",")
        );
        let resp: serde_json::Value = self.client.get(&url).send().await?.json().await?;

        let mut prices = HashMap::new();
        if let Some(obj) = resp.as_object() {
            for (symbol, quotes) in obj {
                if let Some(usd) = quotes.get("USD").and_then(|v| v.as_f64()) {
                    prices.insert(symbol.clone(), usd);
                }
            }
        }
        Ok(prices)
    }
}

#[derive(Default)]
struct CacheState {
    /// reserve-asset id → USD price.
    data: HashMap<String, f64>,
    last_update_ms: u64,
}

/// Time-bounded cache of reserve-asset USD rates, shared across requests.
///
/// Availability over freshness: a provider failure keeps serving the previous
/// mapping. The mapping is only ever replaced wholesale, never patched, so
/// readers see either the old or the new set.
pub struct RateCache {
    inner: RwLock<CacheState>,
    /// Serializes refresh attempts so racing stale readers produce one
    /// outbound call, not N.
    refresh_lock: Mutex<()>,
    /// provider symbol → reserve-asset id.
    symbol_to_asset: HashMap<String, String>,
    symbols: Vec<String>,
    ttl: Duration,
}

impl RateCache {
    pub fn new(cfg: &Config, ttl: Duration) -> Self {
        let symbol_to_asset = cfg
            .reserve_assets
            .iter()
            .map(|(id, a)| (a.symbol.clone(), id.clone()))
            .collect();
        Self {
            inner: RwLock::new(CacheState::default()),
            refresh_lock: Mutex::new(()),
            symbol_to_asset,
            symbols: cfg.reserve_symbols(),
            ttl,
        }
    }

    /// Current asset-id → USD mapping, refreshed through `provider` when the
    /// cache is empty or older than the TTL. Never fails: a refresh error
    /// degrades to the previous mapping (possibly empty at process start).
    pub async fn get_rates(&self, provider: &dyn PriceProvider) -> HashMap<String, f64> {
        {
            let state = self.inner.read().await;
            if !state.data.is_empty() && !self.is_stale(&state) {
                return state.data.clone();
            }
        }

        let _guard = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock.
        {
            let state = self.inner.read().await;
            if !state.data.is_empty() && !self.is_stale(&state) {
                return state.data.clone();
            }
        }

        match provider.get_prices(&self.symbols).await {
            Ok(prices) => {
                let data: HashMap<String, f64> = prices
                    .into_iter()
                    .filter_map(|(symbol, usd)| {
                        self.symbol_to_asset.get(&symbol).map(|id| (id.clone(), usd))
                    })
                    .collect();
                debug!(assets = data.len(), "rate cache refreshed");
                let mut state = self.inner.write().await;
                state.data = data.clone();
                state.last_update_ms = now_ms();
                data
            }
            Err(e) => {
                warn!("rate refresh failed, serving previous rates: {e}");
                self.inner.read().await.data.clone()
            }
        }
    }

    fn is_stale(&self, state: &CacheState) -> bool {
        now_ms().saturating_sub(state.last_update_ms) >= self.ttl.as_millis() as u64
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
