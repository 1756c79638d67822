pub mod connection;
pub mod messages;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::error::{AppError, Result};
use crate::types::MarketInfo;

pub use connection::HubClient;

/// Chain-state collaborator consumed by discovery and enrichment.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Full state-variable map of an AA.
    async fn read_state_vars(&self, address: &str) -> Result<HashMap<String, Value>>;

    /// Register an address for change notifications.
    async fn watch_address(&self, address: &str) -> Result<()>;

    /// Live implied prices and supplies for one market AA.
    async fn get_market_info(&self, address: &str) -> Result<MarketInfo>;

    /// Last `limit` hourly yes-side closes for one market AA, oldest first.
    async fn get_hourly_closes(&self, address: &str, limit: u32) -> Result<Vec<f64>>;
}

/// Production `ChainClient`: state vars and watches go over the hub WS;
/// candles come from the local table the AA response handler maintains.
pub struct HubChain {
    hub: Arc<HubClient>,
    pool: sqlx::SqlitePool,
}

impl HubChain {
    pub fn new(hub: Arc<HubClient>, pool: sqlx::SqlitePool) -> Self {
        Self { hub, pool }
    }
}

#[async_trait]
impl ChainClient for HubChain {
    async fn read_state_vars(&self, address: &str) -> Result<HashMap<String, Value>> {
        let response = self
            .hub
            .request("light/get_aa_state_vars", json!({ "address": address }))
            .await?;
        match response {
            Value::Object(map) => Ok(map.into_iter().collect()),
            other => Err(AppError::Hub(format!(
                "get_aa_state_vars for {address}: expected object, got {other}"
            ))),
        }
    }

    async fn watch_address(&self, address: &str) -> Result<()> {
        self.hub.watch_address(address).await
    }

    async fn get_market_info(&self, address: &str) -> Result<MarketInfo> {
        let vars = self.read_state_vars(address).await?;
        Ok(market_info_from_vars(&vars))
    }

    async fn get_hourly_closes(&self, address: &str, limit: u32) -> Result<Vec<f64>> {
        let rows: Vec<(f64,)> = sqlx::query_as(
            r#"
            SELECT yes_price FROM hourly_candles
            WHERE aa_address = ?
            ORDER BY start_ts DESC
            LIMIT ?
            "#,
        )
        .bind(address)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().rev().map(|(p,)| p).collect())
    }
}

/// Derive implied prices from a market AA's own state.
///
/// Markets issue tokens on a quadratic curve: `reserve = c * Σ supply²`, so the
/// marginal price of side x is `2 * reserve * supply_x / Σ supply²`. Missing or
/// zero supplies leave the corresponding price absent.
pub fn market_info_from_vars(vars: &HashMap<String, Value>) -> MarketInfo {
    let supply_yes = var_as_i64(vars, "supply_yes");
    let supply_no = var_as_i64(vars, "supply_no");
    let supply_draw = var_as_i64(vars, "supply_draw");
    let reserve = var_as_i64(vars, "reserve");

    let sq = |s: Option<i64>| s.map(|v| (v as f64) * (v as f64)).unwrap_or(0.0);
    let denom = sq(supply_yes) + sq(supply_no) + sq(supply_draw);

    let price = |supply: Option<i64>| -> Option<f64> {
        let supply = supply?;
        let reserve = reserve?;
        if denom <= 0.0 {
            return None;
        }
        Some(2.0 * reserve as f64 * supply as f64 / denom)
    };

    MarketInfo {
        yes_price: price(supply_yes),
        no_price: price(supply_no),
        draw_price: price(supply_draw),
        supply_yes,
        supply_no,
        supply_draw,
    }
}

fn var_as_i64(vars: &HashMap<String, Value>, key: &str) -> Option<i64> {
    let v = vars.get(key)?;
    v.as_i64()
        .or_else(|| v.as_f64().map(|f| f as i64))
        .or_else(|| v.as_str().and_then(|s| s.parse().ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn market_info_prices_sum_to_twice_reserve_share() {
        let vars: HashMap<String, Value> = HashMap::from([
            ("supply_yes".to_string(), json!(100)),
            ("supply_no".to_string(), json!(100)),
            ("reserve".to_string(), json!(20_000)),
        ]);
        let info = market_info_from_vars(&vars);
        let yes = info.yes_price.unwrap();
        let no = info.no_price.unwrap();
        assert!((yes - no).abs() < 1e-9, "symmetric supplies price equally");
        assert!(info.draw_price.is_none());
    }

    #[test]
    fn zero_supply_market_has_no_prices() {
        let vars: HashMap<String, Value> = HashMap::from([
            ("supply_yes".to_string(), json!(0)),
            ("supply_no".to_string(), json!(0)),
            ("reserve".to_string(), json!(0)),
        ]);
        let info = market_info_from_vars(&vars);
        assert!(info.yes_price.is_none());
        assert!(info.no_price.is_none());
    }

    #[test]
    fn string_encoded_state_vars_parse() {
        let vars: HashMap<String, Value> = HashMap::from([
            ("supply_yes".to_string(), json!("50")),
            ("supply_no".to_string(), json!("150")),
            ("reserve".to_string(), json!("25000")),
        ]);
        let info = market_info_from_vars(&vars);
        assert_eq!(info.supply_yes, Some(50));
        assert!(info.no_price.unwrap() > info.yes_price.unwrap());
    }
}
