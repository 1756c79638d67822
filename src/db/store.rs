use std::collections::HashSet;

use crate::db::models::MarketRow;
use crate::error::Result;
use crate::types::{MarketRecord, MarketType};

/// Oracle restriction and championship prefix for one listing request.
#[derive(Debug, Clone, Default)]
pub struct MarketFilter {
    pub market_type: Option<MarketType>,
    /// Alphanumeric championship code; case-insensitive prefix match on
    /// `feed_name`. Only meaningful with `MarketType::Soccer`.
    pub championship: Option<String>,
}

/// Persistent index of known markets. Single source of truth for "known":
/// an address missing here is a discovery candidate regardless of what the
/// chain says we already watch.
///
/// The index has two writers: discovery pins new addresses via
/// [`IndexStore::insert_market`], and the AA response handler — a separate
/// process watching the same database — fills in market details, registry
/// symbols ([`IndexStore::update_symbols`]) and the `hourly_candles` table
/// as chain responses replay. This service only reads those back.
#[derive(Clone)]
pub struct IndexStore {
    pool: sqlx::SqlitePool,
    sport_oracle: String,
    currency_oracles: Vec<String>,
    reserve_asset_ids: Vec<String>,
}

impl IndexStore {
    pub fn new(
        pool: sqlx::SqlitePool,
        sport_oracle: String,
        currency_oracles: Vec<String>,
        reserve_asset_ids: Vec<String>,
    ) -> Self {
        Self { pool, sport_oracle, currency_oracles, reserve_asset_ids }
    }

    pub fn pool(&self) -> &sqlx::SqlitePool {
        &self.pool
    }

    /// All indexed market addresses.
    pub async fn known_addresses(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT aa_address FROM markets")
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|(a,)| a).collect())
    }

    /// Register a newly discovered market. The AA response handler fills in
    /// oracle/reserve/feed details once the definition is replayed; until then
    /// the row only pins the address as known.
    pub async fn insert_market(&self, aa_address: &str, created_at: i64) -> Result<()> {
        sqlx::query("INSERT OR IGNORE INTO markets (aa_address, created_at) VALUES (?, ?)")
            .bind(aa_address)
            .bind(created_at)
            .execute(&self.pool)
            .await?;
        sqlx::query("INSERT OR IGNORE INTO market_assets (aa_address) VALUES (?)")
            .bind(aa_address)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Record the registry symbols for a market's tokens. Write surface for
    /// the AA response handler; the listing path only reads symbols through
    /// the eligibility predicate in [`IndexStore::markets_by_filter`].
    pub async fn update_symbols(
        &self,
        aa_address: &str,
        yes_symbol: Option<&str>,
        no_symbol: Option<&str>,
        draw_symbol: Option<&str>,
    ) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO market_assets (aa_address, yes_symbol, no_symbol, draw_symbol)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (aa_address) DO UPDATE SET
                yes_symbol = excluded.yes_symbol,
                no_symbol = excluded.no_symbol,
                draw_symbol = excluded.draw_symbol
            "#,
        )
        .bind(aa_address)
        .bind(yes_symbol)
        .bind(no_symbol)
        .bind(draw_symbol)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// All listing-eligible markets matching the filter, unsorted.
    ///
    /// Eligibility: both yes/no symbols registered, a draw symbol whenever the
    /// market allows draws, and a supported reserve asset.
    pub async fn markets_by_filter(&self, filter: &MarketFilter) -> Result<Vec<MarketRecord>> {
        let mut sql = String::from(
            "SELECT markets.aa_address, oracle, reserve_asset, reserve, reserve_decimals, \
             event_date, feed_name, created_at, committed_at, coef, issue_fee, allow_draw, \
             yes_symbol, no_symbol, draw_symbol \
             FROM markets LEFT JOIN market_assets USING (aa_address) WHERE ",
        );
        let mut binds: Vec<String> = Vec::new();

        match filter.market_type {
            Some(MarketType::Currency) => {
                push_in_clause(&mut sql, &mut binds, "oracle", &self.currency_oracles, false);
                sql.push_str(" AND ");
            }
            Some(MarketType::Soccer) => {
                sql.push_str("oracle = ? AND ");
                binds.push(self.sport_oracle.clone());
                if let Some(champ) = filter.championship.as_deref().filter(|c| !c.is_empty()) {
                    sql.push_str("upper(feed_name) LIKE ? AND ");
                    binds.push(format!("{}%", champ.to_uppercase()));
                }
            }
            Some(MarketType::Misc) => {
                let excluded: Vec<String> = self
                    .currency_oracles
                    .iter()
                    .cloned()
                    .chain(std::iter::once(self.sport_oracle.clone()))
                    .collect();
                push_in_clause(&mut sql, &mut binds, "oracle", &excluded, true);
                sql.push_str(" AND ");
            }
            None => {}
        }

        push_in_clause(&mut sql, &mut binds, "reserve_asset", &self.reserve_asset_ids, false);
        sql.push_str(
            " AND yes_symbol IS NOT NULL AND no_symbol IS NOT NULL \
             AND (allow_draw = 0 OR draw_symbol IS NOT NULL)",
        );

        let mut query = sqlx::query_as::<_, MarketRow>(&sql);
        for bind in binds {
            query = query.bind(bind);
        }
        let rows = query.fetch_all(&self.pool).await?;

        Ok(rows.into_iter().map(MarketRecord::from).collect())
    }
}

/// Append `column IN (?, ...)` (or `NOT IN`) and its binds. An empty value
/// set must keep placeholder and bind counts aligned: plain IN over nothing
/// matches no row, NOT IN over nothing matches every row.
fn push_in_clause(
    sql: &mut String,
    binds: &mut Vec<String>,
    column: &str,
    values: &[String],
    negate: bool,
) {
    if values.is_empty() {
        sql.push_str(if negate { "1=1" } else { "0=1" });
        return;
    }
    let marks = vec!["?"; values.len()].join(",");
    let op = if negate { "NOT IN" } else { "IN" };
    sql.push_str(&format!("{column} {op} ({marks})"));
    binds.extend(values.iter().cloned());
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[tokio::test]
    async fn insert_is_idempotent_and_addresses_become_known() {
        let store = memory_store().await;
        store.insert_market("AA1", 10).await.unwrap();
        store.insert_market("AA1", 99).await.unwrap();
        store.insert_market("AA2", 11).await.unwrap();

        let known = store.known_addresses().await.unwrap();
        assert_eq!(known.len(), 2);
        assert!(known.contains("AA1") && known.contains("AA2"));
    }

    #[tokio::test]
    async fn rows_without_symbols_are_not_listed() {
        let store = memory_store().await;
        store.insert_market("AA1", 10).await.unwrap();
        sqlx::query("UPDATE markets SET oracle = ?, reserve_asset = ? WHERE aa_address = 'AA1'")
            .bind(CURRENCY_ORACLE)
            .bind(RESERVE_BASE)
            .execute(store.pool())
            .await
            .unwrap();

        let rows = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert!(rows.is_empty(), "no symbols registered yet");

        store.update_symbols("AA1", Some("Y"), Some("N"), None).await.unwrap();
        let rows = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn draw_markets_need_a_draw_symbol() {
        let store = memory_store().await;
        seed_market(&store, "AA1", SPORT_ORACLE, RESERVE_BASE, 100, 2000, None, true).await;
        // strip the draw symbol
        store.update_symbols("AA1", Some("Y"), Some("N"), None).await.unwrap();

        let rows = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert!(rows.is_empty());

        store.update_symbols("AA1", Some("Y"), Some("N"), Some("D")).await.unwrap();
        let rows = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].allow_draw);
    }

    #[tokio::test]
    async fn type_filters_partition_by_oracle() {
        let store = memory_store().await;
        seed_market(&store, "CUR", CURRENCY_ORACLE, RESERVE_BASE, 100, 2000, None, false).await;
        seed_market(&store, "SOC", SPORT_ORACLE, RESERVE_BASE, 100, 2000, Some("PL_MCI_ARS_1700000000"), false).await;
        seed_market(&store, "MSC", "SOME_OTHER_ORACLE", RESERVE_BASE, 100, 2000, None, false).await;

        let currency = store
            .markets_by_filter(&MarketFilter { market_type: Some(MarketType::Currency), championship: None })
            .await
            .unwrap();
        assert_eq!(currency.len(), 1);
        assert_eq!(currency[0].aa_address, "CUR");

        let soccer = store
            .markets_by_filter(&MarketFilter { market_type: Some(MarketType::Soccer), championship: None })
            .await
            .unwrap();
        assert_eq!(soccer.len(), 1);
        assert_eq!(soccer[0].aa_address, "SOC");

        let misc = store
            .markets_by_filter(&MarketFilter { market_type: Some(MarketType::Misc), championship: None })
            .await
            .unwrap();
        assert_eq!(misc.len(), 1);
        assert_eq!(misc[0].aa_address, "MSC");

        let all = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert_eq!(all.len(), 3);
    }

    #[tokio::test]
    async fn championship_prefix_is_case_insensitive() {
        let store = memory_store().await;
        seed_market(&store, "M1", SPORT_ORACLE, RESERVE_BASE, 100, 2000, Some("PL_MCI_ARS_1700000000"), false).await;
        seed_market(&store, "M2", SPORT_ORACLE, RESERVE_BASE, 100, 2000, Some("LL_RMA_BAR_1700000000"), false).await;

        let filter = MarketFilter {
            market_type: Some(MarketType::Soccer),
            championship: Some("pl".to_string()),
        };
        let rows = store.markets_by_filter(&filter).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].aa_address, "M1");
    }

    #[tokio::test]
    async fn empty_oracle_sets_keep_binds_aligned() {
        let store = memory_store().await;
        seed_market(&store, "SOC", SPORT_ORACLE, RESERVE_BASE, 100, 2000, None, false).await;
        seed_market(&store, "MSC", "SOME_OTHER_ORACLE", RESERVE_BASE, 100, 2000, None, false).await;

        // same data, but no currency oracles configured
        let no_currency = IndexStore::new(
            store.pool().clone(),
            SPORT_ORACLE.to_string(),
            Vec::new(),
            vec![RESERVE_BASE.to_string(), RESERVE_USDC.to_string()],
        );

        // currency filter over an empty oracle set matches nothing, not an error
        let currency = no_currency
            .markets_by_filter(&MarketFilter { market_type: Some(MarketType::Currency), championship: None })
            .await
            .unwrap();
        assert!(currency.is_empty());

        // misc excludes only the sport oracle
        let misc = no_currency
            .markets_by_filter(&MarketFilter { market_type: Some(MarketType::Misc), championship: None })
            .await
            .unwrap();
        assert_eq!(misc.len(), 1);
        assert_eq!(misc[0].aa_address, "MSC");

        // the unfiltered listing is unaffected
        let all = no_currency.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn unsupported_reserve_assets_are_excluded() {
        let store = memory_store().await;
        seed_market(&store, "OK", CURRENCY_ORACLE, RESERVE_BASE, 100, 2000, None, false).await;
        seed_market(&store, "BAD", CURRENCY_ORACLE, "unknown_asset", 100, 2000, None, false).await;

        let rows = store.markets_by_filter(&MarketFilter::default()).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].aa_address, "OK");
    }
}
