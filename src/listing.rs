use std::collections::HashMap;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::error;

use crate::config::SECONDS_PER_YEAR;
use crate::db::{IndexStore, MarketFilter};
use crate::enrich::EnrichmentResolver;
use crate::rates::{PriceProvider, RateCache};
use crate::types::{EnrichedMarket, MarketType};

#[derive(Debug, Serialize)]
pub struct ListingPage {
    pub data: Vec<EnrichedMarket>,
    pub max_count: usize,
}

impl ListingPage {
    fn empty() -> Self {
        Self { data: Vec::new(), max_count: 0 }
    }
}

/// Assembles the sorted, paginated, enriched market listing for one request.
///
/// Degrades instead of failing: a store error yields an empty page, a missing
/// USD rate ranks that market last among active ones, and all enrichment
/// failures are already absorbed per-row by the resolver.
pub struct ListingAggregator {
    store: IndexStore,
    resolver: EnrichmentResolver,
    rates: Arc<RateCache>,
    provider: Arc<dyn PriceProvider>,
    page_limit: usize,
}

impl ListingAggregator {
    pub fn new(
        store: IndexStore,
        resolver: EnrichmentResolver,
        rates: Arc<RateCache>,
        provider: Arc<dyn PriceProvider>,
        page_limit: usize,
    ) -> Self {
        Self { store, resolver, rates, provider, page_limit }
    }

    pub async fn list(
        &self,
        market_type: Option<MarketType>,
        championship: Option<String>,
        page: usize,
    ) -> ListingPage {
        let page = page.max(1);
        let filter = MarketFilter { market_type, championship };

        let records = match self.store.markets_by_filter(&filter).await {
            Ok(rows) => rows,
            Err(e) => {
                error!("listing query failed: {e}");
                return ListingPage::empty();
            }
        };
        let max_count = records.len();

        let rows = self.resolver.enrich_all(records).await;
        let usd_rates = self.rates.get_rates(self.provider.as_ref()).await;
        let now = now_secs();

        let (mut active, mut past): (Vec<_>, Vec<_>) =
            rows.into_iter().partition(|row| row.market.event_date > now);

        // Richest live market first; settled markets by recency.
        active.sort_by(|a, b| {
            usd_reserve_value(b, &usd_rates).total_cmp(&usd_reserve_value(a, &usd_rates))
        });
        past.sort_by(|a, b| b.market.event_date.cmp(&a.market.event_date));

        let offset = (page - 1) * self.page_limit;
        let data = active
            .into_iter()
            .chain(past)
            .skip(offset)
            .take(self.page_limit)
            .map(|mut row| {
                row.apy = compute_apy(
                    row.market.coef,
                    row.market.issue_fee,
                    row.market.created_at,
                    row.market.committed_at,
                    now,
                );
                row
            })
            .collect();

        ListingPage { data, max_count }
    }
}

/// USD-equivalent collateral value; the ranking signal for active markets.
/// A market whose reserve asset has no known rate values at 0.
pub fn usd_reserve_value(row: &EnrichedMarket, rates: &HashMap<String, f64>) -> f64 {
    let rate = row
        .market
        .reserve_asset
        .as_deref()
        .and_then(|asset| rates.get(asset).copied())
        .unwrap_or(0.0);
    row.market.reserve as f64 / 10f64.powi(row.market.reserve_decimals as i32) * rate
}

/// Annualized yield from the realized payout coefficient.
///
/// `coef == 1` means the market has not resolved with a non-trivial payout;
/// zero or negative elapsed time would make the exponent undefined. Both
/// cases yield 0 rather than NaN.
pub fn compute_apy(
    coef: f64,
    issue_fee: f64,
    created_at: i64,
    committed_at: Option<i64>,
    now: i64,
) -> f64 {
    if coef == 1.0 {
        return 0.0;
    }
    let elapsed = committed_at.unwrap_or(now) - created_at;
    if elapsed <= 0 {
        return 0.0;
    }
    let apy = ((coef * (1.0 - issue_fee)).powf(SECONDS_PER_YEAR as f64 / elapsed as f64) - 1.0) * 100.0;
    if apy.is_finite() {
        (apy * 100.0).round() / 100.0
    } else {
        0.0
    }
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
