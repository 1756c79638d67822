//! sqlx row types for the listing query.

use crate::types::MarketRecord;

#[derive(Debug, sqlx::FromRow)]
pub struct MarketRow {
    pub aa_address: String,
    pub oracle: Option<String>,
    pub reserve_asset: Option<String>,
    pub reserve: i64,
    pub reserve_decimals: i64,
    pub event_date: i64,
    pub feed_name: Option<String>,
    pub created_at: i64,
    pub committed_at: Option<i64>,
    pub coef: f64,
    pub issue_fee: f64,
    pub allow_draw: i64,
    pub yes_symbol: Option<String>,
    pub no_symbol: Option<String>,
    pub draw_symbol: Option<String>,
}

impl From<MarketRow> for MarketRecord {
    fn from(r: MarketRow) -> Self {
        MarketRecord {
            aa_address: r.aa_address,
            oracle: r.oracle,
            reserve_asset: r.reserve_asset,
            reserve: r.reserve,
            reserve_decimals: r.reserve_decimals.max(0) as u32,
            event_date: r.event_date,
            feed_name: r.feed_name,
            created_at: r.created_at,
            committed_at: r.committed_at,
            coef: r.coef,
            issue_fee: r.issue_fee,
            allow_draw: r.allow_draw != 0,
            yes_symbol: r.yes_symbol,
            no_symbol: r.no_symbol,
            draw_symbol: r.draw_symbol,
        }
    }
}
