use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Market records
// ---------------------------------------------------------------------------

/// One indexed market AA joined with its registered token symbols.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketRecord {
    pub aa_address: String,
    pub oracle: Option<String>,
    pub reserve_asset: Option<String>,
    /// Raw collateral amount in smallest units.
    pub reserve: i64,
    pub reserve_decimals: u32,
    /// Settlement timestamp (unix seconds).
    pub event_date: i64,
    /// `championship_yesTeam_noTeam_date` for sport markets.
    pub feed_name: Option<String>,
    pub created_at: i64,
    /// Set exactly once, when settlement is committed on-chain.
    pub committed_at: Option<i64>,
    /// Payout coefficient; 1 = unsettled.
    pub coef: f64,
    pub issue_fee: f64,
    pub allow_draw: bool,
    pub yes_symbol: Option<String>,
    pub no_symbol: Option<String>,
    pub draw_symbol: Option<String>,
}

/// Live state read from the market AA itself.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarketInfo {
    pub yes_price: Option<f64>,
    pub no_price: Option<f64>,
    pub draw_price: Option<f64>,
    pub supply_yes: Option<i64>,
    pub supply_no: Option<i64>,
    pub supply_draw: Option<i64>,
}

/// A listing row after enrichment. Every optional field's absence is the
/// defined "unknown" state — never conflated with zero.
#[derive(Debug, Clone, Serialize)]
pub struct EnrichedMarket {
    #[serde(flatten)]
    pub market: MarketRecord,
    pub yes_team_id: Option<String>,
    pub yes_team: Option<String>,
    pub no_team_id: Option<String>,
    pub no_team: Option<String>,
    pub league: Option<String>,
    pub league_emblem: Option<String>,
    #[serde(flatten)]
    pub info: MarketInfo,
    /// Last 24 hourly yes-side closes, oldest first. None = fetch failed.
    pub candles: Option<Vec<f64>>,
    pub apy: f64,
}

impl EnrichedMarket {
    pub fn from_record(market: MarketRecord) -> Self {
        Self {
            market,
            yes_team_id: None,
            yes_team: None,
            no_team_id: None,
            no_team: None,
            league: None,
            league_emblem: None,
            info: MarketInfo::default(),
            candles: None,
            apy: 0.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Listing filter
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarketType {
    /// Oracle is one of the configured currency oracles.
    Currency,
    /// Oracle is the sport oracle.
    Soccer,
    /// Everything else.
    Misc,
}

impl std::fmt::Display for MarketType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            MarketType::Currency => "currency",
            MarketType::Soccer => "soccer",
            MarketType::Misc => "misc",
        };
        write!(f, "{s}")
    }
}

// ---------------------------------------------------------------------------
// Sport metadata
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChampionshipInfo {
    pub name: String,
    pub emblem: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    pub id: String,
    pub name: String,
}
