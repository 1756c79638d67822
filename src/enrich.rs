use std::sync::Arc;

use futures_util::StreamExt;
use tracing::warn;

use crate::config::{CANDLE_LIMIT, ENRICH_CONCURRENCY};
use crate::hub::ChainClient;
use crate::sport::SportDataService;
use crate::types::{EnrichedMarket, MarketRecord};

/// Parsed `championship_yesTeam_noTeam_date` feed name.
#[derive(Debug, PartialEq, Eq)]
pub struct SportFeed<'a> {
    pub championship: &'a str,
    pub yes_team: &'a str,
    pub no_team: &'a str,
    pub date: &'a str,
}

/// Split a sport feed name into its four segments. Anything other than
/// exactly four non-empty segments is not a sport feed.
pub fn parse_feed_name(feed_name: &str) -> Option<SportFeed<'_>> {
    let mut parts = feed_name.split('_');
    let championship = parts.next().filter(|s| !s.is_empty())?;
    let yes_team = parts.next().filter(|s| !s.is_empty())?;
    let no_team = parts.next().filter(|s| !s.is_empty())?;
    let date = parts.next().filter(|s| !s.is_empty())?;
    if parts.next().is_some() {
        return None;
    }
    Some(SportFeed { championship, yes_team, no_team, date })
}

/// Augments raw market rows with sport metadata and live chain-derived fields.
pub struct EnrichmentResolver {
    chain: Arc<dyn ChainClient>,
    sport: Arc<SportDataService>,
    sport_oracle: String,
}

impl EnrichmentResolver {
    pub fn new(chain: Arc<dyn ChainClient>, sport: Arc<SportDataService>, sport_oracle: String) -> Self {
        Self { chain, sport, sport_oracle }
    }

    /// Enrich every row. Rows are independent: a failed fetch for one market
    /// leaves that field absent and touches nothing else. Per-market chain
    /// fetches fan out concurrently, bounded so a large result set cannot
    /// flood the hub.
    pub async fn enrich_all(&self, records: Vec<MarketRecord>) -> Vec<EnrichedMarket> {
        futures_util::stream::iter(records.into_iter().map(|record| self.enrich(record)))
            .buffered(ENRICH_CONCURRENCY)
            .collect::<Vec<_>>()
            .await
    }

    pub async fn enrich(&self, record: MarketRecord) -> EnrichedMarket {
        let mut row = EnrichedMarket::from_record(record);
        self.apply_sport_metadata(&mut row);

        let address = row.market.aa_address.clone();
        let (info, candles) = tokio::join!(
            self.chain.get_market_info(&address),
            self.chain.get_hourly_closes(&address, CANDLE_LIMIT),
        );

        match info {
            Ok(info) => row.info = info,
            Err(e) => warn!(address = %address, "market info fetch failed: {e}"),
        }
        match candles {
            Ok(closes) => row.candles = Some(closes),
            Err(e) => warn!(address = %address, "candle fetch failed: {e}"),
        }

        row
    }

    /// Team/league fields for sport markets. An unparseable feed name or a
    /// missing abbreviation degrades the affected fields only.
    fn apply_sport_metadata(&self, row: &mut EnrichedMarket) {
        if row.market.oracle.as_deref() != Some(self.sport_oracle.as_str()) {
            return;
        }
        let Some(feed_name) = row.market.feed_name.as_deref() else {
            return;
        };
        let Some(feed) = parse_feed_name(feed_name) else {
            return;
        };

        if let Some(team) = self.sport.resolve_team("soccer", feed.yes_team) {
            row.yes_team_id = Some(team.id);
            row.yes_team = Some(team.name);
        }
        if let Some(team) = self.sport.resolve_team("soccer", feed.no_team) {
            row.no_team_id = Some(team.id);
            row.no_team = Some(team.name);
        }

        if let Some(info) = self.sport.championship_info("soccer", feed.championship) {
            row.league = Some(info.name);
            row.league_emblem = info.emblem;
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::collections::{HashMap, HashSet};

    use async_trait::async_trait;
    use serde_json::Value;

    use crate::error::{AppError, Result};
    use crate::hub::ChainClient;
    use crate::types::MarketInfo;

    /// ChainClient returning canned per-address info/candles, with optional
    /// per-address failure injection.
    #[derive(Default)]
    pub struct CannedChain {
        pub infos: HashMap<String, MarketInfo>,
        pub candles: HashMap<String, Vec<f64>>,
        pub fail_info: HashSet<String>,
        pub fail_candles: HashSet<String>,
    }

    #[async_trait]
    impl ChainClient for CannedChain {
        async fn read_state_vars(&self, _address: &str) -> Result<HashMap<String, Value>> {
            Ok(HashMap::new())
        }

        async fn watch_address(&self, _address: &str) -> Result<()> {
            Ok(())
        }

        async fn get_market_info(&self, address: &str) -> Result<MarketInfo> {
            if self.fail_info.contains(address) {
                return Err(AppError::Hub("info unavailable".to_string()));
            }
            Ok(self.infos.get(address).cloned().unwrap_or_default())
        }

        async fn get_hourly_closes(&self, address: &str, _limit: u32) -> Result<Vec<f64>> {
            if self.fail_candles.contains(address) {
                return Err(AppError::Hub("candles unavailable".to_string()));
            }
            Ok(self.candles.get(address).cloned().unwrap_or_default())
        }
    }
}
