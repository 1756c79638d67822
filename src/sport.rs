use std::collections::HashMap;
use std::time::Duration;

use serde::Deserialize;
use tracing::{info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::types::{ChampionshipInfo, TeamInfo};

/// One entry of the abbreviation table: team id → short code + display name.
#[derive(Debug, Clone, Deserialize)]
pub struct AbbreviationEntry {
    pub abbreviation: String,
    pub name: String,
}

/// Read-only sport metadata: championship catalog and team abbreviations.
///
/// The abbreviation table ships with the repo; the championship catalog is
/// fetched once at init from the sport data provider and failures there leave
/// an empty catalog rather than blocking startup.
pub struct SportDataService {
    /// sport → championship code → info.
    championships: HashMap<String, HashMap<String, ChampionshipInfo>>,
    /// sport → team id → abbreviation entry.
    abbreviations: HashMap<String, HashMap<String, AbbreviationEntry>>,
}

#[derive(Debug, Deserialize)]
struct CompetitionsResponse {
    competitions: Vec<Competition>,
}

#[derive(Debug, Deserialize)]
struct Competition {
    code: Option<String>,
    name: String,
    emblem: Option<String>,
}

impl SportDataService {
    pub async fn init(cfg: &Config) -> Result<Self> {
        let abbreviations = load_abbreviations(&cfg.abbreviations_path)?;

        let mut championships = HashMap::new();
        if cfg.sport_api_key.is_empty() {
            warn!("SPORT_API_KEY not set — championship metadata disabled");
        } else {
            match fetch_soccer_catalog(cfg).await {
                Ok(catalog) => {
                    info!(competitions = catalog.len(), "championship catalog loaded");
                    championships.insert("soccer".to_string(), catalog);
                }
                Err(e) => warn!("championship catalog fetch failed: {e}"),
            }
        }

        Ok(Self { championships, abbreviations })
    }

    pub fn from_parts(
        championships: HashMap<String, HashMap<String, ChampionshipInfo>>,
        abbreviations: HashMap<String, HashMap<String, AbbreviationEntry>>,
    ) -> Self {
        Self { championships, abbreviations }
    }

    /// Championship metadata, case-insensitive on the code. None = unknown.
    pub fn championship_info(&self, sport: &str, code: &str) -> Option<ChampionshipInfo> {
        let catalog = self.championships.get(sport)?;
        catalog
            .iter()
            .find(|(c, _)| c.eq_ignore_ascii_case(code))
            .map(|(_, info)| info.clone())
    }

    /// Resolve a team's short code to its id and display name.
    pub fn resolve_team(&self, sport: &str, abbreviation: &str) -> Option<TeamInfo> {
        let table = self.abbreviations.get(sport)?;
        table
            .iter()
            .find(|(_, entry)| entry.abbreviation == abbreviation)
            .map(|(id, entry)| TeamInfo { id: id.clone(), name: entry.name.clone() })
    }
}

fn load_abbreviations(
    path: &str,
) -> Result<HashMap<String, HashMap<String, AbbreviationEntry>>> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

async fn fetch_soccer_catalog(cfg: &Config) -> Result<HashMap<String, ChampionshipInfo>> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()?;
    let resp: CompetitionsResponse = client
        .get(format!("{}/competitions", cfg.sport_api_url))
        .header("X-Auth-Token", &cfg.sport_api_key)
        .send()
        .await?
        .json()
        .await?;

    Ok(resp
        .competitions
        .into_iter()
        .filter_map(|c| {
            let code = c.code?;
            Some((code, ChampionshipInfo { name: c.name, emblem: c.emblem }))
        })
        .collect())
}
