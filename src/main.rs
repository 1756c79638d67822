mod api;
mod config;
mod db;
mod discovery;
mod enrich;
mod error;
mod hub;
mod listing;
mod rates;
mod sport;
mod types;

use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::api::routes::{router, ApiState};
use crate::config::{Config, PAGE_LIMIT, RATE_CACHE_TTL_SECS};
use crate::db::IndexStore;
use crate::discovery::DiscoveryService;
use crate::enrich::EnrichmentResolver;
use crate::error::Result;
use crate::hub::{ChainClient, HubChain, HubClient};
use crate::listing::ListingAggregator;
use crate::rates::{CryptoCompareProvider, RateCache};
use crate::sport::SportDataService;

#[tokio::main]
async fn main() {
    let cfg = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {e}");
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(&cfg.log_level))
        .init();

    if let Err(e) = run(cfg).await {
        error!("Fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run(cfg: Config) -> Result<()> {
    // --- Database setup ---
    let pool = SqlitePoolOptions::new()
        .connect_with(SqliteConnectOptions::new().filename(&cfg.db_path).create_if_missing(true))
        .await?;
    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database ready at {}", cfg.db_path);

    let store = IndexStore::new(
        pool.clone(),
        cfg.sport_oracle.clone(),
        cfg.currency_oracles.clone(),
        cfg.reserve_assets.keys().cloned().collect(),
    );

    // --- Hub connection ---
    let hub = Arc::new(HubClient::new(cfg.hub_ws_url.clone()));
    let status_rx = hub.subscribe_status();
    {
        let hub = Arc::clone(&hub);
        tokio::spawn(async move { hub.run().await });
    }
    let chain: Arc<dyn ChainClient> = Arc::new(HubChain::new(Arc::clone(&hub), pool.clone()));

    // --- Discovery: one pass per hub connection generation ---
    let discovery = DiscoveryService::new(Arc::clone(&chain), store.clone(), cfg.factory_aa.clone());
    tokio::spawn(async move { discovery.run(status_rx).await });

    // --- Sport metadata (catalog fetch failure is non-fatal) ---
    let sport = Arc::new(SportDataService::init(&cfg).await?);

    // --- Listing pipeline ---
    let rates = Arc::new(RateCache::new(&cfg, Duration::from_secs(RATE_CACHE_TTL_SECS)));
    let provider = Arc::new(CryptoCompareProvider::new(cfg.rate_api_url.clone())?);
    let resolver = EnrichmentResolver::new(Arc::clone(&chain), sport, cfg.sport_oracle.clone());
    let aggregator = Arc::new(ListingAggregator::new(
        store,
        resolver,
        rates,
        provider,
        PAGE_LIMIT,
    ));

    // --- HTTP API server ---
    let api_state = ApiState {
        aggregator,
        reserve_assets: Arc::new(cfg.reserve_assets.clone()),
    };
    let app = router(api_state);
    let bind_addr = format!("0.0.0.0:{}", cfg.api_port);
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("HTTP API listening on {bind_addr}");

    axum::serve(listener, app).await?;

    Ok(())
}
