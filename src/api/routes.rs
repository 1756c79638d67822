use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;
use tower_http::cors::CorsLayer;

use crate::config::ReserveAsset;
use crate::listing::{ListingAggregator, ListingPage};
use crate::types::MarketType;

#[derive(Clone)]
pub struct ApiState {
    pub aggregator: Arc<ListingAggregator>,
    pub reserve_assets: Arc<HashMap<String, ReserveAsset>>,
}

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/markets", get(get_markets))
        .route("/api/markets/:page", get(get_markets_page))
        .route("/api/reserve_assets", get(get_reserve_assets))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

#[derive(Deserialize)]
pub struct MarketsQuery {
    #[serde(rename = "type")]
    pub market_type: Option<String>,
    pub championship: Option<String>,
}

async fn get_markets(
    State(state): State<ApiState>,
    Query(params): Query<MarketsQuery>,
) -> Json<ListingPage> {
    serve_listing(&state, params, None).await
}

async fn get_markets_page(
    State(state): State<ApiState>,
    Path(page): Path<String>,
    Query(params): Query<MarketsQuery>,
) -> Json<ListingPage> {
    serve_listing(&state, params, Some(page)).await
}

async fn serve_listing(state: &ApiState, params: MarketsQuery, page: Option<String>) -> Json<ListingPage> {
    let page = sanitize_page(page.as_deref());
    let market_type = params.market_type.as_deref().and_then(parse_market_type);
    let championship = params
        .championship
        .map(|c| sanitize_championship(&c))
        .filter(|c| !c.is_empty());

    Json(state.aggregator.list(market_type, championship, page).await)
}

async fn get_reserve_assets(
    State(state): State<ApiState>,
) -> Json<HashMap<String, ReserveAsset>> {
    Json(state.reserve_assets.as_ref().clone())
}

/// Unknown type strings mean "no oracle restriction", never an error.
fn parse_market_type(s: &str) -> Option<MarketType> {
    match s {
        "currency" => Some(MarketType::Currency),
        "soccer" => Some(MarketType::Soccer),
        "misc" => Some(MarketType::Misc),
        _ => None,
    }
}

/// Non-positive or unparseable page values fall back to page 1.
fn sanitize_page(raw: Option<&str>) -> usize {
    raw.and_then(|s| s.parse::<i64>().ok())
        .filter(|&p| p > 0)
        .map(|p| p as usize)
        .unwrap_or(1)
}

/// Championship codes are alphanumeric; strip anything else from user input.
fn sanitize_championship(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_alphanumeric()).collect()
}
