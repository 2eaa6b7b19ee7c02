//! Admin API route handlers.
//!
//! All endpoints return JSON. State is shared via `Arc<AdminState>`.
//! Mutating endpoints require the `x-admin-token` header when a token
//! is configured.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::service::{AdminService, Toggle};
use crate::config::{Band, MarketSettings};
use crate::types::{BotError, Bucket, MarketId, Quality, TraderId};

/// Header carrying the admin token.
pub const TOKEN_HEADER: &str = "x-admin-token";

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

pub struct AdminState {
    pub service: AdminService,
    pub token: Option<String>,
}

pub type AppState = Arc<AdminState>;

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum ApiError {
    Unauthorized,
    BadRequest(String),
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        match err.downcast_ref::<BotError>() {
            Some(BotError::Validation(_)) | Some(BotError::UnknownMarket(_)) => {
                ApiError::BadRequest(err.to_string())
            }
            _ => ApiError::Internal(format!("{err:#}")),
        }
    }
}

impl From<BotError> for ApiError {
    fn from(err: BotError) -> Self {
        ApiError::from(anyhow::Error::from(err))
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error) = match self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "missing or invalid admin token".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(ErrorBody { error })).into_response()
    }
}

type ApiResult<T> = Result<Json<T>, ApiError>;

fn authorize(state: &AdminState, headers: &HeaderMap) -> Result<(), ApiError> {
    let Some(expected) = state.token.as_deref() else {
        return Ok(());
    };
    match headers.get(TOKEN_HEADER).and_then(|v| v.to_str().ok()) {
        Some(given) if given == expected => Ok(()),
        _ => Err(ApiError::Unauthorized),
    }
}

fn parse_market(raw: &str) -> Result<MarketId, ApiError> {
    raw.parse::<MarketId>().map_err(ApiError::from)
}

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
pub struct ToggleRequest {
    pub enabled: bool,
}

#[derive(Debug, Deserialize)]
pub struct ItemCountsRequest {
    pub min_items: u32,
    pub max_items: u32,
}

#[derive(Debug, Deserialize)]
pub struct PercentagesRequest {
    pub values: [u32; Bucket::COUNT],
}

#[derive(Debug, Deserialize)]
pub struct BandRequest {
    pub quality: Quality,
    pub min: u32,
    pub max: u32,
}

#[derive(Debug, Deserialize)]
pub struct TierValueRequest {
    pub quality: Quality,
    pub value: u32,
}

#[derive(Debug, Deserialize)]
pub struct ValueRequest {
    pub value: u32,
}

#[derive(Debug, Default, Deserialize)]
pub struct ExpireRequest {
    #[serde(default)]
    pub trader: Option<TraderId>,
}

#[derive(Debug, Serialize)]
pub struct ExpireResponse {
    pub expired: usize,
}

#[derive(Debug, Serialize)]
pub struct Ack {
    pub ok: bool,
}

const ACK: Ack = Ack { ok: true };

// ---------------------------------------------------------------------------
// Route handlers
// ---------------------------------------------------------------------------

/// GET /api/settings
pub async fn get_settings(State(state): State<AppState>) -> Json<BTreeMap<MarketId, MarketSettings>> {
    Json(state.service.snapshot().await)
}

/// GET /api/markets/:market
pub async fn get_market(State(state): State<AppState>, Path(market): Path<String>) -> ApiResult<MarketSettings> {
    let market = parse_market(&market)?;
    Ok(Json(state.service.market(market).await))
}

/// POST /api/toggles/:toggle
pub async fn set_toggle(
    State(state): State<AppState>,
    Path(toggle): Path<Toggle>,
    headers: HeaderMap,
    Json(req): Json<ToggleRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    state.service.set_toggle(toggle, req.enabled).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/items
pub async fn set_item_counts(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ItemCountsRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_item_counts(market, req.min_items, req.max_items).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/percentages
pub async fn set_percentages(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<PercentagesRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_percentages(market, req.values).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/price_band
pub async fn set_price_band(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BandRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state
        .service
        .set_price_band(market, req.quality, Band::new(req.min, req.max))
        .await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/bid_band
pub async fn set_bid_band(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<BandRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state
        .service
        .set_bid_band(market, req.quality, Band::new(req.min, req.max))
        .await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/max_stack
pub async fn set_max_stack(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TierValueRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_max_stack(market, req.quality, req.value).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/buyer_multiplier
pub async fn set_buyer_multiplier(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<TierValueRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_buyer_multiplier(market, req.quality, req.value).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/bid_interval
pub async fn set_bid_interval(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ValueRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_bid_interval(market, req.value).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/bids_per_interval
pub async fn set_bids_per_interval(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ValueRequest>,
) -> ApiResult<Ack> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    state.service.set_bids_per_interval(market, req.value).await?;
    Ok(Json(ACK))
}

/// POST /api/markets/:market/expire
pub async fn expire_listings(
    State(state): State<AppState>,
    Path(market): Path<String>,
    headers: HeaderMap,
    Json(req): Json<ExpireRequest>,
) -> ApiResult<ExpireResponse> {
    authorize(&state, &headers)?;
    let market = parse_market(&market)?;
    let expired = state.service.expire_listings(market, req.trader, Utc::now()).await?;
    Ok(Json(ExpireResponse { expired }))
}

/// GET /health
pub async fn health() -> StatusCode {
    StatusCode::OK
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
