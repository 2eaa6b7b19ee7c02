//! Admin surface: Axum web server over `AdminService`.
//!
//! Exposes the live market settings as JSON and accepts validated
//! changes. CORS enabled for local tooling.

pub mod routes;
pub mod service;

use anyhow::{Context, Result};
use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use routes::AppState;

/// Start the admin web server.
///
/// Binds before returning so a taken port fails startup; serving runs
/// in a background task.
pub async fn spawn_admin(state: AppState, port: u16) -> Result<()> {
    let app = build_router(state);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind admin port {port}"))?;
    info!(port, "Admin server listening on http://localhost:{port}");

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "Admin server error");
        }
    });

    Ok(())
}

/// Build the Axum router with all routes and middleware.
pub fn build_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(HeaderValue::from_static("*"))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, HeaderName::from_static(routes::TOKEN_HEADER)]);

    Router::new()
        .route("/api/settings", get(routes::get_settings))
        .route("/api/markets/:market", get(routes::get_market))
        .route("/api/toggles/:toggle", post(routes::set_toggle))
        .route("/api/markets/:market/items", post(routes::set_item_counts))
        .route("/api/markets/:market/percentages", post(routes::set_percentages))
        .route("/api/markets/:market/price_band", post(routes::set_price_band))
        .route("/api/markets/:market/bid_band", post(routes::set_bid_band))
        .route("/api/markets/:market/max_stack", post(routes::set_max_stack))
        .route("/api/markets/:market/buyer_multiplier", post(routes::set_buyer_multiplier))
        .route("/api/markets/:market/bid_interval", post(routes::set_bid_interval))
        .route("/api/markets/:market/bids_per_interval", post(routes::set_bids_per_interval))
        .route("/api/markets/:market/expire", post(routes::expire_listings))
        .route("/health", get(routes::health))
        .layer(cors)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
