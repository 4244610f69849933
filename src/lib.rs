//! WearUp API Library
//!
//! Fashion marketplace backend: catalog, profiles, social interactions, carts and orders.
#![forbid(unsafe_code)]
#![deny(rust_2018_idioms)]
#![allow(elided_lifetimes_in_paths)]
#![warn(clippy::all, clippy::perf, clippy::dbg_macro)]

// Core modules
pub mod auth;
pub mod config;
pub mod db;
pub mod dto;
pub mod entities;
pub mod errors;
pub mod events;
pub mod handlers;
pub mod media;
pub mod middleware_helpers;
pub mod migrator;
pub mod openapi;
pub mod services;
pub mod tracing;

use axum::{
    extract::{DefaultBodyLimit, FromRef, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use sea_orm::DatabaseConnection;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::mpsc;
use tower::Layer;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    normalize_path::{NormalizePath, NormalizePathLayer},
    services::ServeDir,
};

use crate::auth::{AuthConfig, AuthService};
use crate::events::{Event, EventSender};
use crate::media::MediaStore;

// App state definition
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<DatabaseConnection>,
    pub config: config::AppConfig,
    pub event_sender: Arc<EventSender>,
    pub auth: Arc<AuthService>,
    pub media: Arc<MediaStore>,
    pub services: handlers::AppServices,
}

impl AppState {
    /// Wires services around a connected database. The returned receiver must be
    /// drained (see [`events::process_events`]) or event sends will start failing.
    pub fn new(
        db: Arc<DatabaseConnection>,
        config: config::AppConfig,
    ) -> (Self, mpsc::Receiver<Event>) {
        let (event_tx, event_rx) = mpsc::channel(config.event_channel_capacity);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let media = Arc::new(MediaStore::from_config(&config));
        let auth = Arc::new(AuthService::new(AuthConfig::from(&config), db.clone()));
        let services =
            handlers::AppServices::new(db.clone(), event_sender.clone(), media.clone(), &config);

        let state = Self {
            db,
            config,
            event_sender,
            auth,
            media,
            services,
        };
        (state, event_rx)
    }
}

impl FromRef<AppState> for Arc<AuthService> {
    fn from_ref(state: &AppState) -> Self {
        state.auth.clone()
    }
}

/// Every `/api` resource router.
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/status", get(api_status))
        .nest("/auth", handlers::auth::auth_routes())
        .nest("/users", handlers::users::user_routes())
        .nest("/addresses", handlers::addresses::address_routes())
        // Catalog
        .nest("/products", handlers::commerce::products_routes())
        .merge(handlers::commerce::catalog_routes())
        // Social
        .nest("/product-likes", handlers::social::like_routes())
        .nest("/product-comments", handlers::social::comment_routes())
        .nest("/product-shares", handlers::social::share_routes())
        // Commerce
        .nest("/carts", handlers::commerce::carts_routes())
        .nest("/cart-items", handlers::commerce::cart_items_routes())
        .nest("/orders", handlers::commerce::orders_routes())
        .nest("/order-items", handlers::commerce::order_items_routes())
        .nest("/coupons", handlers::commerce::coupons_routes())
}

/// Builds the CORS layer from configuration: explicit origins when set,
/// otherwise permissive (configuration validation only allows that in
/// development or with the explicit override).
pub fn cors_layer(cfg: &config::AppConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = cfg
        .cors_allowed_origins
        .as_deref()
        .unwrap_or_default()
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect();

    if origins.is_empty() {
        ::tracing::info!("No CORS origins configured; using permissive CORS");
        CorsLayer::permissive()
    } else {
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
            .allow_credentials(cfg.cors_allow_credentials)
    }
}

/// The complete HTTP application. Trailing slashes are trimmed before routing,
/// so `/api/products/` and `/api/products` reach the same handler.
pub fn app(state: AppState) -> NormalizePath<Router> {
    let media_dir = ServeDir::new(state.media.root());
    let media_url = state.config.media_url.clone();
    let body_limit = state.config.max_body_size;
    let cors = cors_layer(&state.config);

    let router = Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_routes())
        .nest_service(&media_url, media_dir)
        .merge(openapi::swagger_ui())
        .layer(DefaultBodyLimit::max(body_limit))
        // HTTP tracing layer for consistent request/response telemetry
        .layer(crate::tracing::configure_http_tracing())
        .layer(CompressionLayer::new())
        .layer(cors)
        // Ensure every request carries a request id for traceability
        .layer(axum::middleware::from_fn(
            middleware_helpers::request_id_middleware,
        ))
        .with_state(state);

    NormalizePathLayer::trim_trailing_slash().layer(router)
}

/// Service name, version and environment
#[utoipa::path(
    get,
    path = "/api/status",
    responses((status = 200, description = "Service status")),
    tag = "Health"
)]
pub async fn api_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "service": "wearup-api",
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// Database liveness probe
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Database reachable"),
        (status = 503, description = "Database unreachable")
    ),
    tag = "Health"
)]
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let (status, db_status) = match db::check_connection(&state.db).await {
        Ok(()) => (StatusCode::OK, "healthy"),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status,
        Json(json!({
            "status": db_status,
            "checks": { "database": db_status },
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

pub mod prelude {
    pub use crate::db::*;
    pub use crate::errors::*;
    pub use crate::events::*;
    pub use crate::services::*;
    pub use crate::{app, AppState};
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dev_config() -> config::AppConfig {
        config::AppConfig::new(
            "sqlite::memory:".into(),
            "a_sufficiently_long_and_varied_signing_key_0123456789".into(),
            3600,
            86_400,
            "127.0.0.1".into(),
            8000,
            "development".into(),
        )
    }

    #[test]
    fn cors_uses_configured_origins() {
        let mut cfg = dev_config();
        cfg.cors_allowed_origins = Some(" https://wearup.example , ,".into());
        // Building must not panic on blank entries.
        let _ = cors_layer(&cfg);
    }
}
