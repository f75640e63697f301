// lib.rs - Chat backend library: HTTP surface, ingestion pipeline and stores
pub mod config;
pub mod db;
pub mod error;
pub mod gemini_client;
pub mod handlers;
pub mod ingestion;
pub mod middleware;
pub mod models;
pub mod services;

use axum::{http::HeaderValue, Extension, Router};
use config::AppConfig;
use gemini_client::GenerativeGateway;
use services::{ChatHistoryStore, TokenService, UserStore};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

/// Application context shared by every handler as `Extension<Arc<AppState>>`.
pub struct AppState {
    pub config: AppConfig,
    pub users: Arc<dyn UserStore>,
    pub history: Arc<dyn ChatHistoryStore>,
    pub gateway: Arc<dyn GenerativeGateway>,
    pub tokens: TokenService,
}

impl AppState {
    pub fn new(
        config: AppConfig,
        users: Arc<dyn UserStore>,
        history: Arc<dyn ChatHistoryStore>,
        gateway: Arc<dyn GenerativeGateway>,
    ) -> Self {
        let tokens = TokenService::new(&config.jwt_secret);
        Self {
            config,
            users,
            history,
            gateway,
            tokens,
        }
    }
}

fn cors_layer(config: &AppConfig) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if config.allows_any_origin() {
        return layer.allow_origin(Any);
    }

    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin {:?}", origin);
                None
            }
        })
        .collect();
    layer.allow_origin(origins)
}

pub fn create_app(state: Arc<AppState>) -> Router {
    Router::new()
        .merge(handlers::index::index_routes())
        .merge(handlers::auth::auth_routes())
        .merge(handlers::chat::chat_routes(state.config.max_content_length))
        .merge(handlers::history::history_routes())
        .layer(axum::middleware::from_fn(middleware::logging::request_logging_middleware))
        .layer(cors_layer(&state.config))
        .layer(Extension(state))
}
