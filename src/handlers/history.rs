use crate::error::AppError;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::AuthUser;
use crate::models::chat::{ClearHistoryResponse, HistoryEntry, HistoryResponse};
use crate::services::HISTORY_LIMIT;
use crate::AppState;
use axum::{
    extract::Extension,
    response::Json,
    routing::{delete, get},
    Router,
};
use std::sync::Arc;

pub fn history_routes() -> Router {
    Router::new()
        .route("/history", get(get_history))
        .route("/clear-history", delete(clear_history))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

async fn get_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<HistoryResponse>, AppError> {
    let rows = state
        .history
        .recent_exchanges(user.user_id, HISTORY_LIMIT)
        .await
        .map_err(|e| {
            tracing::error!("Failed to load history for user {}: {}", user.user_id, e);
            AppError::Internal("Failed to get history")
        })?;

    Ok(Json(HistoryResponse {
        messages: rows.into_iter().map(HistoryEntry::from).collect(),
    }))
}

async fn clear_history(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<ClearHistoryResponse>, AppError> {
    let deleted = state.history.clear(user.user_id).await.map_err(|e| {
        tracing::error!("Failed to clear history for user {}: {}", user.user_id, e);
        AppError::Internal("Failed to clear history")
    })?;

    tracing::info!("Cleared {} exchange(s) for user {}", deleted, user.user_id);

    Ok(Json(ClearHistoryResponse {
        success: true,
        message: "History cleared successfully".to_string(),
        deleted,
    }))
}
