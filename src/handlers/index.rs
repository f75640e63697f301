use crate::AppState;
use axum::{extract::Extension, response::Json, routing::get, Router};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn index_routes() -> Router {
    Router::new()
        .route("/", get(index))
        .route("/api/status", get(api_status))
}

async fn index() -> Json<Value> {
    Json(json!({
        "message": "AI Chatbot Backend with File Processing",
        "status": "running"
    }))
}

async fn api_status(Extension(state): Extension<Arc<AppState>>) -> Json<Value> {
    let db_status = match state.history.health_check().await {
        Ok(_) => "healthy",
        Err(e) => {
            tracing::warn!("Database health check failed: {}", e);
            "unhealthy"
        }
    };

    Json(json!({
        "status": "operational",
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_status,
            "gemini": "configured"
        },
        "endpoints": {
            "auth": ["/register", "/login"],
            "chat": "/chat",
            "history": ["/history", "/clear-history"]
        }
    }))
}
