// src/handlers/chat.rs
use crate::error::AppError;
use crate::ingestion::IngestionPipeline;
use crate::middleware::auth::auth_middleware;
use crate::models::auth::AuthUser;
use crate::models::chat::{ChatResponse, NewExchange};
use crate::models::file::IncomingFile;
use crate::AppState;
use axum::{
    extract::{multipart::MultipartRejection, DefaultBodyLimit, Extension, Multipart},
    response::Json,
    routing::post,
    Router,
};
use std::sync::Arc;

pub fn chat_routes(max_content_length: usize) -> Router {
    Router::new()
        .route("/chat", post(chat))
        .layer(DefaultBodyLimit::max(max_content_length))
        .route_layer(axum::middleware::from_fn(auth_middleware))
}

/// Parsed multipart chat request.
#[derive(Debug, Default)]
struct ChatForm {
    message: String,
    files: Vec<IncomingFile>,
}

impl ChatForm {
    fn is_empty(&self) -> bool {
        self.message.trim().is_empty() && self.files.is_empty()
    }
}

async fn read_form(mut multipart: Multipart) -> Result<ChatForm, AppError> {
    let mut form = ChatForm::default();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "message" => form.message = field.text().await?,
            "files" | "files[]" => {
                // Browsers send an empty part when no file was picked.
                let Some(filename) = field.file_name().map(str::to_owned).filter(|n| !n.is_empty()) else {
                    continue;
                };
                let data = field.bytes().await?;
                form.files.push(IncomingFile::new(filename, data));
            }
            other => tracing::debug!("Ignoring multipart field {:?}", other),
        }
    }

    Ok(form)
}

async fn chat(
    Extension(state): Extension<Arc<AppState>>,
    Extension(user): Extension<AuthUser>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<ChatResponse>, AppError> {
    let multipart = multipart.map_err(|e| AppError::BadRequest(format!("Invalid multipart body: {}", e)))?;
    let form = read_form(multipart).await?;

    if form.is_empty() {
        return Err(AppError::BadRequest("Message or files required".into()));
    }

    tracing::info!("Chat request from user {} with {} file(s)", user.user_id, form.files.len());

    let pipeline = IngestionPipeline::new(state.gateway.as_ref(), &state.config.upload_dir);
    let outcome = pipeline.run(&form.message, form.files).await.map_err(|e| {
        tracing::error!("Chat pipeline failed for user {}: {}", user.user_id, e);
        AppError::Internal("Failed to process request")
    })?;

    let exchange = NewExchange {
        user_id: user.user_id,
        user_message: form.message,
        bot_response: outcome.reply.clone(),
        files_info: outcome.files.clone(),
    };

    if let Err(e) = state.history.save_exchange(exchange).await {
        tracing::error!("Failed to save chat exchange for user {}: {}", user.user_id, e);
        return Err(AppError::Internal("Failed to process request"));
    }

    Ok(Json(ChatResponse {
        reply: outcome.reply,
        files_processed: outcome.files.len(),
        files_info: outcome.files,
    }))
}
