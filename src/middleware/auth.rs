use crate::models::auth::{AuthUser, ErrorResponse};
use crate::AppState;
use axum::{
    extract::Request,
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    middleware::Next,
    response::{Json, Response},
    Extension,
};
use std::sync::Arc;

fn unauthorized(message: &str) -> (StatusCode, Json<ErrorResponse>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            success: false,
            message: message.to_string(),
        }),
    )
}

/// Require `Authorization: Bearer <token>` and attach the caller as an
/// [`AuthUser`] extension.
pub async fn auth_middleware(
    Extension(state): Extension<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let auth_str = match headers.get(AUTHORIZATION) {
        Some(header) => header.to_str().map_err(|_| unauthorized("Invalid token"))?,
        None => return Err(unauthorized("Authorization header missing")),
    };

    let token = match auth_str.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => token.trim(),
        _ => return Err(unauthorized("Invalid token")),
    };

    let user_id = match state.tokens.validate(token) {
        Some(id) => id,
        None => return Err(unauthorized("Invalid token")),
    };

    request.extensions_mut().insert(AuthUser { user_id });

    Ok(next.run(request).await)
}
