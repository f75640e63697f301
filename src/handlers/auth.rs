use crate::error::AppError;
use crate::models::auth::*;
use crate::services::StoreError;
use crate::AppState;
use axum::{
    extract::{rejection::JsonRejection, Extension},
    http::StatusCode,
    response::Json,
    routing::{post, Router},
};
use bcrypt::{hash, verify};
use std::sync::Arc;

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn auth_routes() -> Router {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
}

fn required(field: Option<String>) -> Option<String> {
    field.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

async fn register(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<RegisterResponse>), AppError> {
    let Json(payload) = payload.map_err(|_| AppError::BadRequest("Username and password required".into()))?;

    let (Some(username), Some(password)) = (required(payload.username), payload.password.filter(|p| !p.is_empty()))
    else {
        return Err(AppError::BadRequest("Username and password required".into()));
    };

    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AppError::BadRequest("Password must be at least 6 characters".into()));
    }

    let password_hash = hash(&password, state.config.bcrypt_cost).map_err(|e| {
        tracing::error!("Error hashing password: {}", e);
        AppError::Internal("Registration failed")
    })?;

    let new_user = NewUser {
        username,
        password_hash,
        email: required(payload.email),
    };

    let user = match state.users.create_user(new_user).await {
        Ok(user) => user,
        Err(StoreError::Duplicate) => return Err(AppError::Conflict("Username already exists".into())),
        Err(e) => {
            tracing::error!("Error creating user: {}", e);
            return Err(AppError::Internal("Registration failed"));
        }
    };

    tracing::info!("Registered user {} ({})", user.username, user.id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            success: true,
            message: "User registered successfully".to_string(),
            user: UserResponse::from(user),
        }),
    ))
}

async fn login(
    Extension(state): Extension<Arc<AppState>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<AuthResponse>, AppError> {
    let Json(payload) = payload.map_err(|_| AppError::BadRequest("Username and password required".into()))?;

    let (Some(username), Some(password)) = (required(payload.username), payload.password.filter(|p| !p.is_empty()))
    else {
        return Err(AppError::BadRequest("Username and password required".into()));
    };

    let user = match state.users.find_by_username(&username).await {
        Ok(Some(user)) if user.is_active => user,
        Ok(_) => return Err(AppError::Unauthorized("Invalid credentials".into())),
        Err(e) => {
            tracing::error!("Database error looking up user: {}", e);
            return Err(AppError::Internal("Login failed"));
        }
    };

    match verify(&password, &user.password_hash) {
        Ok(true) => {}
        Ok(false) => return Err(AppError::Unauthorized("Invalid credentials".into())),
        Err(e) => {
            tracing::error!("Error verifying password hash for user {}: {}", user.id, e);
            return Err(AppError::Unauthorized("Invalid credentials".into()));
        }
    }

    let token = state.tokens.issue(&user).map_err(|e| {
        tracing::error!("Error generating JWT token: {}", e);
        AppError::Internal("Login failed")
    })?;

    if let Err(e) = state.users.record_login(user.id).await {
        tracing::warn!("Failed to record login time for user {}: {}", user.id, e);
    }

    Ok(Json(AuthResponse {
        success: true,
        message: "Login successful".to_string(),
        user: UserResponse::from(user),
        access_token: token.clone(),
        token,
    }))
}
