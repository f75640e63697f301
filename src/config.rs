// src/config.rs
use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

pub const DEFAULT_MAX_CONTENT_LENGTH: usize = 50 * 1024 * 1024;
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Process-wide settings, loaded once at startup and shared through `AppState`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_url: String,
    pub jwt_secret: String,
    pub gemini_api_key: String,
    pub gemini_model: String,
    pub gemini_base_url: String,
    pub upload_dir: PathBuf,
    pub max_content_length: usize,
    pub cors_origins: Vec<String>,
    pub bcrypt_cost: u32,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// | Variable | Default |
    /// |----------|---------|
    /// | `BIND_ADDR` | `0.0.0.0:5000` |
    /// | `DATABASE_URL` | built from `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` |
    /// | `JWT_SECRET_KEY` / `JWT_SECRET` | (required) |
    /// | `GEMINI_API_KEY` | (required) |
    /// | `GEMINI_MODEL` | `gemini-2.5-flash` |
    /// | `GEMINI_BASE_URL` | `https://generativelanguage.googleapis.com` |
    /// | `UPLOAD_FOLDER` | `uploads` |
    /// | `MAX_CONTENT_LENGTH` | 50 MiB |
    /// | `CORS_ORIGINS` | `http://localhost:3000,http://localhost:5173` |
    /// | `BCRYPT_COST` | `bcrypt::DEFAULT_COST` |
    pub fn from_env() -> Result<Self, ConfigError> {
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_string())
            .parse()
            .map_err(|_| ConfigError::InvalidAddr)?;

        let database_url = database_url_from_env();

        let jwt_secret = env::var("JWT_SECRET_KEY")
            .or_else(|_| env::var("JWT_SECRET"))
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingJwtSecret)?;

        let gemini_api_key = env::var("GEMINI_API_KEY")
            .ok()
            .filter(|s| !s.is_empty())
            .ok_or(ConfigError::MissingGeminiKey)?;

        let gemini_model =
            env::var("GEMINI_MODEL").unwrap_or_else(|_| DEFAULT_GEMINI_MODEL.to_string());
        let gemini_base_url =
            env::var("GEMINI_BASE_URL").unwrap_or_else(|_| DEFAULT_GEMINI_BASE_URL.to_string());

        let upload_dir = PathBuf::from(env::var("UPLOAD_FOLDER").unwrap_or_else(|_| "uploads".to_string()));

        let max_content_length = match env::var("MAX_CONTENT_LENGTH") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| ConfigError::InvalidNumber("MAX_CONTENT_LENGTH"))?,
            Err(_) => DEFAULT_MAX_CONTENT_LENGTH,
        };

        let cors_origins = parse_origins(
            &env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "http://localhost:3000,http://localhost:5173".to_string()),
        );

        let bcrypt_cost = match env::var("BCRYPT_COST") {
            Ok(raw) => raw.parse().map_err(|_| ConfigError::InvalidNumber("BCRYPT_COST"))?,
            Err(_) => bcrypt::DEFAULT_COST,
        };

        Ok(Self {
            bind_addr,
            database_url,
            jwt_secret,
            gemini_api_key,
            gemini_model,
            gemini_base_url,
            upload_dir,
            max_content_length,
            cors_origins,
            bcrypt_cost,
        })
    }

    /// True when any origin may call the API.
    pub fn allows_any_origin(&self) -> bool {
        self.cors_origins.iter().any(|o| o == "*")
    }
}

/// `DATABASE_URL`, or a URL composed from the `DB_*` variables.
pub fn database_url_from_env() -> String {
    env::var("DATABASE_URL").unwrap_or_else(|_| database_url_from_parts())
}

fn database_url_from_parts() -> String {
    let host = env::var("DB_HOST").unwrap_or_else(|_| "localhost".to_string());
    let port = env::var("DB_PORT").unwrap_or_else(|_| "5432".to_string());
    let user = env::var("DB_USER").unwrap_or_else(|_| "postgres".to_string());
    let password = env::var("DB_PASSWORD").unwrap_or_default();
    let name = env::var("DB_NAME").unwrap_or_else(|_| "chatbot_db".to_string());

    if password.is_empty() {
        format!("postgres://{}@{}:{}/{}", user, host, port, name)
    } else {
        format!("postgres://{}:{}@{}:{}/{}", user, password, host, port, name)
    }
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().trim_end_matches('/').to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid BIND_ADDR format")]
    InvalidAddr,

    #[error("JWT_SECRET_KEY environment variable is required")]
    MissingJwtSecret,

    #[error("GEMINI_API_KEY environment variable is required")]
    MissingGeminiKey,

    #[error("{0} must be a positive integer")]
    InvalidNumber(&'static str),
}
