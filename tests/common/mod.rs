#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chat_backend::config::AppConfig;
use chat_backend::gemini_client::{GatewayError, GenerativeGateway, RemoteFile, RemoteFileState};
use chat_backend::models::auth::{NewUser, User};
use chat_backend::models::chat::{ChatExchange, NewExchange};
use chat_backend::services::{ChatHistoryStore, StoreError, UserStore};
use chat_backend::{create_app, AppState};
use chrono::Utc;
use http_body_util::BodyExt;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tower::ServiceExt;

pub const BOUNDARY: &str = "----chat-test-boundary";

#[derive(Default)]
pub struct MemoryUserStore {
    users: Mutex<Vec<User>>,
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn create_user(&self, user: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.username == user.username) {
            return Err(StoreError::Duplicate);
        }
        let created = User {
            id: users.len() as i32 + 1,
            username: user.username,
            password_hash: user.password_hash,
            email: user.email,
            is_active: true,
            created_at: Utc::now(),
            last_login: None,
        };
        users.push(created.clone());
        Ok(created)
    }

    async fn find_by_username(&self, username: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.lock().unwrap().iter().find(|u| u.username == username).cloned())
    }

    async fn record_login(&self, user_id: i32) -> Result<(), StoreError> {
        if let Some(user) = self.users.lock().unwrap().iter_mut().find(|u| u.id == user_id) {
            user.last_login = Some(Utc::now());
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryHistoryStore {
    rows: Mutex<Vec<ChatExchange>>,
}

impl MemoryHistoryStore {
    pub fn count_for(&self, user_id: i32) -> usize {
        self.rows.lock().unwrap().iter().filter(|r| r.user_id == user_id).count()
    }
}

#[async_trait]
impl ChatHistoryStore for MemoryHistoryStore {
    async fn save_exchange(&self, exchange: NewExchange) -> Result<i32, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let id = rows.len() as i32 + 1;
        let message_type = exchange.message_type().as_str().to_string();
        rows.push(ChatExchange {
            id,
            user_id: exchange.user_id,
            user_message: exchange.user_message,
            bot_response: exchange.bot_response,
            files_info: sqlx::types::Json(exchange.files_info),
            message_type,
            created_at: Utc::now(),
        });
        Ok(id)
    }

    async fn recent_exchanges(&self, user_id: i32, limit: i64) -> Result<Vec<ChatExchange>, StoreError> {
        let mut rows: Vec<ChatExchange> = self
            .rows
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.user_id == user_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn clear(&self, user_id: i32) -> Result<u64, StoreError> {
        let mut rows = self.rows.lock().unwrap();
        let before = rows.len();
        rows.retain(|r| r.user_id != user_id);
        Ok((before - rows.len()) as u64)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

/// Gateway that answers every call deterministically and records prompts.
#[derive(Default)]
pub struct EchoGateway {
    pub prompts: Mutex<Vec<String>>,
}

impl EchoGateway {
    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    fn record(&self, prompt: &str) {
        self.prompts.lock().unwrap().push(prompt.to_string());
    }
}

#[async_trait]
impl GenerativeGateway for EchoGateway {
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError> {
        self.record(prompt);
        Ok(format!("echo: {}", prompt))
    }

    async fn analyze_image(&self, prompt: &str, _image_base64: String, _mime_type: &str) -> Result<String, GatewayError> {
        self.record(prompt);
        Ok("an image".to_string())
    }

    async fn upload_file(&self, _data: Vec<u8>, mime_type: &str, _display_name: &str) -> Result<RemoteFile, GatewayError> {
        Ok(RemoteFile {
            name: "files/test".to_string(),
            uri: "https://example.invalid/files/test".to_string(),
            mime_type: mime_type.to_string(),
            state: RemoteFileState::Active,
        })
    }

    async fn get_file(&self, _name: &str) -> Result<RemoteFile, GatewayError> {
        Err(GatewayError::EmptyResponse)
    }

    async fn generate_with_file(&self, prompt: &str, _file: &RemoteFile) -> Result<String, GatewayError> {
        self.record(prompt);
        Ok("a pdf".to_string())
    }

    async fn delete_file(&self, _name: &str) -> Result<(), GatewayError> {
        Ok(())
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: Arc<AppState>,
    pub gateway: Arc<EchoGateway>,
    pub history: Arc<MemoryHistoryStore>,
    _upload_dir: TempDir,
}

pub fn test_config(upload_dir: &TempDir) -> AppConfig {
    AppConfig {
        bind_addr: "127.0.0.1:0".parse().unwrap(),
        database_url: "postgres://unused".to_string(),
        jwt_secret: "integration-test-secret".to_string(),
        gemini_api_key: "test-key".to_string(),
        gemini_model: "test-model".to_string(),
        gemini_base_url: "http://127.0.0.1:9".to_string(),
        upload_dir: upload_dir.path().to_path_buf(),
        max_content_length: 1024 * 1024,
        cors_origins: vec!["http://localhost:3000".to_string()],
        bcrypt_cost: 4,
    }
}

pub fn spawn_app() -> TestApp {
    let upload_dir = tempfile::tempdir().unwrap();
    let gateway = Arc::new(EchoGateway::default());
    let history = Arc::new(MemoryHistoryStore::default());
    let state = Arc::new(AppState::new(
        test_config(&upload_dir),
        Arc::new(MemoryUserStore::default()),
        history.clone(),
        gateway.clone(),
    ));

    TestApp {
        router: create_app(state.clone()),
        state,
        gateway,
        history,
        _upload_dir: upload_dir,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    pub async fn post_json(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        let request = Request::post(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.send(request).await
    }

    /// Register and log in `username`, returning the issued token.
    pub async fn login_as(&self, username: &str) -> String {
        let credentials = serde_json::json!({ "username": username, "password": "secret123" });
        let (status, _) = self.post_json("/register", credentials.clone()).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, body) = self.post_json("/login", credentials).await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }
}

/// Part of a hand-built multipart body: `(field, Some(filename), bytes)`.
pub type FormPart<'a> = (&'a str, Option<&'a str>, &'a [u8]);

pub fn text_part<'a>(name: &'a str, value: &'a str) -> FormPart<'a> {
    (name, None, value.as_bytes())
}

pub fn file_part<'a>(name: &'a str, filename: &'a str, data: &'a [u8]) -> FormPart<'a> {
    (name, Some(filename), data)
}

pub fn multipart_body(parts: &[FormPart<'_>]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, filename, data) in parts {
        body.extend_from_slice(format!("--{}\r\n", BOUNDARY).as_bytes());
        match filename {
            Some(filename) => {
                body.extend_from_slice(
                    format!(
                        "Content-Disposition: form-data; name=\"{}\"; filename=\"{}\"\r\n\
                         Content-Type: application/octet-stream\r\n\r\n",
                        name, filename
                    )
                    .as_bytes(),
                );
            }
            None => {
                body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{}\"\r\n\r\n", name).as_bytes());
            }
        }
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());
    body
}

pub fn chat_request(token: Option<&str>, parts: &[FormPart<'_>]) -> Request<Body> {
    let mut builder = Request::post("/chat")
        .header("content-type", format!("multipart/form-data; boundary={}", BOUNDARY));
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    builder.body(Body::from(multipart_body(parts))).unwrap()
}
