// src/services/mod.rs
pub mod chat_history;
pub mod token;
pub mod user_store;

pub use chat_history::{ChatHistoryStore, PgChatHistoryStore, HISTORY_LIMIT};
pub use token::TokenService;
pub use user_store::{PgUserStore, UserStore};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("record already exists")]
    Duplicate,
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl StoreError {
    /// Map unique-constraint violations to [`StoreError::Duplicate`].
    pub fn from_insert(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::Duplicate,
            _ => StoreError::Database(err),
        }
    }
}
