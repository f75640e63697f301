use super::StoreError;
use crate::models::chat::{ChatExchange, NewExchange};
use async_trait::async_trait;
use sqlx::types::Json;
use sqlx::PgPool;

/// Most exchanges returned by one history fetch.
pub const HISTORY_LIMIT: i64 = 50;

#[async_trait]
pub trait ChatHistoryStore: Send + Sync {
    /// Persist one exchange and return its id.
    async fn save_exchange(&self, exchange: NewExchange) -> Result<i32, StoreError>;

    /// Up to `limit` exchanges of `user_id`, newest first.
    async fn recent_exchanges(&self, user_id: i32, limit: i64) -> Result<Vec<ChatExchange>, StoreError>;

    /// Delete every exchange of `user_id`, returning how many were removed.
    async fn clear(&self, user_id: i32) -> Result<u64, StoreError>;

    async fn health_check(&self) -> Result<(), StoreError>;
}

pub struct PgChatHistoryStore {
    pool: PgPool,
}

impl PgChatHistoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ChatHistoryStore for PgChatHistoryStore {
    async fn save_exchange(&self, exchange: NewExchange) -> Result<i32, StoreError> {
        let message_type = exchange.message_type();
        let (id,): (i32,) = sqlx::query_as(
            r#"
            INSERT INTO chat_messages (user_id, user_message, bot_response, files_info, message_type, created_at)
            VALUES ($1, $2, $3, $4, $5, NOW())
            RETURNING id
            "#,
        )
        .bind(exchange.user_id)
        .bind(&exchange.user_message)
        .bind(&exchange.bot_response)
        .bind(Json(&exchange.files_info))
        .bind(message_type.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(id)
    }

    async fn recent_exchanges(&self, user_id: i32, limit: i64) -> Result<Vec<ChatExchange>, StoreError> {
        let rows = sqlx::query_as::<_, ChatExchange>(
            r#"
            SELECT id, user_id, user_message, bot_response, files_info, message_type, created_at
            FROM chat_messages
            WHERE user_id = $1
            ORDER BY created_at DESC, id DESC
            LIMIT $2
            "#,
        )
        .bind(user_id)
        .bind(limit.clamp(0, HISTORY_LIMIT))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows)
    }

    async fn clear(&self, user_id: i32) -> Result<u64, StoreError> {
        let result = sqlx::query("DELETE FROM chat_messages WHERE user_id = $1")
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }
}
