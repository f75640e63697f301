// src/models/chat.rs
use crate::ingestion::FileKind;
use crate::models::file::FileDescriptor;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Text,
    Image,
    Pdf,
    Mixed,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageType::Text => "text",
            MessageType::Image => "image",
            MessageType::Pdf => "pdf",
            MessageType::Mixed => "mixed",
        }
    }

    /// Classify an exchange from the files recorded for it.
    pub fn from_descriptors(files: &[FileDescriptor]) -> Self {
        if files.is_empty() {
            return MessageType::Text;
        }
        let kinds: Vec<Option<FileKind>> = files
            .iter()
            .map(|f| FileKind::from_extension(&f.file_type))
            .collect();

        if kinds.iter().all(|k| k.map_or(false, |k| k.is_image())) {
            MessageType::Image
        } else if kinds.iter().all(|k| *k == Some(FileKind::Pdf)) {
            MessageType::Pdf
        } else {
            MessageType::Mixed
        }
    }
}

/// Row shape of `chat_messages`.
#[derive(Debug, Clone, FromRow)]
pub struct ChatExchange {
    pub id: i32,
    pub user_id: i32,
    pub user_message: String,
    pub bot_response: String,
    pub files_info: sqlx::types::Json<Vec<FileDescriptor>>,
    pub message_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

#[derive(Debug, Clone)]
pub struct NewExchange {
    pub user_id: i32,
    pub user_message: String,
    pub bot_response: String,
    pub files_info: Vec<FileDescriptor>,
}

impl NewExchange {
    pub fn message_type(&self) -> MessageType {
        MessageType::from_descriptors(&self.files_info)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: i32,
    pub user_message: String,
    pub bot_response: String,
    pub files_info: Vec<FileDescriptor>,
    pub message_type: String,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

impl From<ChatExchange> for HistoryEntry {
    fn from(row: ChatExchange) -> Self {
        HistoryEntry {
            id: row.id,
            user_message: row.user_message,
            bot_response: row.bot_response,
            files_info: row.files_info.0,
            message_type: row.message_type,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct HistoryResponse {
    pub messages: Vec<HistoryEntry>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub reply: String,
    pub files_processed: usize,
    pub files_info: Vec<FileDescriptor>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ClearHistoryResponse {
    pub success: bool,
    pub message: String,
    pub deleted: u64,
}
