use serde::{Deserialize, Serialize};

/// Per-file record stored with an exchange. `processed` means handling was
/// attempted, not that it produced a real answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileDescriptor {
    pub filename: String,
    #[serde(rename = "type")]
    pub file_type: String,
    pub processed: bool,
}

/// One file part of a chat request, held in memory until materialized.
#[derive(Debug, Clone)]
pub struct IncomingFile {
    pub original_name: String,
    pub data: axum::body::Bytes,
}

impl IncomingFile {
    pub fn new(original_name: impl Into<String>, data: impl Into<axum::body::Bytes>) -> Self {
        Self {
            original_name: original_name.into(),
            data: data.into(),
        }
    }
}
