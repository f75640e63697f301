use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::time::Duration;
use thiserror::Error;

/// Per-request timeout for generation and upload calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);
/// Per-request timeout for file status and deletion calls.
const FILE_OP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Gemini API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Gemini returned no text candidate")]
    EmptyResponse,
    #[error("Gemini upload did not return an upload URL")]
    MissingUploadUrl,
}

/// The generative model as the ingestion pipeline sees it.
#[async_trait]
pub trait GenerativeGateway: Send + Sync {
    /// Single prompt in, text out.
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError>;

    /// Prompt plus one inline base64 image.
    async fn analyze_image(
        &self,
        prompt: &str,
        image_base64: String,
        mime_type: &str,
    ) -> Result<String, GatewayError>;

    /// Upload a large file for asynchronous processing on the remote side.
    async fn upload_file(
        &self,
        data: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, GatewayError>;

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GatewayError>;

    /// Prompt plus a reference to a previously uploaded file.
    async fn generate_with_file(&self, prompt: &str, file: &RemoteFile) -> Result<String, GatewayError>;

    async fn delete_file(&self, name: &str) -> Result<(), GatewayError>;
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    model: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    #[serde(rename = "generationConfig", skip_serializing_if = "Option::is_none")]
    pub generation_config: Option<GenerationConfig>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Content {
    #[serde(default)]
    pub parts: Vec<Part>,
    pub role: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(untagged)]
pub enum Part {
    Text { text: String },
    InlineData {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
    FileData {
        #[serde(rename = "fileData")]
        file_data: FileData,
    },
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct InlineData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    pub data: String, // base64 encoded data
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FileData {
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(rename = "fileUri")]
    pub file_uri: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerationConfig {
    pub temperature: f32,
    #[serde(rename = "topK")]
    pub top_k: u32,
    #[serde(rename = "topP")]
    pub top_p: f32,
    #[serde(rename = "maxOutputTokens")]
    pub max_output_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    #[serde(rename = "usageMetadata")]
    pub usage_metadata: Option<UsageMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Candidate {
    pub content: Option<Content>,
    #[serde(rename = "finishReason")]
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UsageMetadata {
    #[serde(rename = "promptTokenCount", default)]
    pub prompt_token_count: u32,
    #[serde(rename = "candidatesTokenCount", default)]
    pub candidates_token_count: u32,
    #[serde(rename = "totalTokenCount", default)]
    pub total_token_count: u32,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    pub fn text(&self) -> Option<String> {
        let content = self.candidates.first()?.content.as_ref()?;
        let text: String = content
            .parts
            .iter()
            .filter_map(|part| match part {
                Part::Text { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RemoteFileState {
    Processing,
    Active,
    Failed,
    #[default]
    #[serde(other)]
    Unspecified,
}

/// File resource of the Gemini Files API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub name: String,
    #[serde(default)]
    pub uri: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub state: RemoteFileState,
}

#[derive(Debug, Deserialize)]
struct UploadFileResponse {
    file: RemoteFile,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> Self {
        Self::with_base_url(api_key, model, crate::config::DEFAULT_GEMINI_BASE_URL.to_string())
    }

    pub fn with_base_url(api_key: String, model: String, base_url: String) -> Self {
        Self {
            client: Client::new(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model,
        }
    }

    fn default_generation_config() -> GenerationConfig {
        GenerationConfig {
            temperature: 0.7,
            top_k: 40,
            top_p: 0.9,
            max_output_tokens: 4096,
        }
    }

    pub async fn generate_content(
        &self,
        request: GenerateContentRequest,
    ) -> Result<GenerateContentResponse, GatewayError> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent?key={}",
            self.base_url, self.model, self.api_key
        );

        tracing::debug!("Gemini request with {} part(s)", request.contents.iter().map(|c| c.parts.len()).sum::<usize>());

        let response = self
            .client
            .post(&url)
            .header("Content-Type", "application/json")
            .timeout(REQUEST_TIMEOUT)
            .json(&request)
            .send()
            .await?;

        let response = ensure_success(response).await?;
        let result: GenerateContentResponse = response.json().await?;

        if let Some(ref usage) = result.usage_metadata {
            tracing::debug!(
                prompt_tokens = usage.prompt_token_count,
                output_tokens = usage.candidates_token_count,
                "Gemini generation finished"
            );
        }

        Ok(result)
    }

    async fn generate_from_parts(&self, parts: Vec<Part>) -> Result<String, GatewayError> {
        let request = GenerateContentRequest {
            contents: vec![Content {
                parts,
                role: Some("user".to_string()),
            }],
            generation_config: Some(Self::default_generation_config()),
        };

        self.generate_content(request)
            .await?
            .text()
            .ok_or(GatewayError::EmptyResponse)
    }

    fn file_url(&self, name: &str) -> String {
        format!("{}/v1beta/{}?key={}", self.base_url, name, self.api_key)
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, GatewayError> {
    if response.status().is_success() {
        Ok(response)
    } else {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(GatewayError::Api { status, body })
    }
}

#[async_trait]
impl GenerativeGateway for GeminiClient {
    async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError> {
        self.generate_from_parts(vec![Part::Text { text: prompt.to_string() }])
            .await
    }

    async fn analyze_image(
        &self,
        prompt: &str,
        image_base64: String,
        mime_type: &str,
    ) -> Result<String, GatewayError> {
        self.generate_from_parts(vec![
            Part::Text { text: prompt.to_string() },
            Part::InlineData {
                inline_data: InlineData {
                    mime_type: mime_type.to_string(),
                    data: image_base64,
                },
            },
        ])
        .await
    }

    async fn upload_file(
        &self,
        data: Vec<u8>,
        mime_type: &str,
        display_name: &str,
    ) -> Result<RemoteFile, GatewayError> {
        // Resumable protocol: a start request returns the upload URL, then a
        // single upload-and-finalize request carries the bytes.
        let start_url = format!("{}/upload/v1beta/files?key={}", self.base_url, self.api_key);
        let start = self
            .client
            .post(&start_url)
            .header("X-Goog-Upload-Protocol", "resumable")
            .header("X-Goog-Upload-Command", "start")
            .header("X-Goog-Upload-Header-Content-Length", data.len().to_string())
            .header("X-Goog-Upload-Header-Content-Type", mime_type)
            .timeout(REQUEST_TIMEOUT)
            .json(&json!({ "file": { "display_name": display_name } }))
            .send()
            .await?;
        let start = ensure_success(start).await?;

        let upload_url = start
            .headers()
            .get("x-goog-upload-url")
            .and_then(|v| v.to_str().ok())
            .ok_or(GatewayError::MissingUploadUrl)?
            .to_string();

        let size = data.len();
        let response = self
            .client
            .post(&upload_url)
            .header("Content-Length", size.to_string())
            .header("X-Goog-Upload-Offset", "0")
            .header("X-Goog-Upload-Command", "upload, finalize")
            .timeout(REQUEST_TIMEOUT)
            .body(data)
            .send()
            .await?;
        let response = ensure_success(response).await?;

        let uploaded: UploadFileResponse = response.json().await?;
        tracing::info!("Uploaded {} bytes to Gemini as {}", size, uploaded.file.name);
        Ok(uploaded.file)
    }

    async fn get_file(&self, name: &str) -> Result<RemoteFile, GatewayError> {
        let response = self.client.get(self.file_url(name)).timeout(FILE_OP_TIMEOUT).send().await?;
        let response = ensure_success(response).await?;
        Ok(response.json().await?)
    }

    async fn generate_with_file(&self, prompt: &str, file: &RemoteFile) -> Result<String, GatewayError> {
        self.generate_from_parts(vec![
            Part::FileData {
                file_data: FileData {
                    mime_type: file.mime_type.clone(),
                    file_uri: file.uri.clone(),
                },
            },
            Part::Text { text: prompt.to_string() },
        ])
        .await
    }

    async fn delete_file(&self, name: &str) -> Result<(), GatewayError> {
        let response = self.client.delete(self.file_url(name)).timeout(FILE_OP_TIMEOUT).send().await?;
        ensure_success(response).await?;
        Ok(())
    }
}
