use super::extract::{self, decode_text, document_prompt, extract_docx_text, truncate_content, ExtractError};
use super::kind::FileKind;
use super::remote_file::{wait_until_ready, PollPolicy, RemoteProcessing};
use super::sanitize::storage_name;
use crate::gemini_client::{GatewayError, GenerativeGateway};
use crate::models::file::{FileDescriptor, IncomingFile};
use base64::prelude::*;
use chrono::Utc;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::fs;
use tokio::io::AsyncWriteExt;

pub const FALLBACK_REPLY: &str = "I couldn't process your request. Please try again.";
pub const TEXT_FAILURE: &str = "I couldn't generate a response. Please try again.";
pub const IMAGE_FAILURE: &str = "I couldn't process the image. Please try again.";
pub const PDF_FAILURE: &str = "I couldn't process the PDF. Please try again.";
pub const PDF_REMOTE_FAILED: &str = "Failed to process PDF file.";
pub const PDF_TIMEOUT: &str = "PDF processing timed out. Please try again with a smaller file.";
pub const DOCUMENT_FAILURE: &str = "I couldn't analyze the document. Please try again.";
pub const EMPTY_DOCUMENT: &str = "The document appears to be empty.";
pub const ENCODING_FAILURE: &str =
    "Could not decode the text file. Please ensure it is a valid text document.";

const DEFAULT_IMAGE_QUESTION: &str = "Please describe this image in detail.";
const DEFAULT_PDF_QUESTION: &str = "Please summarize this PDF document.";
const DEFAULT_DOCUMENT_QUESTION: &str = "Please summarize this document.";

/// Request-level failures. Everything that goes wrong inside a single file
/// handler ends up in the reply text instead.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("failed to store upload {path}: {source}")]
    Store {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Error, Debug)]
enum HandlerError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Extract(#[from] ExtractError),
    #[error("{0}")]
    Gateway(#[from] GatewayError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineOutcome {
    pub reply: String,
    pub files: Vec<FileDescriptor>,
}

/// Turns one chat request (message plus uploads) into a single reply.
pub struct IngestionPipeline<'a> {
    gateway: &'a dyn GenerativeGateway,
    upload_dir: &'a Path,
    poll: PollPolicy,
}

impl<'a> IngestionPipeline<'a> {
    pub fn new(gateway: &'a dyn GenerativeGateway, upload_dir: &'a Path) -> Self {
        Self {
            gateway,
            upload_dir,
            poll: PollPolicy::default(),
        }
    }

    pub fn with_poll_policy(mut self, poll: PollPolicy) -> Self {
        self.poll = poll;
        self
    }

    /// Process `files` strictly in order, then fall back to a plain text
    /// generation when no file was sent at all.
    pub async fn run(&self, message: &str, files: Vec<IncomingFile>) -> Result<PipelineOutcome, IngestError> {
        let question = Some(message.trim()).filter(|m| !m.is_empty());
        let had_files = !files.is_empty();
        let mut blocks: Vec<String> = Vec::new();
        let mut descriptors = Vec::new();

        for file in files {
            let Some(kind) = FileKind::from_filename(&file.original_name) else {
                tracing::warn!("Rejected upload '{}': file type not allowed", file.original_name);
                continue;
            };

            let stored_name = storage_name(&file.original_name, Utc::now());
            let path = self.upload_dir.join(&stored_name);
            store_upload(&path, &file.data)
                .await
                .map_err(|source| IngestError::Store { path: path.clone(), source })?;
            tracing::info!("Stored upload '{}' as {} ({} bytes)", file.original_name, stored_name, file.data.len());

            if let Some(text) = self.handle(kind, &path, &stored_name, question).await {
                if let Some(heading) = kind.heading() {
                    blocks.push(format!("{}\n{}", heading, text));
                }
            }

            descriptors.push(FileDescriptor {
                filename: stored_name,
                file_type: kind.extension().to_string(),
                processed: true,
            });

            if let Err(e) = fs::remove_file(&path).await {
                tracing::warn!("Failed to remove temporary upload {}: {}", path.display(), e);
            }
        }

        let mut reply = blocks.join("\n\n");

        // The raw message is sent; trimming only decides whether there is one.
        if !had_files && question.is_some() {
            reply = match self.gateway.generate_text(message).await {
                Ok(text) => text,
                Err(e) => {
                    tracing::error!("Text generation failed: {}", e);
                    TEXT_FAILURE.to_string()
                }
            };
        }

        if reply.trim().is_empty() {
            reply = FALLBACK_REPLY.to_string();
        }

        Ok(PipelineOutcome {
            reply,
            files: descriptors,
        })
    }

    /// Run the content handler for `kind`. `None` means the kind has no
    /// handler and contributes nothing to the reply.
    async fn handle(&self, kind: FileKind, path: &Path, name: &str, question: Option<&str>) -> Option<String> {
        tracing::debug!("Dispatching {} as {}", name, kind);

        let result = match kind {
            FileKind::Png | FileKind::Jpg | FileKind::Jpeg | FileKind::Gif => {
                self.analyze_image(kind, path, question).await
            }
            FileKind::Pdf => self.analyze_pdf(path, name, question).await,
            FileKind::Docx => self.analyze_docx(path, name, question).await,
            FileKind::Txt => self.analyze_txt(path, name, question).await,
            FileKind::Doc => {
                tracing::info!("No handler for legacy .doc upload {}, skipping", name);
                return None;
            }
        };

        Some(match result {
            Ok(text) => text,
            Err(HandlerError::Gateway(e)) => {
                tracing::error!("Gateway call for {} failed: {}", name, e);
                gateway_failure(kind).to_string()
            }
            Err(e) => {
                tracing::error!("Processing {} failed: {}", name, e);
                format!("Error processing {} file: {}", kind.label(), e)
            }
        })
    }

    async fn analyze_image(&self, kind: FileKind, path: &Path, question: Option<&str>) -> Result<String, HandlerError> {
        let bytes = fs::read(path).await?;
        let encoded = BASE64_STANDARD.encode(&bytes);
        let prompt = format!(
            "User message: {}\n\nPlease analyze this image and provide a detailed response.",
            question.unwrap_or(DEFAULT_IMAGE_QUESTION)
        );
        Ok(self.gateway.analyze_image(&prompt, encoded, kind.mime_type()).await?)
    }

    async fn analyze_pdf(&self, path: &Path, name: &str, question: Option<&str>) -> Result<String, HandlerError> {
        let bytes = fs::read(path).await?;
        let uploaded = self
            .gateway
            .upload_file(bytes, FileKind::Pdf.mime_type(), name)
            .await?;
        let remote_name = uploaded.name.clone();

        let outcome = match wait_until_ready(self.gateway, uploaded, self.poll).await {
            Ok(RemoteProcessing::Ready(file)) => {
                let prompt = format!(
                    "User message: {}\n\nPlease analyze this PDF document and provide a detailed response.",
                    question.unwrap_or(DEFAULT_PDF_QUESTION)
                );
                self.gateway
                    .generate_with_file(&prompt, &file)
                    .await
                    .map_err(HandlerError::from)
            }
            Ok(RemoteProcessing::TimedOut(_)) => {
                tracing::warn!("Remote processing of {} timed out", name);
                Ok(PDF_TIMEOUT.to_string())
            }
            Ok(state) => {
                tracing::warn!("Remote processing of {} ended as {:?}", name, state);
                Ok(PDF_REMOTE_FAILED.to_string())
            }
            Err(e) => Err(e.into()),
        };

        if let Err(e) = self.gateway.delete_file(&remote_name).await {
            tracing::warn!("Failed to delete remote file {}: {}", remote_name, e);
        }

        outcome
    }

    async fn analyze_docx(&self, path: &Path, name: &str, question: Option<&str>) -> Result<String, HandlerError> {
        let bytes = fs::read(path).await?;
        let text = extract_docx_text(&bytes)?;
        self.analyze_document_text(FileKind::Docx, &text, name, question).await
    }

    async fn analyze_txt(&self, path: &Path, name: &str, question: Option<&str>) -> Result<String, HandlerError> {
        let bytes = fs::read(path).await?;
        let Some((text, encoding)) = decode_text(&bytes) else {
            return Ok(ENCODING_FAILURE.to_string());
        };
        tracing::debug!("Decoded {} as {}", name, encoding.name());
        self.analyze_document_text(FileKind::Txt, &text, name, question).await
    }

    async fn analyze_document_text(
        &self,
        kind: FileKind,
        text: &str,
        name: &str,
        question: Option<&str>,
    ) -> Result<String, HandlerError> {
        if text.trim().is_empty() {
            return Ok(EMPTY_DOCUMENT.to_string());
        }
        let content = truncate_content(text);
        if content.len() != text.len() {
            tracing::info!("Truncated {} to {} characters", name, extract::MAX_DOCUMENT_CHARS);
        }
        let prompt = document_prompt(
            kind.label(),
            name,
            &content,
            question.unwrap_or(DEFAULT_DOCUMENT_QUESTION),
        );
        Ok(self.gateway.generate_text(&prompt).await?)
    }
}

/// Write a fresh temp file; an existing file at `path` is an error, never overwritten.
async fn store_upload(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .await?;
    file.write_all(data).await?;
    file.flush().await
}

fn gateway_failure(kind: FileKind) -> &'static str {
    match kind {
        FileKind::Png | FileKind::Jpg | FileKind::Jpeg | FileKind::Gif => IMAGE_FAILURE,
        FileKind::Pdf => PDF_FAILURE,
        FileKind::Docx | FileKind::Txt | FileKind::Doc => DOCUMENT_FAILURE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gemini_client::{RemoteFile, RemoteFileState};
    use crate::ingestion::extract::{MAX_DOCUMENT_CHARS, TRUNCATION_MARKER};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use std::time::Duration;

    #[derive(Debug, Clone, PartialEq)]
    enum Call {
        Text(String),
        Image { prompt: String, mime: String },
        Upload(String),
        Status(String),
        WithFile(String),
        Delete(String),
    }

    #[derive(Default)]
    struct RecordingGateway {
        calls: Mutex<Vec<Call>>,
        // Remote states returned by successive status checks; empty means PROCESSING.
        remote_states: Mutex<VecDeque<RemoteFileState>>,
        fail_images: bool,
    }

    impl RecordingGateway {
        fn with_remote_states(states: &[RemoteFileState]) -> Self {
            Self {
                remote_states: Mutex::new(states.iter().copied().collect()),
                ..Default::default()
            }
        }

        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: Call) {
            self.calls.lock().unwrap().push(call);
        }

        fn remote(state: RemoteFileState) -> RemoteFile {
            RemoteFile {
                name: "files/remote-1".to_string(),
                uri: "https://example.invalid/files/remote-1".to_string(),
                mime_type: "application/pdf".to_string(),
                state,
            }
        }
    }

    #[async_trait]
    impl GenerativeGateway for RecordingGateway {
        async fn generate_text(&self, prompt: &str) -> Result<String, GatewayError> {
            self.record(Call::Text(prompt.to_string()));
            Ok(format!("generated: {}", prompt.len()))
        }

        async fn analyze_image(&self, prompt: &str, _image: String, mime_type: &str) -> Result<String, GatewayError> {
            self.record(Call::Image {
                prompt: prompt.to_string(),
                mime: mime_type.to_string(),
            });
            if self.fail_images {
                return Err(GatewayError::EmptyResponse);
            }
            Ok("a picture of a cat".to_string())
        }

        async fn upload_file(&self, _data: Vec<u8>, _mime: &str, display_name: &str) -> Result<RemoteFile, GatewayError> {
            self.record(Call::Upload(display_name.to_string()));
            Ok(Self::remote(RemoteFileState::Processing))
        }

        async fn get_file(&self, name: &str) -> Result<RemoteFile, GatewayError> {
            self.record(Call::Status(name.to_string()));
            let state = self
                .remote_states
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(RemoteFileState::Processing);
            Ok(Self::remote(state))
        }

        async fn generate_with_file(&self, prompt: &str, _file: &RemoteFile) -> Result<String, GatewayError> {
            self.record(Call::WithFile(prompt.to_string()));
            Ok("the pdf says hi".to_string())
        }

        async fn delete_file(&self, name: &str) -> Result<(), GatewayError> {
            self.record(Call::Delete(name.to_string()));
            Ok(())
        }
    }

    fn fast_poll() -> PollPolicy {
        PollPolicy {
            interval: Duration::from_millis(5),
            ceiling: Duration::from_millis(40),
        }
    }

    fn dir_is_empty(dir: &Path) -> bool {
        std::fs::read_dir(dir).unwrap().next().is_none()
    }

    #[tokio::test]
    async fn test_message_only_returns_generation_result() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline.run("Hello there", vec![]).await.unwrap();

        assert_eq!(outcome.reply, "generated: 11");
        assert!(outcome.files.is_empty());
        assert_eq!(gateway.calls(), vec![Call::Text("Hello there".to_string())]);
    }

    #[tokio::test]
    async fn test_message_only_sends_the_untrimmed_message() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        pipeline.run("  line one\n", vec![]).await.unwrap();

        assert_eq!(gateway.calls(), vec![Call::Text("  line one\n".to_string())]);
    }

    #[tokio::test]
    async fn test_existing_temp_file_is_never_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("20240101_000000_000000_notes.txt");
        std::fs::write(&path, b"first upload").unwrap();

        let err = store_upload(&path, b"second upload").await.unwrap_err();

        assert_eq!(err.kind(), std::io::ErrorKind::AlreadyExists);
        assert_eq!(std::fs::read(&path).unwrap(), b"first upload");
    }

    #[tokio::test]
    async fn test_txt_upload_embeds_content_and_question() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run("What is this?", vec![IncomingFile::new("hello.txt", "Hello world")])
            .await
            .unwrap();

        assert!(outcome.reply.starts_with("TXT Analysis:\n"));
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].file_type, "txt");
        assert!(outcome.files[0].processed);
        assert!(outcome.files[0].filename.ends_with("_hello.txt"));

        let calls = gateway.calls();
        assert_eq!(calls.len(), 1);
        let Call::Text(prompt) = &calls[0] else {
            panic!("expected a text generation call, got {:?}", calls[0]);
        };
        assert!(prompt.contains("Hello world"));
        assert!(prompt.contains("What is this?"));
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_disallowed_extension_never_reaches_gateway() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run("run this", vec![IncomingFile::new("payload.exe", "MZ...")])
            .await
            .unwrap();

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert!(outcome.files.is_empty());
        assert!(gateway.calls().is_empty());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_long_document_prompt_is_truncated_with_marker() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let body = format!("{}{}", "a".repeat(MAX_DOCUMENT_CHARS), "b".repeat(50));
        pipeline
            .run("", vec![IncomingFile::new("long.txt", body)])
            .await
            .unwrap();

        let calls = gateway.calls();
        let Call::Text(prompt) = &calls[0] else {
            panic!("expected a text generation call");
        };
        let expected = format!("{}{}", "a".repeat(MAX_DOCUMENT_CHARS), TRUNCATION_MARKER);
        assert!(prompt.contains(&expected));
        assert!(!prompt.contains("bb"));
        assert!(prompt.contains(DEFAULT_DOCUMENT_QUESTION));
    }

    #[tokio::test]
    async fn test_empty_text_file_short_circuits() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run("", vec![IncomingFile::new("blank.txt", "  \n\t ")])
            .await
            .unwrap();

        assert_eq!(outcome.reply, format!("TXT Analysis:\n{}", EMPTY_DOCUMENT));
        assert!(gateway.calls().is_empty());
    }

    #[tokio::test]
    async fn test_doc_is_accepted_but_not_analyzed() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run("", vec![IncomingFile::new("legacy.doc", vec![0xD0, 0xCF, 0x11, 0xE0])])
            .await
            .unwrap();

        assert_eq!(outcome.reply, FALLBACK_REPLY);
        assert_eq!(outcome.files.len(), 1);
        assert_eq!(outcome.files[0].file_type, "doc");
        assert!(outcome.files[0].processed);
        assert!(gateway.calls().is_empty());
        assert!(dir_is_empty(dir.path()));
    }

    #[tokio::test]
    async fn test_broken_docx_is_reported_in_band() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run("", vec![IncomingFile::new("broken.docx", "not a zip")])
            .await
            .unwrap();

        assert!(outcome.reply.starts_with("DOCX Analysis:\nError processing DOCX file:"));
        assert_eq!(outcome.files.len(), 1);
    }

    #[tokio::test]
    async fn test_gateway_failure_does_not_stop_later_files() {
        let gateway = RecordingGateway {
            fail_images: true,
            ..Default::default()
        };
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path());

        let outcome = pipeline
            .run(
                "describe",
                vec![
                    IncomingFile::new("cat.PNG", vec![0x89, 0x50, 0x4E, 0x47]),
                    IncomingFile::new("notes.txt", "some notes"),
                ],
            )
            .await
            .unwrap();

        let expected_prefix = format!("Image Analysis:\n{}\n\nTXT Analysis:\n", IMAGE_FAILURE);
        assert!(outcome.reply.starts_with(&expected_prefix), "reply was {:?}", outcome.reply);
        let types: Vec<_> = outcome.files.iter().map(|f| f.file_type.as_str()).collect();
        assert_eq!(types, vec!["png", "txt"]);

        let calls = gateway.calls();
        assert!(matches!(&calls[0], Call::Image { mime, .. } if mime == "image/png"));
        assert!(matches!(&calls[1], Call::Text(_)));
    }

    #[tokio::test]
    async fn test_pdf_ready_generates_and_releases_remote_file() {
        let gateway = RecordingGateway::with_remote_states(&[RemoteFileState::Processing, RemoteFileState::Active]);
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path()).with_poll_policy(PollPolicy {
            interval: Duration::from_millis(1),
            ceiling: Duration::from_secs(5),
        });

        let outcome = pipeline
            .run("", vec![IncomingFile::new("paper.pdf", "%PDF-1.4")])
            .await
            .unwrap();

        assert_eq!(outcome.reply, "PDF Analysis:\nthe pdf says hi");
        let calls = gateway.calls();
        assert!(matches!(&calls[0], Call::Upload(name) if name.ends_with("_paper.pdf")));
        assert!(matches!(&calls[calls.len() - 2], Call::WithFile(prompt) if prompt.contains(DEFAULT_PDF_QUESTION)));
        assert_eq!(calls.last(), Some(&Call::Delete("files/remote-1".to_string())));
        assert_eq!(calls.iter().filter(|c| matches!(c, Call::Status(_))).count(), 2);
    }

    #[tokio::test]
    async fn test_pdf_timeout_yields_fixed_message() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path()).with_poll_policy(fast_poll());

        let outcome = pipeline
            .run("summarize", vec![IncomingFile::new("big.pdf", "%PDF-1.7")])
            .await
            .unwrap();

        assert_eq!(outcome.reply, format!("PDF Analysis:\n{}", PDF_TIMEOUT));
        let calls = gateway.calls();
        assert!(!calls.iter().any(|c| matches!(c, Call::WithFile(_))));
        assert_eq!(calls.last(), Some(&Call::Delete("files/remote-1".to_string())));
    }

    #[tokio::test]
    async fn test_pdf_remote_failure_yields_fixed_message() {
        let gateway = RecordingGateway::with_remote_states(&[RemoteFileState::Failed]);
        let dir = tempfile::tempdir().unwrap();
        let pipeline = IngestionPipeline::new(&gateway, dir.path()).with_poll_policy(fast_poll());

        let outcome = pipeline
            .run("", vec![IncomingFile::new("bad.pdf", "%PDF")])
            .await
            .unwrap();

        assert_eq!(outcome.reply, format!("PDF Analysis:\n{}", PDF_REMOTE_FAILED));
    }

    #[tokio::test]
    async fn test_unwritable_upload_dir_is_a_request_error() {
        let gateway = RecordingGateway::default();
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("does-not-exist");
        let pipeline = IngestionPipeline::new(&gateway, &missing);

        let err = pipeline
            .run("", vec![IncomingFile::new("a.txt", "x")])
            .await
            .unwrap_err();

        assert!(matches!(err, IngestError::Store { .. }));
    }
}
