//! Request-scoped file ingestion: validate, store, analyze and clean up each
//! upload of a chat request, then assemble a single reply.
pub mod extract;
pub mod kind;
pub mod pipeline;
pub mod remote_file;
pub mod sanitize;

pub use kind::FileKind;
pub use pipeline::{IngestError, IngestionPipeline, PipelineOutcome};
pub use remote_file::PollPolicy;
