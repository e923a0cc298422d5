use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("extraction failed for {source_id}: {details}")]
    Extraction { source_id: String, details: String },

    #[error("embedding failed: {0}")]
    Embedding(String),

    #[error("vector store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("no results: {0}")]
    EmptyResult(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification used by callers to branch on recoverability and by
/// the structured error payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Extraction,
    Embedding,
    StoreUnavailable,
    EmptyResult,
    Validation,
    Io,
}

impl RagError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Extraction { .. } => ErrorKind::Extraction,
            Self::Embedding(_) => ErrorKind::Embedding,
            Self::StoreUnavailable(_)
            | Self::BackendResponse { .. }
            | Self::Http(_)
            | Self::Url(_) => ErrorKind::StoreUnavailable,
            Self::EmptyResult(_) => ErrorKind::EmptyResult,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io(_) | Self::Serialization(_) => ErrorKind::Io,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IngestStage {
    Extract,
    Chunk,
    Embed,
    Upsert,
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Extract => "extract",
            Self::Chunk => "chunk",
            Self::Embed => "embed",
            Self::Upsert => "upsert",
        };
        f.write_str(name)
    }
}

/// A failed ingestion, tagged with the stage that failed and the source it
/// was processing.
#[derive(Debug, Error)]
#[error("{stage} stage failed for {source_id}: {cause}")]
pub struct IngestError {
    pub stage: IngestStage,
    pub source_id: String,
    #[source]
    pub cause: RagError,
}

impl IngestError {
    pub fn new(stage: IngestStage, source_id: impl Into<String>, cause: RagError) -> Self {
        Self {
            stage,
            source_id: source_id.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }
}

pub type Result<T, E = RagError> = std::result::Result<T, E>;
