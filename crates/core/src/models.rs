use crate::error::{ErrorKind, IngestError, IngestStage, RagError};
use crate::stores::{Collection, Metadata, QueryHit, Record};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// One stored chunk as reported back to the caller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestItem {
    pub id: String,
    pub content: String,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestOutcome {
    pub source: String,
    pub items: Vec<IngestItem>,
}

impl IngestOutcome {
    pub fn empty(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            items: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub source: String,
    pub stage: IngestStage,
    pub error: String,
}

impl From<&IngestError> for FileFailure {
    fn from(error: &IngestError) -> Self {
        Self {
            source: error.source_id.clone(),
            stage: error.stage,
            error: error.cause.to_string(),
        }
    }
}

/// Per-file results of a directory ingestion, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub outcomes: Vec<IngestOutcome>,
    pub failures: Vec<FileFailure>,
}

impl BatchReport {
    pub fn item_count(&self) -> usize {
        self.outcomes.iter().map(|outcome| outcome.items.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IngestResponse {
    pub message: String,
    pub items: Vec<IngestItem>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchIngestResponse {
    pub message: String,
    pub results: Vec<IngestOutcome>,
    pub failures: Vec<FileFailure>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchResponse {
    pub message: String,
    pub results: QueryHit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordsResponse {
    pub results: Vec<Record>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectionsResponse {
    pub collections: Vec<Collection>,
}

/// Error body returned instead of a success payload. `stage` and `source`
/// are only present for ingestion failures.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorPayload {
    pub error: String,
    pub kind: ErrorKind,
    pub stage: Option<IngestStage>,
    pub source: Option<String>,
}

impl From<RagError> for ErrorPayload {
    fn from(error: RagError) -> Self {
        Self {
            kind: error.kind(),
            error: error.to_string(),
            stage: None,
            source: None,
        }
    }
}

impl From<IngestError> for ErrorPayload {
    fn from(error: IngestError) -> Self {
        Self {
            kind: error.kind(),
            error: error.to_string(),
            stage: Some(error.stage),
            source: Some(error.source_id),
        }
    }
}
