use crate::models::DocumentStatus;
use thiserror::Error;

/// Errors raised while a document moves through the ingestion pipeline.
///
/// Every fatal variant terminates the job and ends in a single `Failed`
/// status write; `SegmentationAnomaly` is the one recoverable kind and is
/// handled inside segmentation by falling back to the generic splitter.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("document is encrypted: {0}")]
    EncryptedDocument(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("segmentation anomaly: {0}")]
    SegmentationAnomaly(String),

    #[error("embedding provider failed: {0}")]
    Embedding(String),

    #[error("vector persistence failed: {0}")]
    Persistence(String),

    #[error("object storage failed: {0}")]
    Storage(String),

    #[error("invalid status transition from {from} to {to}")]
    InvalidTransition {
        from: DocumentStatus,
        to: DocumentStatus,
    },

    #[error("document not found: {0}")]
    NotFound(String),

    #[error("processing timed out after {0}s")]
    Timeout(u64),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    RegexError(#[from] regex::Error),
}

impl PipelineError {
    /// Whether segmentation may recover from this error by switching to the
    /// generic splitter instead of failing the document.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, PipelineError::SegmentationAnomaly(_))
    }
}

impl From<SearchError> for PipelineError {
    fn from(error: SearchError) -> Self {
        PipelineError::Persistence(error.to_string())
    }
}

/// Errors raised by the read side (vector store queries and collection
/// management).
#[derive(Debug, Error)]
pub enum SearchError {
    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("search request failed: {0}")]
    Request(String),

    #[error("collection not found: {0}")]
    CollectionNotFound(String),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
