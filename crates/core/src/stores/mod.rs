//! Vector persistence backends.
//!
//! Both backends implement [`VectorStore`], the only surface the pipeline
//! and the query path ever touch. Writes are scoped to one document and
//! are replace-on-write: an upsert first removes every entry previously
//! stored for that `document_id`, then inserts the new set, so retrying a
//! job never duplicates chunks.

pub mod memory;
pub mod qdrant;

pub use memory::MemoryVectorStore;
pub use qdrant::QdrantVectorStore;

use crate::error::SearchError;
use crate::models::{QueryFilters, SearchHit};
use async_trait::async_trait;

/// One vector plus its text and flat metadata payload, ready to persist.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    pub vector: Vec<f32>,
    pub text: String,
    pub metadata: serde_json::Value,
}

impl VectorEntry {
    pub fn document_id(&self) -> &str {
        self.metadata
            .get("document_id")
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
    }
}

#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Create the named collection with the given vector size. A no-op if
    /// it already exists with the same size.
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<(), SearchError>;

    async fn collection_exists(&self, name: &str) -> Result<bool, SearchError>;

    /// Replace every entry stored for `document_id` with `entries`.
    /// Returns the number of entries inserted.
    async fn upsert_document(
        &self,
        collection: &str,
        document_id: &str,
        entries: &[VectorEntry],
    ) -> Result<u64, SearchError>;

    /// Remove every entry stored for `document_id`, returning how many
    /// were removed. Unknown documents remove zero and succeed.
    async fn delete_document(&self, collection: &str, document_id: &str)
        -> Result<u64, SearchError>;

    /// Similarity search over the collection, optionally narrowed by
    /// metadata filters.
    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<SearchHit>, SearchError>;
}

/// Whether an entry's metadata satisfies every set filter. Shared between
/// the in-memory backend and tests.
pub(crate) fn metadata_matches(metadata: &serde_json::Value, filters: &QueryFilters) -> bool {
    let field = |key: &str| metadata.get(key).and_then(serde_json::Value::as_str);

    if let Some(document_id) = &filters.document_id {
        if field("document_id") != Some(document_id.as_str()) {
            return false;
        }
    }
    if let Some(chunk_type) = filters.chunk_type {
        if field("chunk_type") != Some(chunk_type.to_string().as_str()) {
            return false;
        }
    }
    if let Some(clause_number) = &filters.clause_number {
        if field("clause_number") != Some(clause_number.as_str()) {
            return false;
        }
    }
    if let Some(section_number) = &filters.section_number {
        if field("section_number") != Some(section_number.as_str()) {
            return false;
        }
    }
    true
}
