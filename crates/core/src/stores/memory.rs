//! In-memory vector store for tests and local development.

use super::{metadata_matches, VectorEntry, VectorStore};
use crate::error::SearchError;
use crate::models::{QueryFilters, SearchHit};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

struct Collection {
    vector_size: usize,
    entries: Vec<VectorEntry>,
}

/// Brute-force cosine-similarity store. Keeps everything in memory;
/// suitable for tests and single-node trials, not for large corpora.
#[derive(Default)]
pub struct MemoryVectorStore {
    collections: RwLock<HashMap<String, Collection>>,
}

impl MemoryVectorStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }
        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm_a == 0.0 || norm_b == 0.0 {
            return 0.0;
        }
        dot / (norm_a * norm_b)
    }
}

#[async_trait]
impl VectorStore for MemoryVectorStore {
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<(), SearchError> {
        let mut collections = self.collections.write().await;
        match collections.get(name) {
            Some(existing) if existing.vector_size != vector_size => {
                Err(SearchError::Request(format!(
                    "collection {name} exists with vector size {}, requested {vector_size}",
                    existing.vector_size
                )))
            }
            Some(_) => Ok(()),
            None => {
                collections.insert(
                    name.to_string(),
                    Collection {
                        vector_size,
                        entries: Vec::new(),
                    },
                );
                debug!(collection = name, vector_size, "created collection");
                Ok(())
            }
        }
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, SearchError> {
        Ok(self.collections.read().await.contains_key(name))
    }

    async fn upsert_document(
        &self,
        collection: &str,
        document_id: &str,
        entries: &[VectorEntry],
    ) -> Result<u64, SearchError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| SearchError::CollectionNotFound(collection.to_string()))?;

        for entry in entries {
            if entry.vector.len() != target.vector_size {
                return Err(SearchError::Request(format!(
                    "vector dimension {} does not match collection size {}",
                    entry.vector.len(),
                    target.vector_size
                )));
            }
        }

        target
            .entries
            .retain(|entry| entry.document_id() != document_id);
        target.entries.extend_from_slice(entries);
        debug!(
            collection,
            document_id,
            count = entries.len(),
            "replaced document entries"
        );
        Ok(entries.len() as u64)
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, SearchError> {
        let mut collections = self.collections.write().await;
        let target = collections
            .get_mut(collection)
            .ok_or_else(|| SearchError::CollectionNotFound(collection.to_string()))?;

        let before = target.entries.len();
        target
            .entries
            .retain(|entry| entry.document_id() != document_id);
        Ok((before - target.entries.len()) as u64)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let collections = self.collections.read().await;
        let target = collections
            .get(collection)
            .ok_or_else(|| SearchError::CollectionNotFound(collection.to_string()))?;

        let mut scored: Vec<(f32, &VectorEntry)> = target
            .entries
            .iter()
            .filter(|entry| metadata_matches(&entry.metadata, filters))
            .map(|entry| (Self::cosine_similarity(query_vector, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(score, entry)| SearchHit {
                text: entry.text.clone(),
                score: score as f64,
                document_id: entry.document_id().to_string(),
                metadata: entry.metadata.clone(),
            })
            .collect())
    }
}
