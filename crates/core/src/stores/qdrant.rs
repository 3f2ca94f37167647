//! Qdrant-backed vector store over the HTTP API.

use super::{VectorEntry, VectorStore};
use crate::error::SearchError;
use crate::models::{QueryFilters, SearchHit};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

pub struct QdrantVectorStore {
    endpoint: String,
    client: Client,
}

impl QdrantVectorStore {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: Client::new(),
        }
    }

    /// Deterministic point id per (document, sequence) pair. Retried
    /// upserts overwrite the same points even if the preceding delete
    /// was lost.
    fn point_id(document_id: &str, sequence_index: u64) -> String {
        let digest = Sha256::digest(format!("{document_id}:{sequence_index}"));
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Uuid::from_bytes(bytes).to_string()
    }

    fn document_filter(document_id: &str) -> Value {
        json!({
            "must": [
                { "key": "document_id", "match": { "value": document_id } }
            ]
        })
    }

    fn query_filter(filters: &QueryFilters) -> Option<Value> {
        if filters.is_empty() {
            return None;
        }
        let mut must = Vec::new();
        if let Some(document_id) = &filters.document_id {
            must.push(json!({ "key": "document_id", "match": { "value": document_id } }));
        }
        if let Some(chunk_type) = filters.chunk_type {
            must.push(json!({ "key": "chunk_type", "match": { "value": chunk_type.to_string() } }));
        }
        if let Some(clause_number) = &filters.clause_number {
            must.push(json!({ "key": "clause_number", "match": { "value": clause_number } }));
        }
        if let Some(section_number) = &filters.section_number {
            must.push(json!({ "key": "section_number", "match": { "value": section_number } }));
        }
        Some(json!({ "must": must }))
    }

    async fn count_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, SearchError> {
        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/count",
                self.endpoint, collection
            ))
            .json(&json!({
                "filter": Self::document_filter(document_id),
                "exact": true,
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        Ok(parsed
            .pointer("/result/count")
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }
}

#[async_trait]
impl VectorStore for QdrantVectorStore {
    async fn create_collection(&self, name: &str, vector_size: usize) -> Result<(), SearchError> {
        if self.collection_exists(name).await? {
            return Ok(());
        }

        let response = self
            .client
            .put(format!("{}/collections/{}", self.endpoint, name))
            .json(&json!({
                "vectors": { "size": vector_size, "distance": "Cosine" }
            }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(())
    }

    async fn collection_exists(&self, name: &str) -> Result<bool, SearchError> {
        let response = self
            .client
            .get(format!("{}/collections/{}", self.endpoint, name))
            .send()
            .await?;
        Ok(response.status().is_success())
    }

    async fn upsert_document(
        &self,
        collection: &str,
        document_id: &str,
        entries: &[VectorEntry],
    ) -> Result<u64, SearchError> {
        self.delete_document(collection, document_id).await?;

        if entries.is_empty() {
            return Ok(0);
        }

        let points = entries
            .iter()
            .map(|entry| {
                let sequence_index = entry
                    .metadata
                    .get("sequence_index")
                    .and_then(Value::as_u64)
                    .unwrap_or_default();
                let mut payload = entry.metadata.clone();
                payload["text"] = json!(entry.text);
                json!({
                    "id": Self::point_id(document_id, sequence_index),
                    "vector": entry.vector,
                    "payload": payload,
                })
            })
            .collect::<Vec<_>>();

        let response = self
            .client
            .put(format!(
                "{}/collections/{}/points?wait=true",
                self.endpoint, collection
            ))
            .json(&json!({ "points": points }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(entries.len() as u64)
    }

    async fn delete_document(
        &self,
        collection: &str,
        document_id: &str,
    ) -> Result<u64, SearchError> {
        let existing = self.count_document(collection, document_id).await?;
        if existing == 0 {
            return Ok(0);
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/delete?wait=true",
                self.endpoint, collection
            ))
            .json(&json!({ "filter": Self::document_filter(document_id) }))
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }
        Ok(existing)
    }

    async fn search(
        &self,
        collection: &str,
        query_vector: &[f32],
        top_k: usize,
        filters: &QueryFilters,
    ) -> Result<Vec<SearchHit>, SearchError> {
        let mut body = json!({
            "vector": query_vector,
            "limit": top_k,
            "with_payload": true,
        });
        if let Some(filter) = Self::query_filter(filters) {
            body["filter"] = filter;
        }

        let response = self
            .client
            .post(format!(
                "{}/collections/{}/points/search",
                self.endpoint, collection
            ))
            .json(&body)
            .send()
            .await?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(SearchError::CollectionNotFound(collection.to_string()));
        }
        if !response.status().is_success() {
            return Err(SearchError::BackendResponse {
                backend: "qdrant".to_string(),
                details: response.status().to_string(),
            });
        }

        let parsed: Value = response.json().await?;
        let hits = parsed
            .pointer("/result")
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();

        let mut results = Vec::new();
        for hit in hits {
            let score = hit.pointer("/score").and_then(Value::as_f64).unwrap_or(0.0);
            let text = hit
                .pointer("/payload/text")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let document_id = hit
                .pointer("/payload/document_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            let metadata = hit.pointer("/payload").cloned().unwrap_or(Value::Null);

            results.push(SearchHit {
                text,
                score,
                document_id,
                metadata,
            });
        }
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ChunkType;

    #[test]
    fn point_ids_are_stable_and_distinct() {
        let a = QdrantVectorStore::point_id("doc-1", 0);
        let b = QdrantVectorStore::point_id("doc-1", 0);
        let c = QdrantVectorStore::point_id("doc-1", 1);
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn empty_filters_produce_no_filter_clause() {
        assert!(QdrantVectorStore::query_filter(&QueryFilters::default()).is_none());
    }

    #[test]
    fn set_filters_become_must_clauses() {
        let filters = QueryFilters {
            document_id: Some("doc-1".to_string()),
            chunk_type: Some(ChunkType::Clause),
            clause_number: None,
            section_number: Some("5".to_string()),
        };
        let filter = QdrantVectorStore::query_filter(&filters).expect("filter");
        let must = filter["must"].as_array().expect("must array");
        assert_eq!(must.len(), 3);
        assert_eq!(must[0]["key"], "document_id");
        assert_eq!(must[1]["match"]["value"], "clause");
    }
}
