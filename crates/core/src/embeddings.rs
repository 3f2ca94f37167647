use crate::error::{PipelineError, Result};
use crate::models::Segment;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::debug;

pub const DEFAULT_EMBEDDING_DIMENSIONS: usize = 384;

/// Pluggable embedding backend. Selected via configuration at startup;
/// the pipeline only ever sees this capability.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed one batch of texts. Output order matches input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    fn dimensions(&self) -> usize;

    fn model_name(&self) -> &str;
}

/// Local, deterministic embedder: FNV-hashed character trigrams bucketed
/// into a normalized vector. No model download, useful offline and in
/// tests; retrieval quality is what you'd expect from a hash.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    pub dimensions: usize,
}

impl Default for HashEmbedder {
    fn default() -> Self {
        Self {
            dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl HashEmbedder {
    pub fn embed_one(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0f32; self.dimensions.max(1)];
        let lowered = text.to_lowercase();
        let chars: Vec<char> = lowered.chars().collect();

        if chars.is_empty() {
            return vector;
        }

        for window in chars.windows(3) {
            let token = window.iter().collect::<String>();
            let mut hash = 1469598103934665603u64;
            for byte in token.bytes() {
                hash ^= byte as u64;
                hash = hash.wrapping_mul(1099511628211);
            }
            let bucket = (hash % vector.len() as u64) as usize;
            vector[bucket] += 1.0;
        }

        let magnitude = vector.iter().map(|value| value * value).sum::<f32>().sqrt();
        if magnitude > 0.0 {
            for value in &mut vector {
                *value /= magnitude;
            }
        }

        vector
    }
}

#[async_trait]
impl EmbeddingProvider for HashEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts.iter().map(|text| self.embed_one(text)).collect())
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        "hash-trigram"
    }
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// Remote embedding provider speaking the Ollama batch embed API.
pub struct OllamaEmbedder {
    endpoint: String,
    model: String,
    dimensions: usize,
    client: reqwest::Client,
}

impl OllamaEmbedder {
    pub fn new(endpoint: impl Into<String>, model: impl Into<String>, dimensions: usize) -> Self {
        Self {
            endpoint: endpoint.into(),
            model: model.into(),
            dimensions,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl EmbeddingProvider for OllamaEmbedder {
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let response = self
            .client
            .post(format!("{}/api/embed", self.endpoint))
            .json(&OllamaEmbedRequest {
                model: &self.model,
                input: texts,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(PipelineError::Embedding(format!(
                "embedding endpoint returned {}",
                response.status()
            )));
        }

        let parsed: OllamaEmbedResponse = response.json().await?;
        if parsed.embeddings.len() != texts.len() {
            return Err(PipelineError::Embedding(format!(
                "provider returned {} vectors for {} texts",
                parsed.embeddings.len(),
                texts.len()
            )));
        }
        Ok(parsed.embeddings)
    }

    fn dimensions(&self) -> usize {
        self.dimensions
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Batches segments into bounded-size provider calls.
///
/// Batches for one document are dispatched concurrently; output order is
/// restored by tagging each batch with its originating offset before
/// merging. Any batch failure fails the whole document's embedding step —
/// vectors already computed are discarded, never persisted.
pub struct EmbeddingOrchestrator {
    provider: Arc<dyn EmbeddingProvider>,
    batch_size: usize,
}

impl EmbeddingOrchestrator {
    pub fn new(provider: Arc<dyn EmbeddingProvider>, batch_size: usize) -> Self {
        Self {
            provider,
            batch_size: batch_size.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.provider.dimensions()
    }

    /// Embed every segment, returning vectors aligned with the input
    /// order within and across batches.
    pub async fn embed_segments(&self, segments: &[Segment]) -> Result<Vec<Vec<f32>>> {
        if segments.is_empty() {
            return Ok(Vec::new());
        }

        let mut tasks = JoinSet::new();
        let batch_count = segments.len().div_ceil(self.batch_size);
        for (batch_index, batch) in segments.chunks(self.batch_size).enumerate() {
            let texts: Vec<String> = batch.iter().map(|segment| segment.text.clone()).collect();
            let provider = self.provider.clone();
            tasks.spawn(async move {
                let vectors = provider.embed_batch(&texts).await?;
                if vectors.len() != texts.len() {
                    return Err(PipelineError::Embedding(format!(
                        "batch {batch_index} returned {} vectors for {} texts",
                        vectors.len(),
                        texts.len()
                    )));
                }
                Ok::<_, PipelineError>((batch_index, vectors))
            });
        }

        let mut slots: Vec<Option<Vec<Vec<f32>>>> = vec![None; batch_count];
        while let Some(joined) = tasks.join_next().await {
            let (batch_index, vectors) = joined
                .map_err(|error| PipelineError::Embedding(format!("embedding task failed: {error}")))??;
            slots[batch_index] = Some(vectors);
        }
        debug!(
            segment_count = segments.len(),
            batch_count, "embedding batches merged"
        );

        let dimensions = self.provider.dimensions();
        let mut out = Vec::with_capacity(segments.len());
        for slot in slots {
            let vectors = slot.ok_or_else(|| {
                PipelineError::Embedding("a batch completed without a result".to_string())
            })?;
            for vector in vectors {
                if vector.len() != dimensions {
                    return Err(PipelineError::Embedding(format!(
                        "embedding dimension {} does not match configured {}",
                        vector.len(),
                        dimensions
                    )));
                }
                out.push(vector);
            }
        }
        Ok(out)
    }
}
