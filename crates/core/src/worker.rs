//! The ingestion worker: drains the job queue and runs documents through
//! fetch, extract, segment, embed, and persist.
//!
//! Any stage failure ends in exactly one `Failed` status write with the
//! reason recorded on the metadata record; the worker itself survives and
//! moves on to the next job. A watchdog bounds each document end to end.

use crate::embeddings::EmbeddingOrchestrator;
use crate::error::{PipelineError, Result};
use crate::extractor::extractor_for_locator;
use crate::lifecycle::LifecycleTracker;
use crate::models::{DocumentStatus, JobDescriptor, PipelineConfig, ProgressEvent};
use crate::progress::ProgressPublisher;
use crate::queue::JobQueue;
use crate::segmentation::{detect_document_kind, segment};
use crate::storage::ObjectStorage;
use crate::stores::{VectorEntry, VectorStore};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

const DEQUEUE_WAIT: Duration = Duration::from_secs(5);

pub struct IngestionWorker {
    queue: Arc<dyn JobQueue>,
    storage: Arc<dyn ObjectStorage>,
    embedder: EmbeddingOrchestrator,
    vectors: Arc<dyn VectorStore>,
    lifecycle: Arc<LifecycleTracker>,
    publisher: Arc<ProgressPublisher>,
    config: PipelineConfig,
}

impl IngestionWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<dyn JobQueue>,
        storage: Arc<dyn ObjectStorage>,
        embedder: EmbeddingOrchestrator,
        vectors: Arc<dyn VectorStore>,
        lifecycle: Arc<LifecycleTracker>,
        publisher: Arc<ProgressPublisher>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            queue,
            storage,
            embedder,
            vectors,
            lifecycle,
            publisher,
            config,
        }
    }

    /// Long-running worker loop. Returns only if the queue errors.
    pub async fn run(&self) -> Result<()> {
        loop {
            if let Some(job) = self.queue.dequeue(DEQUEUE_WAIT).await? {
                self.process(job).await;
            }
        }
    }

    /// Drain every job currently queued, then return. Used by the CLI's
    /// one-shot mode and by tests.
    pub async fn run_pending(&self) -> Result<()> {
        while let Some(job) = self.queue.dequeue(Duration::from_millis(50)).await? {
            self.process(job).await;
        }
        Ok(())
    }

    /// Run one job to a terminal status. Never propagates job errors;
    /// those end up on the document record.
    pub async fn process(&self, job: JobDescriptor) {
        let document_id = job.document_id.clone();
        let budget = Duration::from_secs(self.config.job_timeout_secs);

        let outcome = match tokio::time::timeout(budget, self.execute(&job)).await {
            Ok(result) => result,
            Err(_) => Err(PipelineError::Timeout(self.config.job_timeout_secs)),
        };

        match outcome {
            Ok((page_count, chunk_count)) => {
                info!(document_id, page_count, chunk_count, "document ingested");
            }
            Err(pipeline_error) => {
                error!(document_id, error = %pipeline_error, "document failed");
                self.scrub_vectors(&job.collection_name, &document_id).await;
                self.finalize_failure(&document_id, &pipeline_error).await;
            }
        }
        self.publisher.drain(&document_id);
    }

    async fn execute(&self, job: &JobDescriptor) -> Result<(u32, u64)> {
        let document_id = &job.document_id;
        let record = self.lifecycle.get(document_id).await?;
        self.lifecycle
            .transition(document_id, DocumentStatus::Processing, None)
            .await?;

        let bytes = self.storage.fetch(&job.source_locator).await?;
        self.emit(document_id, "Document fetched", 0.15);

        let extractor = extractor_for_locator(&job.source_locator)?;
        let extracted = extractor.extract(&bytes)?;
        if extracted.text.trim().is_empty() {
            return Err(PipelineError::Extraction(
                "document contains no extractable text".to_string(),
            ));
        }
        self.emit(document_id, "Text extracted", 0.30);

        let detection = detect_document_kind(&extracted.text, &record.filename, &self.config)?;
        let (segments, outcome) =
            segment(&extracted.text, document_id, detection.kind, &self.config)?;
        let message = match &outcome.fallback_reason {
            Some(reason) => {
                warn!(document_id, reason, "fell back to generic segmentation");
                format!("Segmented generically ({reason})")
            }
            None => format!("Segmented as {:?} ({})", outcome.kind_used, detection.reason),
        };
        self.emit(document_id, &message, 0.50);

        let vectors = self.embedder.embed_segments(&segments).await?;
        self.emit(document_id, "Embeddings computed", 0.70);

        self.vectors
            .create_collection(&job.collection_name, self.embedder.dimensions())
            .await?;
        let entries: Vec<VectorEntry> = segments
            .iter()
            .zip(vectors)
            .map(|(segment, vector)| VectorEntry {
                vector,
                text: segment.text.clone(),
                metadata: segment.payload(&record.filename),
            })
            .collect();
        let persisted = self
            .vectors
            .upsert_document(&job.collection_name, document_id, &entries)
            .await?;
        self.emit(document_id, "Vectors persisted", 0.90);

        self.lifecycle
            .complete(document_id, extracted.page_count, persisted)
            .await?;
        Ok((extracted.page_count, persisted))
    }

    /// Remove whatever the persist stage may have written before the
    /// failure is recorded. A document marked `Failed` must never match a
    /// search, even when the failure landed after the upsert (say, a
    /// watchdog timeout during the final status write).
    async fn scrub_vectors(&self, collection: &str, document_id: &str) {
        if let Err(cleanup_error) = self.vectors.delete_document(collection, document_id).await {
            // Usually just "collection not created yet" when the job
            // failed before the persist stage.
            warn!(document_id, error = %cleanup_error, "vector scrub after failure incomplete");
        }
    }

    /// Single `Failed` write; if even that fails the error is only logged
    /// so the worker can keep serving the queue.
    async fn finalize_failure(&self, document_id: &str, pipeline_error: &PipelineError) {
        if let Err(status_error) = self
            .lifecycle
            .fail(document_id, pipeline_error.to_string())
            .await
        {
            error!(document_id, error = %status_error, "could not record failure");
        }
    }

    fn emit(&self, document_id: &str, message: &str, progress: f32) {
        self.publisher.publish(ProgressEvent::new(
            document_id,
            DocumentStatus::Processing,
            message,
            progress,
        ));
    }
}
