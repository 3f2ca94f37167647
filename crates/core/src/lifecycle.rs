use crate::error::{PipelineError, Result};
use crate::models::{DocumentRecord, DocumentStatus, ProgressEvent};
use crate::progress::ProgressPublisher;
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Durable key-value persistence for document records.
#[async_trait]
pub trait MetadataStore: Send + Sync {
    async fn put(&self, record: DocumentRecord) -> Result<()>;
    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>>;
}

/// In-process metadata store; the injected default and the test double.
#[derive(Default)]
pub struct MemoryMetadataStore {
    records: RwLock<HashMap<String, DocumentRecord>>,
}

impl MemoryMetadataStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl MetadataStore for MemoryMetadataStore {
    async fn put(&self, record: DocumentRecord) -> Result<()> {
        self.records
            .write()
            .await
            .insert(record.document_id.clone(), record);
        Ok(())
    }

    async fn get(&self, document_id: &str) -> Result<Option<DocumentRecord>> {
        Ok(self.records.read().await.get(document_id).cloned())
    }
}

/// Guards the document lifecycle state machine and keeps the metadata
/// store authoritative.
///
/// Status writes are short and atomic per document: a transition loads the
/// record, validates the move, and stores the updated record, independent
/// of whatever long-running stage prompted it. Every successful transition
/// also emits a best-effort progress event; emission can never fail or
/// block the transition.
pub struct LifecycleTracker {
    store: Arc<dyn MetadataStore>,
    publisher: Arc<ProgressPublisher>,
}

impl LifecycleTracker {
    pub fn new(store: Arc<dyn MetadataStore>, publisher: Arc<ProgressPublisher>) -> Self {
        Self { store, publisher }
    }

    /// Register a freshly uploaded document. The record arrives in status
    /// `Queued` from the upload handler.
    pub async fn create(&self, record: DocumentRecord) -> Result<DocumentRecord> {
        self.store.put(record.clone()).await?;
        self.publisher.publish(ProgressEvent::new(
            &record.document_id,
            record.status,
            "Queued for processing",
            0.0,
        ));
        Ok(record)
    }

    pub async fn get(&self, document_id: &str) -> Result<DocumentRecord> {
        self.store
            .get(document_id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(document_id.to_string()))
    }

    /// Move a document to `next`, rejecting any move the state machine
    /// does not allow.
    pub async fn transition(
        &self,
        document_id: &str,
        next: DocumentStatus,
        detail: Option<String>,
    ) -> Result<DocumentRecord> {
        self.apply(document_id, next, detail, |_| {}).await
    }

    /// Terminal success: records the processing results alongside the
    /// status change.
    pub async fn complete(
        &self,
        document_id: &str,
        page_count: u32,
        chunk_count: u64,
    ) -> Result<DocumentRecord> {
        self.apply(document_id, DocumentStatus::Completed, None, |record| {
            record.page_count = page_count;
            record.chunk_count = chunk_count;
            record.completed_at = Some(Utc::now());
        })
        .await
    }

    /// Terminal failure with a human-readable detail.
    pub async fn fail(
        &self,
        document_id: &str,
        detail: impl Into<String>,
    ) -> Result<DocumentRecord> {
        let detail = detail.into();
        self.apply(
            document_id,
            DocumentStatus::Failed,
            Some(detail.clone()),
            |record| {
                record.error_detail = Some(detail.clone());
            },
        )
        .await
    }

    async fn apply<F>(
        &self,
        document_id: &str,
        next: DocumentStatus,
        detail: Option<String>,
        mutate: F,
    ) -> Result<DocumentRecord>
    where
        F: FnOnce(&mut DocumentRecord),
    {
        let mut record = self.get(document_id).await?;
        if !record.status.can_transition_to(next) {
            return Err(PipelineError::InvalidTransition {
                from: record.status,
                to: next,
            });
        }

        record.status = next;
        record.updated_at = Utc::now();
        mutate(&mut record);
        self.store.put(record.clone()).await?;
        debug!(document_id, status = %next, "lifecycle transition");

        let message = detail.unwrap_or_else(|| default_message(next).to_string());
        let progress = match next {
            DocumentStatus::Queued => 0.0,
            DocumentStatus::Processing => 0.05,
            DocumentStatus::Completed => 1.0,
            DocumentStatus::Failed => 0.0,
        };
        self.publisher
            .publish(ProgressEvent::new(document_id, next, message, progress));

        Ok(record)
    }
}

fn default_message(status: DocumentStatus) -> &'static str {
    match status {
        DocumentStatus::Queued => "Queued for processing",
        DocumentStatus::Processing => "Processing started",
        DocumentStatus::Completed => "Processing complete",
        DocumentStatus::Failed => "Processing failed",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> (LifecycleTracker, Arc<ProgressPublisher>) {
        let publisher = Arc::new(ProgressPublisher::new());
        (
            LifecycleTracker::new(Arc::new(MemoryMetadataStore::new()), publisher.clone()),
            publisher,
        )
    }

    fn record(id: &str) -> DocumentRecord {
        DocumentRecord::new(id, "contract.pdf", 1_024, "contracts")
    }

    #[tokio::test]
    async fn full_lifecycle_reaches_completion_with_results() {
        let (tracker, _publisher) = tracker();
        tracker.create(record("doc-1")).await.expect("create");

        tracker
            .transition("doc-1", DocumentStatus::Processing, None)
            .await
            .expect("processing transition");
        let completed = tracker.complete("doc-1", 12, 48).await.expect("complete");

        assert_eq!(completed.status, DocumentStatus::Completed);
        assert_eq!(completed.page_count, 12);
        assert_eq!(completed.chunk_count, 48);
        assert!(completed.completed_at.is_some());
    }

    #[tokio::test]
    async fn terminal_states_reject_further_transitions() {
        let (tracker, _publisher) = tracker();
        tracker.create(record("doc-1")).await.expect("create");
        tracker
            .transition("doc-1", DocumentStatus::Processing, None)
            .await
            .expect("processing transition");
        tracker.fail("doc-1", "pdf was corrupt").await.expect("fail");

        let error = tracker
            .transition("doc-1", DocumentStatus::Processing, None)
            .await
            .expect_err("terminal state must reject transitions");
        assert!(matches!(error, PipelineError::InvalidTransition { .. }));

        let stored = tracker.get("doc-1").await.expect("get");
        assert_eq!(stored.status, DocumentStatus::Failed);
        assert_eq!(stored.error_detail.as_deref(), Some("pdf was corrupt"));
    }

    #[tokio::test]
    async fn skipping_processing_to_completed_is_rejected() {
        let (tracker, _publisher) = tracker();
        tracker.create(record("doc-1")).await.expect("create");
        let error = tracker
            .complete("doc-1", 1, 1)
            .await
            .expect_err("queued cannot jump to completed");
        assert!(matches!(error, PipelineError::InvalidTransition { .. }));
    }

    #[tokio::test]
    async fn unknown_documents_are_not_found() {
        let (tracker, _publisher) = tracker();
        let error = tracker.get("ghost").await.expect_err("should be missing");
        assert!(matches!(error, PipelineError::NotFound(_)));
    }

    #[tokio::test]
    async fn transitions_emit_progress_events() {
        let (tracker, publisher) = tracker();
        tracker.create(record("doc-1")).await.expect("create");

        let mut receiver = publisher.subscribe("doc-1");
        tracker
            .transition("doc-1", DocumentStatus::Processing, None)
            .await
            .expect("processing transition");

        let event = receiver.recv().await.expect("event should arrive");
        assert_eq!(event.status, DocumentStatus::Processing);
        assert_eq!(event.message, "Processing started");
    }
}
