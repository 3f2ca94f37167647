use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A unit of work handed from the upload side to a worker.
///
/// Immutable once created; travels through the job queue as serialized
/// JSON. Delivery is at-least-once, so everything downstream of a
/// descriptor must be idempotent per `document_id`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDescriptor {
    pub document_id: String,
    pub source_locator: String,
    pub collection_name: String,
    pub enqueued_at: DateTime<Utc>,
}

/// Processing status of a document, strictly ordered:
/// `Queued -> Processing -> (Completed | Failed)`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DocumentStatus {
    Queued,
    Processing,
    Completed,
    Failed,
}

impl DocumentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, DocumentStatus::Completed | DocumentStatus::Failed)
    }

    /// Legal moves in the lifecycle state machine. A queued document may
    /// fail before it ever starts processing (e.g. queue poison), but no
    /// transition leaves a terminal state.
    pub fn can_transition_to(self, next: DocumentStatus) -> bool {
        matches!(
            (self, next),
            (DocumentStatus::Queued, DocumentStatus::Processing)
                | (DocumentStatus::Queued, DocumentStatus::Failed)
                | (DocumentStatus::Processing, DocumentStatus::Completed)
                | (DocumentStatus::Processing, DocumentStatus::Failed)
        )
    }
}

impl std::fmt::Display for DocumentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            DocumentStatus::Queued => "queued",
            DocumentStatus::Processing => "processing",
            DocumentStatus::Completed => "completed",
            DocumentStatus::Failed => "failed",
        };
        f.write_str(label)
    }
}

/// Metadata ledger entry for one uploaded document.
///
/// Created by the upload handler in status `Queued` and owned exclusively
/// by the worker while processing. `chunk_count` equals the number of
/// segments actually persisted to the vector store once the status is
/// `Completed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub document_id: String,
    pub filename: String,
    pub status: DocumentStatus,
    pub error_detail: Option<String>,
    pub page_count: u32,
    pub chunk_count: u64,
    pub byte_size: u64,
    pub collection_name: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl DocumentRecord {
    pub fn new(
        document_id: impl Into<String>,
        filename: impl Into<String>,
        byte_size: u64,
        collection_name: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            document_id: document_id.into(),
            filename: filename.into(),
            status: DocumentStatus::Queued,
            error_detail: None,
            page_count: 0,
            chunk_count: 0,
            byte_size,
            collection_name: collection_name.into(),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ChunkType {
    Clause,
    Generic,
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Clause => f.write_str("clause"),
            ChunkType::Generic => f.write_str("generic"),
        }
    }
}

/// Structural metadata attached to a clause-aware chunk.
///
/// `clause_number` is preserved exactly as matched, with a trailing period
/// stripped and internal dots kept. `hierarchy_level` is the count of
/// dot-separated components (`5` -> 1, `5.1` -> 2, `5.1.1` -> 3).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClauseAnnotation {
    pub clause_number: String,
    pub section_number: String,
    pub section_title: String,
    pub hierarchy_level: u32,
}

/// The retrievable unit: one contiguous span of document text plus its
/// metadata. Immutable once created; `sequence_index` values per document
/// form a contiguous ascending range starting at 0.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Segment {
    pub text: String,
    pub document_id: String,
    pub sequence_index: u64,
    pub page_number: Option<u32>,
    pub char_count: usize,
    pub chunk_type: ChunkType,
    pub clause: Option<ClauseAnnotation>,
}

impl Segment {
    /// Flat metadata payload stored next to the vector. Keys are stable so
    /// the query path can filter on them.
    pub fn payload(&self, filename: &str) -> serde_json::Value {
        let mut payload = serde_json::json!({
            "document_id": self.document_id,
            "filename": filename,
            "sequence_index": self.sequence_index,
            "page_number": self.page_number,
            "char_count": self.char_count,
            "chunk_type": self.chunk_type.to_string(),
        });
        if let Some(clause) = &self.clause {
            payload["clause_number"] = serde_json::json!(clause.clause_number);
            payload["section_number"] = serde_json::json!(clause.section_number);
            payload["section_title"] = serde_json::json!(clause.section_title);
            payload["hierarchy_level"] = serde_json::json!(clause.hierarchy_level);
        }
        payload
    }
}

/// Transient status notification for progress subscribers. Never
/// persisted; loss of an event must not affect the `DocumentRecord`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub document_id: String,
    pub status: DocumentStatus,
    pub message: String,
    pub progress: f32,
    pub emitted_at: DateTime<Utc>,
}

impl ProgressEvent {
    pub fn new(
        document_id: impl Into<String>,
        status: DocumentStatus,
        message: impl Into<String>,
        progress: f32,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            status,
            message: message.into(),
            progress: progress.clamp(0.0, 1.0),
            emitted_at: Utc::now(),
        }
    }
}

/// Metadata filters for the read-side similarity search.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct QueryFilters {
    pub document_id: Option<String>,
    pub chunk_type: Option<ChunkType>,
    pub clause_number: Option<String>,
    pub section_number: Option<String>,
}

impl QueryFilters {
    pub fn is_empty(&self) -> bool {
        self.document_id.is_none()
            && self.chunk_type.is_none()
            && self.clause_number.is_none()
            && self.section_number.is_none()
    }
}

/// One ranked result from a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchHit {
    pub text: String,
    pub score: f64,
    pub document_id: String,
    pub metadata: serde_json::Value,
}

/// Pipeline tunables with explicit defaults.
///
/// The clause-chunk bounds (40/1500 chars) and the generic splitter
/// geometry (500 chars with 50 overlap) match the contract corpus this
/// pipeline was tuned on; detection thresholds are the cue densities that
/// classify a document as legal.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Minimum characters for a clause chunk before it merges forward.
    pub legal_min_chunk_chars: usize,
    /// Maximum characters for a clause chunk before its body is split.
    pub legal_max_chunk_chars: usize,
    /// Target characters per generic chunk.
    pub generic_chunk_chars: usize,
    /// Characters of overlap between adjacent generic chunks.
    pub generic_overlap_chars: usize,
    /// How much of the extracted text the type detector inspects.
    pub detection_sample_chars: usize,
    /// Dotted clause numbers needed in the sample to classify as legal.
    pub clause_cue_threshold: usize,
    /// Section/article headings needed in the sample to classify as legal.
    pub section_cue_threshold: usize,
    /// Distinct legal vocabulary terms needed to classify as legal.
    pub legal_term_threshold: usize,
    /// Texts per call to the embedding provider.
    pub embedding_batch_size: usize,
    /// Watchdog budget for one document end to end.
    pub job_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            legal_min_chunk_chars: 40,
            legal_max_chunk_chars: 1_500,
            generic_chunk_chars: 500,
            generic_overlap_chars: 50,
            detection_sample_chars: 5_000,
            clause_cue_threshold: 3,
            section_cue_threshold: 2,
            legal_term_threshold: 5,
            embedding_batch_size: 32,
            job_timeout_secs: 300,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states_admit_no_transitions() {
        for terminal in [DocumentStatus::Completed, DocumentStatus::Failed] {
            for next in [
                DocumentStatus::Queued,
                DocumentStatus::Processing,
                DocumentStatus::Completed,
                DocumentStatus::Failed,
            ] {
                assert!(!terminal.can_transition_to(next));
            }
        }
    }

    #[test]
    fn queued_may_fail_without_processing() {
        assert!(DocumentStatus::Queued.can_transition_to(DocumentStatus::Failed));
        assert!(!DocumentStatus::Queued.can_transition_to(DocumentStatus::Completed));
    }

    #[test]
    fn progress_is_clamped_to_unit_interval() {
        let event = ProgressEvent::new("doc-1", DocumentStatus::Processing, "halfway", 1.7);
        assert_eq!(event.progress, 1.0);
        let event = ProgressEvent::new("doc-1", DocumentStatus::Processing, "start", -0.2);
        assert_eq!(event.progress, 0.0);
    }

    #[test]
    fn segment_payload_includes_clause_fields() {
        let segment = Segment {
            text: "5.1 Termination.".to_string(),
            document_id: "doc-1".to_string(),
            sequence_index: 0,
            page_number: None,
            char_count: 16,
            chunk_type: ChunkType::Clause,
            clause: Some(ClauseAnnotation {
                clause_number: "5.1".to_string(),
                section_number: "5".to_string(),
                section_title: "Termination".to_string(),
                hierarchy_level: 2,
            }),
        };
        let payload = segment.payload("contract.pdf");
        assert_eq!(payload["clause_number"], "5.1");
        assert_eq!(payload["hierarchy_level"], 2);
        assert_eq!(payload["chunk_type"], "clause");
    }
}
