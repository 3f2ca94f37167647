//! Hierarchy-preserving text segmentation.
//!
//! Two paths share one entry point: the clause-aware parser for legal
//! documents and the recursive size-bounded splitter for everything else.
//! A legal classification that turns out to have no parsable structure
//! falls back to the generic path instead of failing the document, and
//! the fallback reason is surfaced to the caller.

mod clause;
mod detect;
mod generic;

pub use clause::{parse_clause_pieces, ClausePiece};
pub use detect::{detect_document_kind, Detection, DocumentKind};
pub use generic::split_generic;

use crate::error::Result;
use crate::models::{ChunkType, PipelineConfig, Segment};
use tracing::{info, warn};

/// How a document was actually segmented.
#[derive(Debug, Clone)]
pub struct SegmentationOutcome {
    pub kind_used: DocumentKind,
    /// Set when a legal classification fell back to generic splitting.
    pub fallback_reason: Option<String>,
}

/// Segment a document's extracted text into retrieval units.
///
/// Pure function over the text: segments come back with contiguous
/// `sequence_index` values starting at 0 and never carry I/O state.
/// Empty input yields zero segments, which is not an error.
pub fn segment(
    text: &str,
    document_id: &str,
    kind: DocumentKind,
    config: &PipelineConfig,
) -> Result<(Vec<Segment>, SegmentationOutcome)> {
    if text.trim().is_empty() {
        return Ok((
            Vec::new(),
            SegmentationOutcome {
                kind_used: kind,
                fallback_reason: None,
            },
        ));
    }

    match kind {
        DocumentKind::Legal => match parse_clause_pieces(text, config) {
            Ok(pieces) => {
                let segments = assemble_clause_segments(pieces, document_id);
                info!(
                    document_id,
                    segment_count = segments.len(),
                    "clause-aware segmentation complete"
                );
                Ok((
                    segments,
                    SegmentationOutcome {
                        kind_used: DocumentKind::Legal,
                        fallback_reason: None,
                    },
                ))
            }
            Err(error) if error.is_recoverable() => {
                let reason = error.to_string();
                warn!(document_id, %reason, "falling back to generic segmentation");
                let segments = assemble_generic_segments(text, document_id, config);
                Ok((
                    segments,
                    SegmentationOutcome {
                        kind_used: DocumentKind::Generic,
                        fallback_reason: Some(reason),
                    },
                ))
            }
            Err(error) => Err(error),
        },
        DocumentKind::Generic => {
            let segments = assemble_generic_segments(text, document_id, config);
            info!(
                document_id,
                segment_count = segments.len(),
                "generic segmentation complete"
            );
            Ok((
                segments,
                SegmentationOutcome {
                    kind_used: DocumentKind::Generic,
                    fallback_reason: None,
                },
            ))
        }
    }
}

fn assemble_clause_segments(pieces: Vec<ClausePiece>, document_id: &str) -> Vec<Segment> {
    pieces
        .into_iter()
        .enumerate()
        .map(|(index, piece)| Segment {
            char_count: piece.text.chars().count(),
            text: piece.text,
            document_id: document_id.to_string(),
            sequence_index: index as u64,
            page_number: None,
            chunk_type: piece.chunk_type,
            clause: piece.clause,
        })
        .collect()
}

fn assemble_generic_segments(
    text: &str,
    document_id: &str,
    config: &PipelineConfig,
) -> Vec<Segment> {
    split_generic(text, config.generic_chunk_chars, config.generic_overlap_chars)
        .into_iter()
        .enumerate()
        .map(|(index, chunk)| Segment {
            char_count: chunk.chars().count(),
            text: chunk,
            document_id: document_id.to_string(),
            sequence_index: index as u64,
            page_number: None,
            chunk_type: ChunkType::Generic,
            clause: None,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn empty_input_yields_zero_segments() {
        let (segments, outcome) =
            segment("", "doc-1", DocumentKind::Legal, &config()).expect("segment should succeed");
        assert!(segments.is_empty());
        assert!(outcome.fallback_reason.is_none());
    }

    #[test]
    fn sequence_indexes_are_contiguous_from_zero() {
        let text = "1.1 First clause body that is long enough to stand on its own two feet.\n\
                    1.2 Second clause body that is also long enough to stand entirely alone.\n\
                    1.3 Third clause body rounding out the section with sufficient length too.\n";
        let (segments, _) =
            segment(text, "doc-1", DocumentKind::Legal, &config()).expect("segment should succeed");
        let indexes: Vec<u64> = segments.iter().map(|s| s.sequence_index).collect();
        let expected: Vec<u64> = (0..segments.len() as u64).collect();
        assert_eq!(indexes, expected);
        assert!(segments.iter().all(|s| s.document_id == "doc-1"));
    }

    #[test]
    fn misclassified_legal_text_falls_back_to_generic() {
        let text = "This memo has no numbered structure whatsoever, only flowing prose \
                    about quarterly results and the company picnic schedule.";
        let (segments, outcome) =
            segment(text, "doc-1", DocumentKind::Legal, &config()).expect("segment should succeed");
        assert!(!segments.is_empty());
        assert_eq!(outcome.kind_used, DocumentKind::Generic);
        assert!(outcome
            .fallback_reason
            .as_deref()
            .is_some_and(|reason| reason.contains("no section or clause headers")));
        assert!(segments.iter().all(|s| s.chunk_type == ChunkType::Generic));
    }

    #[test]
    fn legal_path_scenario_produces_annotated_clause_segments() {
        let text = "5.1 Termination. Either party may terminate with 30 days notice.\n\
                    5.2 Confidentiality. Each party shall keep all deal terms strictly private.";
        let (segments, outcome) =
            segment(text, "doc-1", DocumentKind::Legal, &config()).expect("segment should succeed");
        assert_eq!(outcome.kind_used, DocumentKind::Legal);
        assert_eq!(segments.len(), 2);
        for (segment, expected_number) in segments.iter().zip(["5.1", "5.2"]) {
            assert_eq!(segment.chunk_type, ChunkType::Clause);
            let clause = segment.clause.as_ref().expect("clause annotation expected");
            assert_eq!(clause.clause_number, expected_number);
            assert_eq!(clause.hierarchy_level, 2);
        }
    }

    #[test]
    fn char_counts_match_segment_text() {
        let text = "An ordinary note with enough words to form a single generic segment.";
        let (segments, _) = segment(text, "doc-1", DocumentKind::Generic, &config())
            .expect("segment should succeed");
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].char_count, segments[0].text.chars().count());
    }
}
