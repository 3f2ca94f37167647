use crate::error::Result;
use crate::models::PipelineConfig;
use regex::Regex;

/// Which segmentation path a document should take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Legal,
    Generic,
}

/// Classification outcome plus the cue that decided it, so the decision
/// can be surfaced in progress messages.
#[derive(Debug, Clone)]
pub struct Detection {
    pub kind: DocumentKind,
    pub reason: String,
}

const LEGAL_FILENAME_KEYWORDS: [&str; 11] = [
    "contract",
    "agreement",
    "clause",
    "terms",
    "conditions",
    "legal",
    "policy",
    "nda",
    "mou",
    "sla",
    "msa",
];

const LEGAL_TERMS: [&str; 11] = [
    "whereas",
    "hereinafter",
    "party",
    "parties",
    "terminate",
    "termination",
    "indemnify",
    "liability",
    "agreement",
    "contract",
    "executed",
];

/// Classify a document as legal or generic from its filename and a bounded
/// prefix of the extracted text.
///
/// Order of cues: filename keywords, then dotted clause-number density and
/// section-heading density in the sample, then legal vocabulary density.
/// A filename hit alone is enough, which is why the clause parser must
/// tolerate structureless text downstream.
pub fn detect_document_kind(
    text: &str,
    filename: &str,
    config: &PipelineConfig,
) -> Result<Detection> {
    let filename_lower = filename.to_lowercase();
    if let Some(keyword) = LEGAL_FILENAME_KEYWORDS
        .iter()
        .find(|keyword| filename_lower.contains(**keyword))
    {
        return Ok(Detection {
            kind: DocumentKind::Legal,
            reason: format!("filename contains '{keyword}'"),
        });
    }

    let sample: String = text.chars().take(config.detection_sample_chars).collect();

    let clause_re = Regex::new(r"\b\d+\.\d+(?:\.\d+)*\s+")?;
    let section_re = Regex::new(r"\b(?:Article|Section|ARTICLE|SECTION|Clause|CLAUSE)\s+\d+")?;

    let clause_count = clause_re.find_iter(&sample).count();
    let section_count = section_re.find_iter(&sample).count();

    if clause_count >= config.clause_cue_threshold || section_count >= config.section_cue_threshold
    {
        return Ok(Detection {
            kind: DocumentKind::Legal,
            reason: format!(
                "{clause_count} clause numbers and {section_count} section headings in sample"
            ),
        });
    }

    let sample_lower = sample.to_lowercase();
    let term_count = LEGAL_TERMS
        .iter()
        .filter(|term| sample_lower.contains(**term))
        .count();

    if term_count >= config.legal_term_threshold {
        return Ok(Detection {
            kind: DocumentKind::Legal,
            reason: format!("{term_count} legal terms in sample"),
        });
    }

    Ok(Detection {
        kind: DocumentKind::Generic,
        reason: format!(
            "insufficient cues (clauses: {clause_count}, sections: {section_count}, terms: {term_count})"
        ),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PipelineConfig {
        PipelineConfig::default()
    }

    #[test]
    fn filename_keyword_classifies_as_legal() {
        let detection = detect_document_kind("plain prose", "master_agreement.pdf", &config())
            .expect("detection should succeed");
        assert_eq!(detection.kind, DocumentKind::Legal);
        assert!(detection.reason.contains("agreement"));
    }

    #[test]
    fn clause_density_classifies_as_legal() {
        let text = "1.1 First obligation\n1.2 Second obligation\n1.3 Third obligation\n";
        let detection =
            detect_document_kind(text, "scan.pdf", &config()).expect("detection should succeed");
        assert_eq!(detection.kind, DocumentKind::Legal);
    }

    #[test]
    fn section_headings_classify_as_legal() {
        let text = "Article 1 Scope\nSome text.\nArticle 2 Definitions\nMore text.";
        let detection =
            detect_document_kind(text, "scan.pdf", &config()).expect("detection should succeed");
        assert_eq!(detection.kind, DocumentKind::Legal);
    }

    #[test]
    fn plain_prose_is_generic() {
        let text = "The weather was fine and the harvest plentiful that year.";
        let detection =
            detect_document_kind(text, "memoir.pdf", &config()).expect("detection should succeed");
        assert_eq!(detection.kind, DocumentKind::Generic);
        assert!(detection.reason.contains("insufficient cues"));
    }

    #[test]
    fn detection_only_inspects_the_sample_prefix() {
        let mut text = "a ".repeat(3_000);
        text.push_str("1.1 Late clause\n1.2 Later clause\n1.3 Latest clause\n");
        let detection =
            detect_document_kind(&text, "notes.txt", &config()).expect("detection should succeed");
        assert_eq!(detection.kind, DocumentKind::Generic);
    }
}
