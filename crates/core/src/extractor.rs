//! Text extraction from uploaded document bytes.

use crate::error::{PipelineError, Result};
use lopdf::Document;

/// Extracted plain text plus the page count the extractor observed.
#[derive(Debug, Clone)]
pub struct ExtractedText {
    pub text: String,
    pub page_count: u32,
}

/// Format-specific byte-to-text conversion. Extraction is CPU-bound and
/// synchronous; the worker wraps it as needed.
pub trait TextExtractor: Send + Sync {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText>;
}

#[derive(Default)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText> {
        let document = Document::load_mem(bytes)
            .map_err(|error| PipelineError::Extraction(format!("pdf parse failed: {error}")))?;

        if document.is_encrypted() {
            return Err(PipelineError::EncryptedDocument(
                "pdf requires a password".to_string(),
            ));
        }

        let mut pages = Vec::new();
        for (page_number, _page_id) in document.get_pages() {
            let text = document
                .extract_text(&[page_number])
                .map_err(|error| PipelineError::Extraction(format!("pdf text failed: {error}")))?;
            if !text.trim().is_empty() {
                pages.push(text);
            }
        }

        let page_count = document.get_pages().len() as u32;
        Ok(ExtractedText {
            text: pages.join("\n\n"),
            page_count,
        })
    }
}

#[derive(Default)]
pub struct PlainTextExtractor;

impl TextExtractor for PlainTextExtractor {
    fn extract(&self, bytes: &[u8]) -> Result<ExtractedText> {
        let text = std::str::from_utf8(bytes)
            .map_err(|_| {
                PipelineError::UnsupportedFormat("text document is not valid utf-8".to_string())
            })?
            .to_string();
        Ok(ExtractedText {
            text,
            page_count: 1,
        })
    }
}

/// Pick an extractor by the locator's file extension.
pub fn extractor_for_locator(locator: &str) -> Result<Box<dyn TextExtractor>> {
    let extension = locator
        .rsplit('.')
        .next()
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "pdf" => Ok(Box::new(PdfTextExtractor)),
        "txt" | "md" => Ok(Box::new(PlainTextExtractor)),
        other => Err(PipelineError::UnsupportedFormat(format!(
            "no extractor for .{other}"
        ))),
    }
}
