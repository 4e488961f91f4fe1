//! services/api/src/adapters/pdf.rs
//!
//! Implements the `DocumentTextConverter` port. PDFs go through `pdf-extract`
//! on the blocking pool; plain-text uploads are split into pages on form feeds.

use async_trait::async_trait;
use syllabus_core::ports::{DocumentTextConverter, PortError, PortResult};
use tracing::debug;

#[derive(Debug, Clone, Copy, Default)]
pub struct PdfTextConverter;

impl PdfTextConverter {
    pub fn new() -> Self {
        Self
    }
}

fn is_plain_text(media_type: &str) -> bool {
    media_type.to_ascii_lowercase().starts_with("text/")
}

fn split_plain_text(bytes: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(bytes)
        .split('\u{c}')
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl DocumentTextConverter for PdfTextConverter {
    async fn page_texts(&self, bytes: &[u8], media_type: &str) -> PortResult<Vec<String>> {
        if is_plain_text(media_type) {
            return Ok(split_plain_text(bytes));
        }

        let owned = bytes.to_vec();
        let pages = tokio::task::spawn_blocking(move || pdf_extract::extract_text_from_mem_by_pages(&owned))
            .await
            .map_err(|e| PortError::Unexpected(format!("PDF extraction task failed: {e}")))?
            .map_err(|e| PortError::Unexpected(format!("PDF parsing failed: {e}")))?;

        debug!(pages = pages.len(), "Extracted PDF text layer");
        Ok(pages)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn plain_text_is_split_on_form_feeds() {
        let pages = PdfTextConverter::new()
            .page_texts(b"Week 1\x0cWeek 2", "text/plain; charset=utf-8")
            .await
            .unwrap();
        assert_eq!(pages, vec!["Week 1".to_string(), "Week 2".to_string()]);
    }

    #[tokio::test]
    async fn garbage_pdf_is_a_port_error() {
        let err = PdfTextConverter::new()
            .page_texts(b"%PDF-1.4 not really", "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));
    }
}
