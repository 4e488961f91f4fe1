//! crates/syllabus_core/src/pipeline/text.rs
//!
//! Turns a stored document back into plain text through the conversion port,
//! and rejects results too short to be a real syllabus.

use crate::domain::{NormalizedText, StoredDocument};
use crate::error::{ExtractionError, PipelineError};
use crate::ports::{DocumentTextConverter, FileStorage};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub struct TextExtractor {
    storage: Arc<dyn FileStorage>,
    converter: Arc<dyn DocumentTextConverter>,
    min_chars: usize,
    timeout: Duration,
}

impl TextExtractor {
    pub fn new(
        storage: Arc<dyn FileStorage>,
        converter: Arc<dyn DocumentTextConverter>,
        min_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            storage,
            converter,
            min_chars,
            timeout,
        }
    }

    /// Fetches the stored bytes, converts them page by page and normalizes the result.
    pub async fn extract_text(
        &self,
        stored: &StoredDocument,
        media_type: &str,
    ) -> Result<NormalizedText, PipelineError> {
        let bytes = self
            .storage
            .get_document_bytes(&stored.path)
            .await
            .map_err(|e| PipelineError::transport("file storage", &e))?;

        let pages = match tokio::time::timeout(self.timeout, self.converter.page_texts(&bytes, media_type)).await {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => return Err(ExtractionError::Conversion(e.to_string()).into()),
            Err(_) => {
                return Err(ExtractionError::Conversion(format!(
                    "conversion timed out after {:?}",
                    self.timeout
                ))
                .into())
            }
        };
        debug!(pages = pages.len(), path = %stored.path, "Converted document pages");

        let text = normalize(&pages.join("\n"));
        let chars = text.chars().count();
        if chars < self.min_chars {
            return Err(ExtractionError::EmptyOrUnreadable { chars }.into());
        }

        info!(chars, "Extracted syllabus text");
        Ok(NormalizedText::new(text))
    }
}

/// Unifies line endings, drops control characters, collapses horizontal
/// whitespace and limits blank-line runs to one.
pub fn normalize(raw: &str) -> String {
    let unified = raw.replace("\r\n", "\n").replace('\r', "\n");
    let mut out = String::with_capacity(unified.len());
    let mut blank_run = 0;

    for line in unified.split('\n') {
        let mut cleaned = String::with_capacity(line.len());
        let mut last_space = false;
        for ch in line.chars() {
            if ch == '\t' || ch == ' ' || ch == '\u{a0}' {
                if !last_space {
                    cleaned.push(' ');
                }
                last_space = true;
            } else if ch.is_control() {
                continue;
            } else {
                cleaned.push(ch);
                last_space = false;
            }
        }
        let cleaned = cleaned.trim_end();

        if cleaned.is_empty() {
            blank_run += 1;
            if blank_run > 1 || out.is_empty() {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(cleaned);
        out.push('\n');
    }

    out.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentMetadata;
    use crate::ports::{PortError, PortResult};
    use async_trait::async_trait;

    struct OneFile(Vec<u8>);

    #[async_trait]
    impl FileStorage for OneFile {
        async fn upload_document(&self, _bytes: &[u8], _metadata: &DocumentMetadata) -> PortResult<StoredDocument> {
            Ok(stored())
        }
        async fn get_document_bytes(&self, _path: &str) -> PortResult<Vec<u8>> {
            Ok(self.0.clone())
        }
    }

    struct Utf8Pages;

    #[async_trait]
    impl DocumentTextConverter for Utf8Pages {
        async fn page_texts(&self, bytes: &[u8], _media_type: &str) -> PortResult<Vec<String>> {
            let text = String::from_utf8(bytes.to_vec()).map_err(|e| PortError::Unexpected(e.to_string()))?;
            Ok(text.split('\u{c}').map(str::to_string).collect())
        }
    }

    fn stored() -> StoredDocument {
        StoredDocument {
            path: "u/1.pdf".into(),
            url: "/documents/1".into(),
        }
    }

    fn extractor(bytes: &[u8]) -> TextExtractor {
        TextExtractor::new(
            Arc::new(OneFile(bytes.to_vec())),
            Arc::new(Utf8Pages),
            50,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn normalize_collapses_whitespace_and_blank_runs() {
        let raw = "Title\r\n\r\n\r\n\r\nWeek  1:\t\tQuiz   \n\u{0}Lab";
        assert_eq!(normalize(raw), "Title\n\nWeek 1: Quiz\nLab");
    }

    #[tokio::test]
    async fn pages_are_joined_with_a_newline() {
        let page = "Instructor: Dr. Jane Smith jsmith@uni.edu";
        let bytes = format!("{page}\u{c}Homework 1 due 1/20 and Homework 2 due 1/27");
        let text = extractor(bytes.as_bytes()).extract_text(&stored(), "text/plain").await.unwrap();
        assert!(text.as_str().contains("jsmith@uni.edu\nHomework 1"));
    }

    #[tokio::test]
    async fn short_text_is_unreadable() {
        let err = extractor(b"  \n scanned image \n ")
            .extract_text(&stored(), "application/pdf")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            PipelineError::Extraction(ExtractionError::EmptyOrUnreadable { .. })
        ));
    }
}
