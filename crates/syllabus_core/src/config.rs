//! crates/syllabus_core/src/config.rs
//!
//! Tunables for the ingestion pipeline. The service fills these from the
//! environment; tests build them directly.

use std::time::Duration;

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_file_bytes: u64,
    /// Fraction of `max_file_bytes` above which a size warning is emitted.
    pub near_limit_ratio: f64,
    pub allowed_media_types: Vec<String>,
    pub allowed_extensions: Vec<String>,
    pub rate_limit_window_secs: u64,
    pub rate_limit_max_uploads: u32,
    pub min_text_chars: usize,
    pub max_pages: usize,
    pub embedded_object_warning_threshold: usize,
    pub extraction_timeout: Duration,
    pub augmentation_timeout: Duration,
    pub materialization_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_file_bytes: 10 * 1024 * 1024,
            near_limit_ratio: 0.8,
            allowed_media_types: vec!["application/pdf".to_string(), "text/plain".to_string()],
            allowed_extensions: vec!["pdf".to_string(), "txt".to_string()],
            rate_limit_window_secs: 3600,
            rate_limit_max_uploads: 10,
            min_text_chars: 50,
            max_pages: 300,
            embedded_object_warning_threshold: 2000,
            extraction_timeout: Duration::from_secs(30),
            augmentation_timeout: Duration::from_secs(5),
            materialization_timeout: Duration::from_secs(10),
        }
    }
}
