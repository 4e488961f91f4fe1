//! crates/syllabus_core/src/pipeline/validate.rs
//!
//! The validation gate: file constraints, per-user rate limit and document
//! security run concurrently, and their findings are merged. The gate never
//! stops early, so the user always sees every problem at once.

use crate::config::PipelineConfig;
use crate::domain::Document;
use crate::ports::{PortError, PortResult, RateLimitStore};
use regex::bytes::Regex;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Errors and warnings from one check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CheckOutcome {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

/// Merged result of all checks. `ok` is true iff `errors` is empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
    pub ok: bool,
}

impl ValidationReport {
    fn merge(outcomes: impl IntoIterator<Item = CheckOutcome>) -> Self {
        let mut report = Self::default();
        for outcome in outcomes {
            report.errors.extend(outcome.errors);
            report.warnings.extend(outcome.warnings);
        }
        report.ok = report.errors.is_empty();
        report
    }
}

/// Failure of the rate-limit collaborator itself, reported after all checks finish.
#[derive(Debug)]
pub struct GateFailure {
    pub report: ValidationReport,
    pub source: PortError,
}

fn megabytes(bytes: u64) -> f64 {
    bytes as f64 / (1024.0 * 1024.0)
}

//=========================================================================================
// File Constraints
//=========================================================================================

pub fn check_file_constraints(doc: &Document, config: &PipelineConfig) -> CheckOutcome {
    let mut outcome = CheckOutcome::default();
    let media_type = doc.media_type.to_ascii_lowercase();
    let media_ok = config.allowed_media_types.iter().any(|t| media_type.starts_with(t.as_str()));
    let extension_ok = doc
        .extension()
        .map(|ext| config.allowed_extensions.iter().any(|a| a == &ext))
        .unwrap_or(false);

    if !media_ok && !extension_ok {
        outcome.errors.push(format!(
            "Unsupported file type '{}'. Please upload a {} file.",
            doc.media_type,
            config.allowed_extensions.join(" or ").to_uppercase()
        ));
    }

    let size = doc.size_bytes();
    if size == 0 {
        outcome.errors.push("The file is empty.".to_string());
    } else if size > config.max_file_bytes {
        outcome.errors.push(format!(
            "File size {:.1} MB exceeds the maximum of {:.1} MB.",
            megabytes(size),
            megabytes(config.max_file_bytes)
        ));
    } else if size as f64 > config.max_file_bytes as f64 * config.near_limit_ratio {
        outcome.warnings.push(format!(
            "File size {:.1} MB is close to the {:.1} MB limit; processing may be slow.",
            megabytes(size),
            megabytes(config.max_file_bytes)
        ));
    }

    outcome
}

//=========================================================================================
// Rate Limit
//=========================================================================================

pub async fn check_rate_limit(
    store: &dyn RateLimitStore,
    user_id: Uuid,
    config: &PipelineConfig,
) -> PortResult<CheckOutcome> {
    let mut outcome = CheckOutcome::default();
    let recent = store
        .get_recent_upload_count(user_id, config.rate_limit_window_secs)
        .await?;

    if recent >= config.rate_limit_max_uploads {
        let minutes = config.rate_limit_window_secs.div_ceil(60);
        outcome.errors.push(format!(
            "Upload limit reached ({} uploads in the last {} minutes). Please try again in up to {} minutes.",
            recent, minutes, minutes
        ));
    } else if recent + 1 == config.rate_limit_max_uploads {
        outcome
            .warnings
            .push("This is your last upload allowed in the current window.".to_string());
    }
    Ok(outcome)
}

//=========================================================================================
// Document Security
//=========================================================================================

/// Byte-level heuristics run against the raw upload.
#[derive(Debug, Clone)]
pub struct SecurityScanner {
    active_content: Regex,
    encrypt: Regex,
    page: Regex,
    embedded_file: Regex,
    object: Regex,
}

impl SecurityScanner {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            active_content: Regex::new(r"(?-u)/(?:JavaScript|JS|Launch)\b")?,
            encrypt: Regex::new(r"(?-u)/Encrypt\b")?,
            page: Regex::new(r"(?-u)/Type\s*/Page\b")?,
            embedded_file: Regex::new(r"(?-u)/EmbeddedFiles?\b")?,
            object: Regex::new(r"(?-u)\d+\s+\d+\s+obj\b")?,
        })
    }

    pub fn check(&self, doc: &Document, config: &PipelineConfig) -> CheckOutcome {
        let mut outcome = CheckOutcome::default();
        let bytes = doc.bytes.as_ref();

        if is_executable(bytes) {
            outcome
                .errors
                .push("The file contains executable content and cannot be processed.".to_string());
            return outcome;
        }

        let is_pdf = doc.media_type.eq_ignore_ascii_case("application/pdf")
            || doc.extension().as_deref() == Some("pdf");

        if is_pdf {
            self.check_pdf(bytes, config, &mut outcome);
        } else if bytes.contains(&0) {
            outcome
                .errors
                .push("The text file contains binary data.".to_string());
        }

        outcome
    }

    fn check_pdf(&self, bytes: &[u8], config: &PipelineConfig, outcome: &mut CheckOutcome) {
        if !bytes.starts_with(b"%PDF-") {
            outcome
                .errors
                .push("The file is not a valid PDF document.".to_string());
            return;
        }
        if self.active_content.is_match(bytes) {
            outcome
                .errors
                .push("The PDF contains embedded scripts or launch actions and cannot be processed.".to_string());
        }
        if self.encrypt.is_match(bytes) {
            outcome.errors.push(
                "The PDF is password-protected. Please remove the password and upload it again.".to_string(),
            );
        }

        let pages = self.page.find_iter(bytes).count();
        if pages > config.max_pages {
            outcome.errors.push(format!(
                "The PDF has {} pages; syllabi longer than {} pages are not supported.",
                pages, config.max_pages
            ));
        } else if pages == 0 {
            outcome
                .warnings
                .push("Could not determine the page count of the PDF.".to_string());
        }

        if self.embedded_file.is_match(bytes) {
            outcome
                .warnings
                .push("The PDF contains embedded files, which will be ignored.".to_string());
        }
        let objects = self.object.find_iter(bytes).count();
        if objects > config.embedded_object_warning_threshold {
            outcome.warnings.push(format!(
                "The PDF contains an unusually high number of objects ({objects})."
            ));
        }
    }
}

fn is_executable(bytes: &[u8]) -> bool {
    const MAGIC: [&[u8]; 5] = [
        b"MZ",
        b"\x7fELF",
        b"\xfe\xed\xfa\xce",
        b"\xfe\xed\xfa\xcf",
        b"\xcf\xfa\xed\xfe",
    ];
    MAGIC.iter().any(|magic| bytes.starts_with(magic))
}

//=========================================================================================
// The Gate
//=========================================================================================

pub struct ValidationGate {
    config: Arc<PipelineConfig>,
    rate_limits: Arc<dyn RateLimitStore>,
    scanner: SecurityScanner,
}

impl ValidationGate {
    pub fn new(
        config: Arc<PipelineConfig>,
        rate_limits: Arc<dyn RateLimitStore>,
        scanner: SecurityScanner,
    ) -> Self {
        Self {
            config,
            rate_limits,
            scanner,
        }
    }

    /// Runs all three checks concurrently and merges them. A failure of the
    /// rate-limit store is returned after the other checks have reported.
    pub async fn validate(&self, doc: &Document, user_id: Uuid) -> Result<ValidationReport, GateFailure> {
        let config = &self.config;
        let (files, rate, security) = tokio::join!(
            async { check_file_constraints(doc, config) },
            check_rate_limit(self.rate_limits.as_ref(), user_id, config),
            async { self.scanner.check(doc, config) },
        );

        match rate {
            Ok(rate) => {
                let report = ValidationReport::merge([files, rate, security]);
                debug!(
                    %user_id,
                    errors = report.errors.len(),
                    warnings = report.warnings.len(),
                    "Validation finished"
                );
                Ok(report)
            }
            Err(source) => {
                warn!(%user_id, error = %source, "Rate-limit store unreachable during validation");
                Err(GateFailure {
                    report: ValidationReport::merge([files, security]),
                    source,
                })
            }
        }
    }
}
