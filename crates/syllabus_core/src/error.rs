//! crates/syllabus_core/src/error.rs
//!
//! The pipeline error taxonomy. Errors are grouped by the stage that raised
//! them, not by the library that failed.

use crate::pipeline::state::PipelineStage;
use crate::ports::PortError;
use serde::Serialize;

/// Why text could not be recovered from a document.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("document text was empty or unreadable ({chars} characters recovered)")]
    EmptyOrUnreadable { chars: usize },

    #[error("document conversion failed: {0}")]
    Conversion(String),
}

/// User-facing category for failures reaching an external collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportCategory {
    Network,
    Authentication,
    Quota,
    Unknown,
}

impl TransportCategory {
    /// Collaborators are opaque, so the category is inferred from the failure text.
    pub fn classify(detail: &str) -> Self {
        let lower = detail.to_lowercase();
        let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));

        if any(&["unauthorized", "unauthenticated", "forbidden", "auth", "jwt", "token expired", "401", "403"]) {
            Self::Authentication
        } else if any(&["quota", "rate limit", "too many requests", "429", "limit exceeded"]) {
            Self::Quota
        } else if any(&[
            "network", "timed out", "timeout", "connection", "unavailable", "dns", "unreachable",
            "reset by peer", "fetch",
        ]) {
            Self::Network
        } else {
            Self::Unknown
        }
    }

    pub fn from_port_error(err: &PortError) -> Self {
        match err {
            PortError::Unauthorized => Self::Authentication,
            PortError::QuotaExceeded(_) => Self::Quota,
            PortError::Unavailable(_) => Self::Network,
            other => Self::classify(&other.to_string()),
        }
    }
}

/// Stage-scoped failure of a pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("validation failed: {}", .0.join("; "))]
    Validation(Vec<String>),

    #[error("text extraction failed: {0}")]
    Extraction(#[from] ExtractionError),

    #[error("augmentation skipped: {0}")]
    Augmentation(String),

    #[error("could not create task '{title}': {reason}")]
    Materialization { title: String, reason: String },

    #[error("{category:?} failure reaching {collaborator}: {detail}")]
    Transport {
        collaborator: &'static str,
        category: TransportCategory,
        detail: String,
    },

    #[error("run was cancelled")]
    Cancelled,

    #[error("invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: PipelineStage, to: PipelineStage },
}

impl PipelineError {
    pub fn transport(collaborator: &'static str, err: &PortError) -> Self {
        Self::Transport {
            collaborator,
            category: TransportCategory::from_port_error(err),
            detail: err.to_string(),
        }
    }

    /// Whether the run has to go back to file selection.
    pub fn resets_run(&self) -> bool {
        matches!(
            self,
            Self::Extraction(_) | Self::Transport { .. } | Self::Cancelled | Self::InvalidTransition { .. }
        )
    }

    /// Every message to show, one per line of the error list.
    pub fn into_messages(self) -> Vec<String> {
        match self {
            Self::Validation(errors) => errors,
            other => vec![other.user_message()],
        }
    }

    /// The message shown to the person uploading the syllabus.
    pub fn user_message(&self) -> String {
        match self {
            Self::Validation(errors) => errors.join("\n"),
            Self::Extraction(_) => "We could not read the PDF. Please ensure it contains readable \
                                    text (not a scanned image) and try again."
                .to_string(),
            Self::Augmentation(_) => String::new(),
            Self::Materialization { title, .. } => format!("Task \"{title}\" could not be created."),
            Self::Transport { category, .. } => match category {
                TransportCategory::Network => {
                    "Network error. Please check your connection and try again.".to_string()
                }
                TransportCategory::Authentication => {
                    "Your session has expired. Please sign in again.".to_string()
                }
                TransportCategory::Quota => {
                    "Usage limit reached. Please wait a while before uploading again.".to_string()
                }
                TransportCategory::Unknown => {
                    "Something went wrong while processing your syllabus. Please try again.".to_string()
                }
            },
            Self::Cancelled => "Upload cancelled.".to_string(),
            Self::InvalidTransition { .. } => {
                "Something went wrong while processing your syllabus. Please try again.".to_string()
            }
        }
    }
}
