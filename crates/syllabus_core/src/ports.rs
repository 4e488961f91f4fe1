//! crates/syllabus_core/src/ports.rs
//!
//! Defines the service contracts (traits) for every external collaborator the
//! ingestion pipeline talks to. These traits form the boundary of the hexagonal
//! architecture, keeping the core independent of storage, PDF libraries and
//! embedding providers.

use async_trait::async_trait;
use uuid::Uuid;
use crate::domain::{ClassContext, DocumentMetadata, NewTask, PersistedTask, StoredDocument};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Service unavailable: {0}")]
    Unavailable(String),
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Ports (Traits)
//=========================================================================================

#[async_trait]
pub trait FileStorage: Send + Sync {
    /// Stores the raw document and returns where it landed.
    async fn upload_document(
        &self,
        bytes: &[u8],
        metadata: &DocumentMetadata,
    ) -> PortResult<StoredDocument>;

    async fn get_document_bytes(&self, path: &str) -> PortResult<Vec<u8>>;
}

#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Number of uploads by `user_id` within the last `window_seconds`.
    async fn get_recent_upload_count(&self, user_id: Uuid, window_seconds: u64) -> PortResult<u32>;
}

#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, task: &NewTask) -> PortResult<PersistedTask>;

    async fn list_tasks_for_class(&self, class_id: Uuid) -> PortResult<Vec<PersistedTask>>;
}

#[async_trait]
pub trait ClassDirectory: Send + Sync {
    /// Loads the class a syllabus is being uploaded into, scoped to its owner.
    async fn get_class_context(&self, class_id: Uuid, user_id: Uuid) -> PortResult<ClassContext>;
}

#[async_trait]
pub trait DocumentTextConverter: Send + Sync {
    /// Returns the text of each page, in page order.
    async fn page_texts(&self, bytes: &[u8], media_type: &str) -> PortResult<Vec<String>>;
}

#[async_trait]
pub trait SemanticSimilarity: Send + Sync {
    /// Whether a real embedding backend sits behind this port.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Embeds a piece of text into a dense vector.
    async fn embed(&self, text: &str) -> PortResult<Vec<f32>>;
}

/// Stand-in used whenever no embedding service is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSimilarity;

#[async_trait]
impl SemanticSimilarity for NullSimilarity {
    fn is_enabled(&self) -> bool {
        false
    }

    async fn embed(&self, _text: &str) -> PortResult<Vec<f32>> {
        Err(PortError::Unavailable(
            "no semantic similarity service configured".to_string(),
        ))
    }
}
