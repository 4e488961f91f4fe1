//! services/api/src/web/upload_task.rs
//!
//! This module contains the asynchronous "worker" function that runs one
//! syllabus upload through the pipeline. Both the REST handler and the
//! WebSocket loop go through it, so single-flight per user holds for both.

use crate::web::state::AppState;
use bytes::Bytes;
use std::sync::Arc;
use syllabus_core::ports::PortError;
use syllabus_core::{Document, PipelineError, PipelineObserver, PipelineRun};
use tracing::{info, warn};
use uuid::Uuid;

/// What the client supplied for one upload.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    /// Identifies this run in the per-user registry.
    pub run_key: Uuid,
    pub class_id: Uuid,
    pub file_name: String,
    pub media_type: String,
    pub bytes: Bytes,
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("class {0} not found")]
    ClassNotFound(Uuid),

    #[error("could not load class: {0}")]
    Class(PortError),

    #[error("upload was cancelled")]
    Cancelled,

    #[error("pipeline failed: {0}")]
    Pipeline(PipelineError),
}

/// Runs the whole pipeline for `request`, replacing any run the user already has.
pub async fn upload_process(
    app_state: Arc<AppState>,
    user_id: Uuid,
    request: UploadRequest,
    observer: &dyn PipelineObserver,
) -> Result<PipelineRun, UploadError> {
    let class = match app_state.classes.get_class_context(request.class_id, user_id).await {
        Ok(class) => class,
        Err(PortError::NotFound(_)) => return Err(UploadError::ClassNotFound(request.class_id)),
        Err(e) => {
            warn!(%user_id, class_id = %request.class_id, error = %e, "Failed to load class");
            return Err(UploadError::Class(e));
        }
    };

    let active = app_state.runs.begin(user_id, request.run_key).await;
    let document = Document::new(
        user_id,
        request.class_id,
        request.file_name,
        request.media_type,
        request.bytes,
    );

    let outcome = app_state
        .pipeline
        .run(document, &class, observer, active.token.clone())
        .await;
    app_state.runs.finish(user_id, &active).await;

    match outcome {
        Ok(run) => Ok(run),
        Err(PipelineError::Cancelled) => {
            info!(%user_id, class_id = %request.class_id, "Upload cancelled");
            Err(UploadError::Cancelled)
        }
        Err(other) => {
            warn!(%user_id, error = %other, "Pipeline aborted");
            Err(UploadError::Pipeline(other))
        }
    }
}
