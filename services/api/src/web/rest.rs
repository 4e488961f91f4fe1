//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use crate::web::upload_task::{upload_process, UploadError, UploadRequest};
use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use serde::Serialize;
use std::sync::Arc;
use syllabus_core::{NoopObserver, PipelineRun, PipelineStage};
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        upload_syllabus_handler,
    ),
    components(
        schemas(UploadSyllabusResponse)
    ),
    tags(
        (name = "Syllabus Ingestion API", description = "Upload a syllabus and turn it into calendar tasks.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

/// The final state of an upload.
#[derive(Serialize, ToSchema)]
pub struct UploadSyllabusResponse {
    run_id: Uuid,
    /// One of `select`, `validate`, `upload`, `generate`, `complete`.
    stage: String,
    progress_percent: u8,
    errors: Vec<String>,
    warnings: Vec<String>,
    /// Present once the run completed.
    tasks_created: Option<usize>,
    average_confidence: Option<f64>,
}

impl From<&PipelineRun> for UploadSyllabusResponse {
    fn from(run: &PipelineRun) -> Self {
        let snapshot = run.snapshot();
        let summary = run.completion_summary();
        Self {
            run_id: snapshot.run_id,
            stage: format!("{:?}", snapshot.stage).to_lowercase(),
            progress_percent: snapshot.progress_percent,
            errors: snapshot.errors,
            warnings: snapshot.warnings,
            tasks_created: summary.as_ref().map(|s| s.tasks_created),
            average_confidence: summary.map(|s| s.average_confidence),
        }
    }
}

//=========================================================================================
// REST API Handlers
//=========================================================================================

/// Upload a syllabus into a class and create its tasks.
///
/// Accepts a multipart/form-data request with a single file part and runs the
/// whole pipeline before answering. Starting an upload cancels any upload the
/// same user still has running.
#[utoipa::path(
    post,
    path = "/classes/{class_id}/syllabus",
    request_body(content_type = "multipart/form-data", description = "The syllabus document (PDF or plain text)."),
    responses(
        (status = 201, description = "Tasks were created", body = UploadSyllabusResponse),
        (status = 400, description = "Bad request (e.g., missing file part)"),
        (status = 401, description = "Missing or invalid x-user-id header"),
        (status = 404, description = "Class not found"),
        (status = 409, description = "Superseded by a newer upload"),
        (status = 422, description = "The document was rejected or could not be read", body = UploadSyllabusResponse),
        (status = 500, description = "Internal server error")
    ),
    params(
        ("class_id" = Uuid, Path, description = "The class the syllabus belongs to."),
        ("x-user-id" = Uuid, Header, description = "The unique ID of the user.")
    )
)]
pub async fn upload_syllabus_handler(
    State(app_state): State<Arc<AppState>>,
    Extension(user_id): Extension<Uuid>,
    Path(class_id): Path<Uuid>,
    mut multipart: Multipart,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let field = multipart
        .next_field()
        .await
        .map_err(|e| {
            (
                StatusCode::BAD_REQUEST,
                format!("Failed to read multipart data: {}", e),
            )
        })?
        .ok_or_else(|| {
            (
                StatusCode::BAD_REQUEST,
                "Multipart form must include a file".to_string(),
            )
        })?;

    let file_name = field.file_name().unwrap_or("syllabus.pdf").to_string();
    let media_type = field
        .content_type()
        .unwrap_or("application/octet-stream")
        .to_string();
    let bytes = field.bytes().await.map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            format!("Failed to read file bytes: {}", e),
        )
    })?;

    let request = UploadRequest {
        run_key: Uuid::new_v4(),
        class_id,
        file_name,
        media_type,
        bytes,
    };

    match upload_process(app_state, user_id, request, &NoopObserver).await {
        Ok(run) => {
            let status = if run.stage() == PipelineStage::Complete {
                StatusCode::CREATED
            } else {
                StatusCode::UNPROCESSABLE_ENTITY
            };
            Ok((status, Json(UploadSyllabusResponse::from(&run))))
        }
        Err(UploadError::ClassNotFound(id)) => {
            Err((StatusCode::NOT_FOUND, format!("Class {} not found", id)))
        }
        Err(UploadError::Cancelled) => Err((
            StatusCode::CONFLICT,
            "Upload was cancelled by a newer upload".to_string(),
        )),
        Err(e) => {
            error!("Failed to process syllabus: {:?}", e);
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to process syllabus".to_string(),
            ))
        }
    }
}
