use axum::{
    extract::{Multipart, Path, State},
    http::header,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::info;
use uuid::Uuid;

use crate::analysis::models::{AnalysisRecord, AnalysisRequest};
use crate::analysis::records::{list_records, load_record, wipe, WipeSummary};
use crate::errors::AppError;
use crate::models::user::Identity;
use crate::platform::Document;
use crate::state::AppState;

fn require_session(state: &AppState) -> Result<Identity, AppError> {
    state.store.identity().ok_or(AppError::Unauthorized)
}

/// Splits the upload form into the job details and the résumé file.
async fn read_analysis_form(
    mut multipart: Multipart,
) -> Result<(AnalysisRequest, Document), AppError> {
    let mut request = AnalysisRequest {
        company_name: String::new(),
        job_title: String::new(),
        job_description: String::new(),
    };
    let mut resume = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "resume" => {
                let file_name = field.file_name().unwrap_or("resume.pdf").to_string();
                let content_type = field
                    .content_type()
                    .unwrap_or("application/octet-stream")
                    .to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed upload: {e}")))?;
                resume = Some(Document::new(file_name, content_type, bytes));
            }
            "companyName" | "jobTitle" | "jobDescription" => {
                let value = field
                    .text()
                    .await
                    .map_err(|e| AppError::Validation(format!("Malformed field {name}: {e}")))?;
                match name.as_str() {
                    "companyName" => request.company_name = value,
                    "jobTitle" => request.job_title = value,
                    _ => request.job_description = value,
                }
            }
            _ => {}
        }
    }

    let resume = resume
        .filter(|document| !document.bytes.is_empty())
        .ok_or_else(|| AppError::Validation("A resume file is required".to_string()))?;
    Ok((request, resume))
}

/// POST /api/v1/analyze
pub async fn handle_analyze(
    State(state): State<AppState>,
    multipart: Multipart,
) -> Result<Json<AnalysisRecord>, AppError> {
    let identity = require_session(&state)?;
    let (request, resume) = read_analysis_form(multipart).await?;
    info!(
        "Analysis of {} requested by {} for {}",
        resume.name, identity.username, request.company_name
    );
    let record = state.workflow.analyze(request, resume).await?;
    Ok(Json(record))
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub status: String,
}

/// GET /api/v1/analyze/status
pub async fn handle_analysis_status(State(state): State<AppState>) -> Json<StatusResponse> {
    Json(StatusResponse {
        status: state.workflow.status(),
    })
}

/// GET /api/v1/records
pub async fn handle_list_records(
    State(state): State<AppState>,
) -> Result<Json<Vec<AnalysisRecord>>, AppError> {
    Ok(Json(list_records(&state.store).await?))
}

async fn find_record(state: &AppState, id: Uuid) -> Result<AnalysisRecord, AppError> {
    load_record(&state.store, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Record {id} not found")))
}

/// GET /api/v1/records/:id
pub async fn handle_get_record(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<AnalysisRecord>, AppError> {
    Ok(Json(find_record(&state, id).await?))
}

async fn serve_blob(state: &AppState, path: &str) -> Result<Response, AppError> {
    let blob = state.store.fs_read(path).await?;
    let content_type = blob
        .content_type
        .unwrap_or_else(|| "application/octet-stream".to_string());
    Ok(([(header::CONTENT_TYPE, content_type)], blob.bytes).into_response())
}

/// GET /api/v1/records/:id/resume
pub async fn handle_record_resume(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let record = find_record(&state, id).await?;
    serve_blob(&state, &record.resume_path).await
}

/// GET /api/v1/records/:id/image
pub async fn handle_record_image(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Response, AppError> {
    let record = find_record(&state, id).await?;
    serve_blob(&state, &record.image_path).await
}

/// POST /api/v1/wipe
pub async fn handle_wipe(State(state): State<AppState>) -> Result<Json<WipeSummary>, AppError> {
    require_session(&state)?;
    Ok(Json(wipe(&state.store).await?))
}
