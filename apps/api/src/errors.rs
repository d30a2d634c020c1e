use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::analysis::orchestrator::AnalysisError;
use crate::analysis::records::LoadError;
use crate::store::adapters::CapabilityError;

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Capability error: {0}")]
    Capability(#[from] CapabilityError),

    #[error("{0}")]
    Analysis(#[from] AnalysisError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<LoadError> for AppError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::Capability(e) => AppError::Capability(e),
            LoadError::Corrupt(e) => {
                AppError::Internal(anyhow::Error::new(e).context("stored record is unreadable"))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Authentication required".to_string(),
            ),
            AppError::Capability(CapabilityError::Unavailable) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "PLATFORM_UNAVAILABLE",
                CapabilityError::Unavailable.to_string(),
            ),
            AppError::Capability(CapabilityError::Failed(msg)) => {
                tracing::error!("Capability error: {msg}");
                (
                    StatusCode::BAD_GATEWAY,
                    "PLATFORM_ERROR",
                    "A platform capability failed".to_string(),
                )
            }
            // Display is the status text the workflow published
            AppError::Analysis(e) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "ANALYSIS_FAILED",
                e.to_string(),
            ),
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
