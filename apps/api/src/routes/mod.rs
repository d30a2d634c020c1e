pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::analysis::handlers as analysis;
use crate::state::AppState;
use crate::store::handlers as session;

pub fn build_router(state: AppState) -> Router {
    let body_limit = DefaultBodyLimit::max(state.config.max_upload_bytes);

    Router::new()
        .route("/health", get(health::health_handler))
        // Session
        .route("/api/v1/session", get(session::handle_get_session))
        .route("/api/v1/session/sign-in", post(session::handle_sign_in))
        .route("/api/v1/session/sign-out", post(session::handle_sign_out))
        .route("/api/v1/session/refresh", post(session::handle_refresh))
        .route(
            "/api/v1/session/clear-error",
            post(session::handle_clear_error),
        )
        // Analysis
        .route("/api/v1/analyze", post(analysis::handle_analyze))
        .route(
            "/api/v1/analyze/status",
            get(analysis::handle_analysis_status),
        )
        .route("/api/v1/records", get(analysis::handle_list_records))
        .route("/api/v1/records/:id", get(analysis::handle_get_record))
        .route(
            "/api/v1/records/:id/resume",
            get(analysis::handle_record_resume),
        )
        .route(
            "/api/v1/records/:id/image",
            get(analysis::handle_record_image),
        )
        .route("/api/v1/wipe", post(analysis::handle_wipe))
        .layer(body_limit)
        .with_state(state)
}
