use axum::{extract::State, Json};
use serde::Serialize;

use crate::state::AppState;
use crate::store::StoreState;

/// Outcome of a session transition plus the state it left behind.
/// A failed transition is not an HTTP error: `lastError` carries the reason.
#[derive(Serialize)]
pub struct SessionResponse {
    pub ok: bool,
    pub state: StoreState,
}

fn respond(state: &AppState, ok: bool) -> Json<SessionResponse> {
    Json(SessionResponse {
        ok,
        state: state.store.snapshot(),
    })
}

/// GET /api/v1/session
pub async fn handle_get_session(State(state): State<AppState>) -> Json<StoreState> {
    Json(state.store.snapshot())
}

/// POST /api/v1/session/sign-in
pub async fn handle_sign_in(State(state): State<AppState>) -> Json<SessionResponse> {
    let ok = state.store.sign_in().await;
    respond(&state, ok)
}

/// POST /api/v1/session/sign-out
pub async fn handle_sign_out(State(state): State<AppState>) -> Json<SessionResponse> {
    let ok = state.store.sign_out().await;
    respond(&state, ok)
}

/// POST /api/v1/session/refresh
pub async fn handle_refresh(State(state): State<AppState>) -> Json<SessionResponse> {
    let ok = state.store.refresh().await;
    respond(&state, ok)
}

/// POST /api/v1/session/clear-error
pub async fn handle_clear_error(State(state): State<AppState>) -> Json<StoreState> {
    state.store.clear_error();
    Json(state.store.snapshot())
}
