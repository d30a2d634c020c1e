use std::sync::Arc;

use crate::analysis::orchestrator::AnalysisWorkflow;
use crate::config::Config;
use crate::store::Store;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    /// The one process-wide store; handlers never build their own.
    pub store: Arc<Store>,
    pub workflow: Arc<AnalysisWorkflow>,
    pub config: Config,
}
