mod analysis;
mod config;
mod db;
mod errors;
mod llm_client;
mod models;
mod platform;
mod routes;
mod state;
mod store;

use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::analysis::orchestrator::AnalysisWorkflow;
use crate::analysis::renderer::PdftoppmRenderer;
use crate::config::Config;
use crate::platform::connect::spawn_connect;
use crate::platform::PlatformSlot;
use crate::routes::build_router;
use crate::state::AppState;
use crate::store::Store;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Resumind API v{}", env!("CARGO_PKG_VERSION"));

    // The platform client appears in the slot once its backends connect
    let slot = Arc::new(PlatformSlot::new());
    spawn_connect(config.clone(), Arc::clone(&slot));

    let store = Arc::new(Store::new(slot));
    tokio::spawn({
        let store = Arc::clone(&store);
        async move { store.init().await }
    });

    let renderer = Arc::new(PdftoppmRenderer::new(
        config.pdftoppm_path.clone(),
        config.render_dpi,
    ));
    info!(
        "Document renderer: {} at {} dpi",
        config.pdftoppm_path, config.render_dpi
    );
    let workflow = Arc::new(AnalysisWorkflow::new(Arc::clone(&store), renderer));

    // Build app state
    let state = AppState {
        store,
        workflow,
        config: config.clone(),
    };

    // Build router
    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict origins once the web client has a fixed host

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
