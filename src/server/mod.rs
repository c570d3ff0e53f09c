//! HTTP API server
//!
//! `POST /predict` classifies an uploaded leaf image. `GET /health` and
//! `GET /model` report liveness and the loaded model.

pub mod response;
pub mod routes;
pub mod state;
pub mod upload;

use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::backend::backend_name;
use crate::config::ServerConfig;
use crate::utils::error::{Result, ServeError};
use crate::utils::format_bytes;

pub use response::{ErrorBody, PredictResponse};
pub use state::{AppState, SharedState};
pub use upload::{Upload, UploadHandler, MULTIPART_OVERHEAD_BYTES};

/// Build the router for an initialized state
pub fn build_router(state: SharedState) -> Router {
    let body_limit = state.uploads.body_limit();
    let predict_path = state.config.predict_path.clone();

    Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/model", get(routes::health::model_info))
        .route(
            &predict_path,
            post(routes::predict::predict).layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
}

/// Load the model, bind the listener and serve until Ctrl+C or SIGTERM.
///
/// The model is loaded and warmed up before the listener is bound, so a
/// missing or broken artifact fails here without ever accepting a connection.
pub async fn run(config: ServerConfig) -> Result<()> {
    config.validate()?;
    config.log_summary();
    info!("Backend: {}", backend_name());

    let state = tokio::task::spawn_blocking(move || AppState::initialize(config))
        .await
        .map_err(|e| ServeError::Startup(format!("Model loading task failed: {}", e)))??;

    info!(
        "Serving model '{}' with {} labels, max upload {}",
        state.manifest.name,
        state.manifest.labels.len(),
        format_bytes(state.config.max_upload_bytes)
    );

    let addr = state.config.bind_addr()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let app = build_router(Arc::clone(&state));
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let engine = Arc::clone(&state.engine);
    if let Err(e) = tokio::task::spawn_blocking(move || engine.shutdown()).await {
        tracing::warn!("Engine shutdown task failed: {}", e);
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::warn!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
