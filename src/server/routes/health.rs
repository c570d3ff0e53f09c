//! Health and model metadata endpoints

use axum::{extract::State, Json};
use serde::Serialize;

use crate::backend::backend_name;
use crate::inference::EngineStats;
use crate::model::OutputHead;
use crate::server::state::SharedState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_seconds: u64,
    pub version: String,
    pub backend: String,
    pub model: String,
    pub engine: EngineStats,
}

/// GET /health - Health check endpoint
pub async fn health_check(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        uptime_seconds: state.uptime_seconds(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        backend: backend_name().to_string(),
        model: state.manifest.name.clone(),
        engine: state.engine.stats(),
    })
}

#[derive(Serialize)]
pub struct ModelInfoResponse {
    pub name: String,
    pub labels: Vec<String>,
    pub input_shape: [usize; 3],
    pub head: OutputHead,
    pub top_k: usize,
}

/// GET /model - Describe the loaded model
pub async fn model_info(State(state): State<SharedState>) -> Json<ModelInfoResponse> {
    Json(ModelInfoResponse {
        name: state.manifest.name.clone(),
        labels: state.manifest.labels.clone(),
        input_shape: state.manifest.input_shape(),
        head: state.manifest.head,
        top_k: state.config.top_k,
    })
}
