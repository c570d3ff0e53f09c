//! Mapping of errors onto HTTP responses
//!
//! Every error body is `{"error": "<reason>"}`. Client errors carry their
//! reason; server errors are logged here and answered with a generic message.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::inference::{Prediction, PredictionResult};
use crate::utils::error::ServeError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

/// Body of a successful prediction
#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub predictions: Vec<Prediction>,
}

impl From<PredictionResult> for PredictResponse {
    fn from(result: PredictionResult) -> Self {
        Self {
            predictions: result.predictions,
        }
    }
}

impl ServeError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ServeError::Validation(_) => StatusCode::BAD_REQUEST,
            ServeError::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            ServeError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServeError::Startup(_)
            | ServeError::ShapeMismatch { .. }
            | ServeError::Inference(_)
            | ServeError::Config(_)
            | ServeError::Io(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to send to the client
    pub fn public_message(&self) -> String {
        match self {
            ServeError::Validation(_) | ServeError::PayloadTooLarge { .. } => self.to_string(),
            ServeError::Timeout(_) => "Request timed out".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

impl IntoResponse for ServeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match &self {
            ServeError::ShapeMismatch { .. } => {
                tracing::error!("Preprocessor produced a tensor the model cannot take: {}", self)
            }
            _ if status.is_server_error() => tracing::error!("{}", self),
            _ => {}
        }

        (
            status,
            Json(ErrorBody {
                error: self.public_message(),
            }),
        )
            .into_response()
    }
}
