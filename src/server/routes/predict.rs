//! Prediction endpoint

use std::time::Instant;

use axum::extract::{Request, State};
use axum::Json;
use tracing::Instrument;
use uuid::Uuid;

use crate::server::response::PredictResponse;
use crate::server::state::SharedState;
use crate::utils::error::ServeError;

/// POST {predict_path} - classify one uploaded image
pub async fn predict(
    State(state): State<SharedState>,
    request: Request,
) -> Result<Json<PredictResponse>, ServeError> {
    let request_id = Uuid::new_v4();
    let span = tracing::info_span!("predict", %request_id);

    async move {
        let start = Instant::now();
        let timeout = state.config.request_timeout();

        let result = tokio::time::timeout(timeout, state.uploads.handle_upload(request))
            .await
            .unwrap_or(Err(ServeError::Timeout(timeout)));

        match &result {
            Ok(prediction) => tracing::info!(
                "Predicted {} in {:.1} ms (inference {:.1} ms)",
                prediction.top().map(|p| p.label.as_str()).unwrap_or("-"),
                start.elapsed().as_secs_f64() * 1000.0,
                prediction.inference_time_ms()
            ),
            Err(e) if e.is_client_error() => tracing::info!("Rejected upload: {}", e),
            Err(_) => {}
        }

        result.map(|prediction| Json(PredictResponse::from(prediction)))
    }
    .instrument(span)
    .await
}
