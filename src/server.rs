//! HTTP surface: `POST /predict` and `GET /health`

use crate::error::{PayloadError, ServiceError};
use crate::metrics::ServiceMetrics;
use crate::models::loader::Artifacts;
use crate::payload::{ContentKind, Payload};
use crate::types::prediction::Prediction;
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, FromRequest, Multipart, Request, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, info_span, warn, Instrument};
use uuid::Uuid;

/// Shared state handed to every handler.
pub struct AppState {
    pub artifacts: Artifacts,
    pub metrics: Arc<ServiceMetrics>,
    /// Largest accepted request body, in bytes
    pub max_body_bytes: usize,
}

/// Build the application router.
pub fn build_router(state: Arc<AppState>) -> Router {
    let limit = state.max_body_bytes;
    Router::new()
        .route("/predict", post(predict_handler))
        .route("/health", get(health_handler))
        .layer(DefaultBodyLimit::max(limit))
        .with_state(state)
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ServiceError {
    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::Payload(PayloadError::UnsupportedContentType(_)) => {
                StatusCode::UNSUPPORTED_MEDIA_TYPE
            }
            ServiceError::Payload(_) | ServiceError::Preprocessing(_) => StatusCode::BAD_REQUEST,
            ServiceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Inference(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            detail: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

async fn predict_handler(State(state): State<Arc<AppState>>, req: Request) -> Response {
    let request_id = Uuid::new_v4();
    let span = info_span!("predict", request_id = %request_id);

    async move {
        let start = Instant::now();
        state.metrics.record_request();

        match predict(&state, req).await {
            Ok(prediction) => {
                let elapsed = start.elapsed();
                state.metrics.record_prediction(elapsed, &prediction);
                info!(
                    label = prediction.label,
                    probability = prediction.probability,
                    latency_us = elapsed.as_micros() as u64,
                    "Prediction served"
                );
                Json(prediction).into_response()
            }
            Err(e) => {
                state.metrics.record_failure(e.kind(), start.elapsed());
                match &e {
                    ServiceError::Inference(_) => error!(error = %e, "Prediction failed"),
                    _ => warn!(kind = e.kind(), error = %e, "Request rejected"),
                }
                e.into_response()
            }
        }
    }
    .instrument(span)
    .await
}

async fn predict(state: &AppState, req: Request) -> Result<Prediction, ServiceError> {
    // The model check comes before anything about the request itself.
    let engine = state.artifacts.engine()?;

    let content_type = req
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok());
    let kind = ContentKind::from_header(content_type)?;

    let payload = match kind {
        ContentKind::Json => Payload::from_json(&read_body(req, state.max_body_bytes).await?)?,
        ContentKind::Csv | ContentKind::OctetStream => {
            Payload::from_csv(read_body(req, state.max_body_bytes).await?)?
        }
        ContentKind::Multipart => Payload::from_csv(read_upload(req).await?)?,
    };
    let table = payload.into_table()?;

    Ok(engine.predict_first(&table)?)
}

async fn read_body(req: Request, limit: usize) -> Result<Bytes, PayloadError> {
    axum::body::to_bytes(req.into_body(), limit)
        .await
        .map_err(|e| PayloadError::UnreadableBody(e.to_string()))
}

/// Bytes of the first file part of a form upload, or of the first part
/// when none carries a file name.
async fn read_upload(req: Request) -> Result<Bytes, PayloadError> {
    let mut multipart = Multipart::from_request(req, &())
        .await
        .map_err(|e| PayloadError::InvalidMultipart(e.body_text()))?;

    let mut first = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| PayloadError::InvalidMultipart(e.body_text()))?
    {
        let is_file = field.file_name().is_some();
        if first.is_some() && !is_file {
            continue;
        }
        let bytes = field
            .bytes()
            .await
            .map_err(|e| PayloadError::InvalidMultipart(e.body_text()))?;
        if is_file {
            return Ok(bytes);
        }
        first = Some(bytes);
    }
    first.ok_or(PayloadError::EmptyBody)
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    ok: bool,
    model_loaded: bool,
    scaler_loaded: bool,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        model_loaded: state.artifacts.model.is_loaded(),
        scaler_loaded: state.artifacts.manifest.is_loaded(),
    })
}
