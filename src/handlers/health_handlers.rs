//! Health & readiness handlers.
//!
//! - GET /health  -> liveness plus the configured backend type
//! - GET /readyz  -> readiness; asks the backend about a probe key

use crate::services::storage_service::StorageService;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use tracing::warn;

/// `GET /health`
///
/// Never touches the backend.
pub async fn health(State(service): State<StorageService>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            storage: service.kind().as_str(),
        }),
    )
}

/// `GET /readyz`
///
/// Stats a random key in the default bucket. Any answer from the provider,
/// including "not found", means it is reachable: 200. Anything else: 503.
pub async fn readyz(State(service): State<StorageService>) -> impl IntoResponse {
    let (status, body) = match service.probe().await {
        Ok(()) => (
            StatusCode::OK,
            ReadyResponse {
                status: "ok",
                storage: service.kind().as_str(),
                bucket: service.default_bucket().to_string(),
                error: None,
            },
        ),
        Err(err) => {
            warn!("readiness probe failed: {}", err);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                ReadyResponse {
                    status: "error",
                    storage: service.kind().as_str(),
                    bucket: service.default_bucket().to_string(),
                    error: Some(err.to_string()),
                },
            )
        }
    };
    (status, Json(body))
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    storage: &'static str,
}

#[derive(Serialize)]
struct ReadyResponse {
    status: &'static str,
    storage: &'static str,
    bucket: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}
