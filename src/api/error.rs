use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::detect::ledger::AlertError;
use crate::pipeline::IngestError;
use crate::storage::StoreError;

/// Error type for HTTP handlers. Maps domain errors onto status codes and a
/// `{ "error", "code" }` JSON body.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Alert(#[from] AlertError),

    #[error(transparent)]
    Ingest(#[from] IngestError),

    #[error("bad request: {0}")]
    BadRequest(String),
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Status, machine-readable code and message for a store error. Shared with
/// the batch handler, which reports per-item failures inline.
pub(crate) fn classify_store_error(err: &StoreError) -> (StatusCode, &'static str) {
    match err {
        StoreError::UnknownMachine(_) => (StatusCode::NOT_FOUND, "UNKNOWN_MACHINE"),
        StoreError::DuplicateSerial(_) => (StatusCode::CONFLICT, "DUPLICATE_SERIAL"),
        StoreError::InvalidReading(_) => (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_READING"),
    }
}

pub(crate) fn classify_ingest_error(err: &IngestError) -> (StatusCode, &'static str) {
    match err {
        IngestError::Store(e) => classify_store_error(e),
        IngestError::Closed => (StatusCode::SERVICE_UNAVAILABLE, "PIPELINE_CLOSED"),
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Store(e) => classify_store_error(e),
            ApiError::Ingest(e) => classify_ingest_error(e),
            ApiError::Alert(e) => match e {
                AlertError::AlertNotFound(_) => (StatusCode::NOT_FOUND, "ALERT_NOT_FOUND"),
                AlertError::UnknownMachine(_) => (StatusCode::NOT_FOUND, "UNKNOWN_MACHINE"),
                AlertError::AlreadyResolved { .. } => (StatusCode::CONFLICT, "ALREADY_RESOLVED"),
            },
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
        };

        if status.is_server_error() {
            tracing::warn!(error = %self, "request failed");
        }

        let body = json!({
            "error": self.to_string(),
            "code": code,
        });
        (status, axum::Json(body)).into_response()
    }
}
