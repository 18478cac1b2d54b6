//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use council_ingest::{IngestError, RevertError};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("not found: {0}")]
  NotFound(String),

  #[error("bad request: {0}")]
  BadRequest(String),

  /// Well-formed, but refused by the engine.
  #[error("unprocessable: {0}")]
  Unprocessable(String),

  #[error("unavailable: {0}")]
  Unavailable(String),

  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("internal error: {0}")]
  Internal(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl From<IngestError> for ApiError {
  fn from(e: IngestError) -> Self {
    match e {
      IngestError::EmptyBatch => ApiError::BadRequest(e.to_string()),
      IngestError::NoCurrentPeriod => ApiError::Unprocessable(e.to_string()),
      IngestError::Store(inner) => ApiError::Store(inner),
      IngestError::Core(inner) => ApiError::Internal(Box::new(inner)),
    }
  }
}

impl From<RevertError> for ApiError {
  fn from(e: RevertError) -> Self {
    match e {
      RevertError::StudentNotFound(_) | RevertError::TransactionNotFound(_) => {
        ApiError::NotFound(e.to_string())
      }
      RevertError::ForeignTransaction { .. }
      | RevertError::NotRevertible(_)
      | RevertError::IncompletePayload(_) => ApiError::Unprocessable(e.to_string()),
      RevertError::Store(inner) => ApiError::Store(inner),
      RevertError::Core(inner) => ApiError::Internal(Box::new(inner)),
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, message) = match &self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
      ApiError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m.clone()),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),
      ApiError::Store(e) | ApiError::Internal(e) => {
        error!(error = %e, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
      }
    };
    (status, Json(json!({ "error": message }))).into_response()
  }
}
