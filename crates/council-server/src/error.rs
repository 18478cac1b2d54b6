//! Error types and axum `IntoResponse` implementation.

use std::path::PathBuf;

use axum::{
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unauthorized")]
  Unauthorized,

  #[error("config error: {0}")]
  Config(String),

  #[error("cannot read reference seed {path}: {source}")]
  SeedIo {
    path:   PathBuf,
    #[source]
    source: std::io::Error,
  },

  #[error("invalid reference seed {path}: {source}")]
  SeedFormat {
    path:   PathBuf,
    #[source]
    source: serde_json::Error,
  },
}

impl IntoResponse for Error {
  fn into_response(self) -> Response {
    match self {
      Error::Unauthorized => {
        let mut res = (StatusCode::UNAUTHORIZED, "Unauthorized").into_response();
        res
          .headers_mut()
          .insert(header::WWW_AUTHENTICATE, HeaderValue::from_static("Bearer realm=\"council\""));
        res
      }
      other => {
        tracing::error!(error = %other, "request failed");
        (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response()
      }
    }
  }
}
