//! Error type for `council-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] council_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  /// A stored value that does not decode into its domain type.
  #[error("cannot decode stored value: {0}")]
  Decode(String),

  /// A write plan referenced a student that does not exist.
  #[error("student not found: {0}")]
  StudentNotFound(i64),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
