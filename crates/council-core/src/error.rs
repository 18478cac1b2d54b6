//! Error types for `council-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("unknown student status code: {0}")]
  UnknownStatus(i64),

  #[error("unknown transaction type code: {0}")]
  UnknownTransactionType(i64),

  #[error("unknown reference dimension: {0:?}")]
  UnknownDimension(String),

  #[error("malformed transaction payload: {0}")]
  MalformedPayload(String),

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
