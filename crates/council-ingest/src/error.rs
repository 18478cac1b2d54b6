//! Error types for the reconciliation engine.
//!
//! Per-record problems are never errors: they become a
//! [`RecordOutcome`](crate::RecordOutcome). The types here cover failures of
//! a whole call.

use council_core::transaction::TransactionType;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A failure that aborts a whole ingestion, withdrawal or cleanup call.
#[derive(Debug, Error)]
pub enum IngestError {
  #[error("the request contains no students")]
  EmptyBatch,

  #[error("no current academic year and semester are configured")]
  NoCurrentPeriod,

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error(transparent)]
  Core(#[from] council_core::Error),
}

impl IngestError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

/// Why a revert was refused or failed.
#[derive(Debug, Error)]
pub enum RevertError {
  #[error("student {0} not found")]
  StudentNotFound(i64),

  #[error("transaction {0} not found")]
  TransactionNotFound(i64),

  #[error("transaction {transaction_id} does not belong to student {student_id}")]
  ForeignTransaction { transaction_id: i64, student_id: i64 },

  #[error("{0} transactions cannot be reverted")]
  NotRevertible(TransactionType),

  #[error("transaction {0} does not hold enough data to be reverted")]
  IncompletePayload(i64),

  #[error("store error: {0}")]
  Store(#[source] BoxError),

  #[error(transparent)]
  Core(#[from] council_core::Error),
}

impl RevertError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}

/// A failure to obtain one faculty's records from the old council.
#[derive(Debug, Error)]
pub enum LegacyError {
  #[error("No faculty found with id: {0}")]
  UnknownFaculty(String),

  #[error("Failed to establish a new connection, {0}")]
  Connection(String),

  #[error("The old council answered with HTTP {0}")]
  Status(u16),

  #[error("Invalid JSON format, {0}")]
  Json(String),

  #[error("Invalid data format, data must have students array")]
  MissingStudents,

  #[error("Could not build the HTTP client, {0}")]
  Client(String),

  #[error("store error: {0}")]
  Store(#[source] BoxError),
}

impl LegacyError {
  pub fn store(e: impl std::error::Error + Send + Sync + 'static) -> Self {
    Self::Store(Box::new(e))
  }
}
