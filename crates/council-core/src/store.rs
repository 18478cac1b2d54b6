//! The `StudentStore` trait and supporting query and write types.
//!
//! The trait is implemented by storage backends (e.g.
//! `council-store-sqlite`). The reconciliation engine and the HTTP layer
//! depend on this abstraction, not on any concrete backend.

use std::future::Future;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  reference::{AcademicPeriod, Faculty, ReferenceRow},
  student::{
    AcceptedApplication, NewStudent, PersonDetails, SecondaryEducation, StudentBundle,
    StudentId, StudentStatus, UniversityEnrollment,
  },
  transaction::{NewTransaction, TransactionLogEntry, TransactionType},
};

// ─── Query types ─────────────────────────────────────────────────────────────

/// One identifying key to look a student up by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StudentKey {
  ExternalId(String),
  NationalId(String),
  /// Secondary-school seat number within one certificate year.
  SeatNumber {
    seat_number:         String,
    certificate_year_id: i64,
  },
  Passport(String),
  OldCouncilId(String),
}

/// What the engine needs to know about a matched student to classify an
/// incoming record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentMatch {
  pub id:                   StudentId,
  pub unique_id:            String,
  pub external_id:          Option<String>,
  pub national_id:          Option<String>,
  pub status:               StudentStatus,
  pub faculty_id:           Option<i64>,
  pub faculty_family_id:    Option<i64>,
  pub enroll_year_code:     Option<String>,
  pub enroll_semester_code: Option<String>,
  pub path_shift_date:      Option<NaiveDate>,
  pub created_at:           DateTime<Utc>,
}

/// A student row sharing its external id with another initially-accepted row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DuplicateRecord {
  pub id:          StudentId,
  pub external_id: String,
  pub unique_id:   String,
}

// ─── Write plans ─────────────────────────────────────────────────────────────

/// Changes to the student row itself. `None` leaves a field untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct StudentChanges {
  pub status:      Option<StudentStatus>,
  /// `Some(None)` clears the external id.
  pub external_id: Option<Option<String>>,
  pub person:      Option<PersonDetails>,
  pub updated_at:  DateTime<Utc>,
  pub updated_by:  i64,
}

impl StudentChanges {
  pub fn new(updated_by: i64, updated_at: DateTime<Utc>) -> Self {
    Self { status: None, external_id: None, person: None, updated_at, updated_by }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
  InsertStudent(Box<NewStudent>),
  /// Deletes the student and its satellites. Log entries are kept.
  DeleteStudent(StudentId),
  UpdateStudent {
    id:      StudentId,
    changes: StudentChanges,
  },
  ReplaceSecondary {
    id:        StudentId,
    secondary: SecondaryEducation,
  },
  ReplaceEnrollment {
    id:         StudentId,
    enrollment: UniversityEnrollment,
  },
  ReplaceApplication {
    id:          StudentId,
    application: Option<AcceptedApplication>,
  },
  /// Deletes every log entry of a unique id.
  PurgeTransactions { unique_id: String },
  AppendTransaction(NewTransaction),
}

/// An ordered list of writes applied all-or-nothing by
/// [`StudentStore::commit`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WritePlan {
  ops: Vec<WriteOp>,
}

impl WritePlan {
  pub fn new() -> Self { Self::default() }

  pub fn push(&mut self, op: WriteOp) -> &mut Self {
    self.ops.push(op);
    self
  }

  pub fn log(&mut self, entry: NewTransaction) -> &mut Self {
    self.push(WriteOp::AppendTransaction(entry))
  }

  pub fn ops(&self) -> &[WriteOp] { &self.ops }

  pub fn into_ops(self) -> Vec<WriteOp> { self.ops }

  pub fn is_empty(&self) -> bool { self.ops.is_empty() }
}

/// What a committed plan produced.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReceipt {
  /// Ids of inserted students, in plan order.
  pub inserted: Vec<StudentId>,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a student-records backend.
///
/// The transaction log is append-only except for explicit purges by the
/// repeated-record cleanup.
///
/// All methods return `Send` futures so the trait can be used in
/// multi-threaded async runtimes (e.g. tokio with `axum`).
pub trait StudentStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Reference data ────────────────────────────────────────────────────

  /// Every lookup row, across all dimensions.
  fn reference_rows(
    &self,
  ) -> impl Future<Output = Result<Vec<ReferenceRow>, Self::Error>> + Send + '_;

  /// The year and semester flagged as current, if both are set.
  fn current_period(
    &self,
  ) -> impl Future<Output = Result<Option<AcademicPeriod>, Self::Error>> + Send + '_;

  fn faculty(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Faculty>, Self::Error>> + Send + '_;

  // ── Students ──────────────────────────────────────────────────────────

  /// Most recently created student matching `key`, if any.
  fn find_student(
    &self,
    key: StudentKey,
  ) -> impl Future<Output = Result<Option<StudentMatch>, Self::Error>> + Send + '_;

  fn student(
    &self,
    id: StudentId,
  ) -> impl Future<Output = Result<Option<StudentBundle>, Self::Error>> + Send + '_;

  /// For every external id held by more than one initially-accepted
  /// student, the oldest such student.
  fn duplicate_records(
    &self,
  ) -> impl Future<Output = Result<Vec<DuplicateRecord>, Self::Error>> + Send + '_;

  // ── Transaction log ───────────────────────────────────────────────────

  /// All entries for `unique_id`, oldest first.
  fn transactions(
    &self,
    unique_id: String,
  ) -> impl Future<Output = Result<Vec<TransactionLogEntry>, Self::Error>> + Send + '_;

  fn transaction(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<TransactionLogEntry>, Self::Error>> + Send + '_;

  fn latest_transaction(
    &self,
    unique_id: String,
    kind: TransactionType,
  ) -> impl Future<Output = Result<Option<TransactionLogEntry>, Self::Error>> + Send + '_;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Apply every operation of `plan` in one storage transaction. If any
  /// operation fails nothing is written.
  fn commit(
    &self,
    plan: WritePlan,
  ) -> impl Future<Output = Result<CommitReceipt, Self::Error>> + Send + '_;
}
