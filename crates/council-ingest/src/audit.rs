//! Reading the transaction log back, and reverting entries.
//!
//! A revert never erases anything: it writes the entry's original state back
//! and logs a [`TransactionType::RevertStudentData`] entry whose original is
//! the state it replaced. Reverting that entry in turn undoes the revert.

use chrono::{DateTime, Utc};
use council_core::{
  store::{StudentChanges, StudentStore, WriteOp, WritePlan},
  student::{StudentId, StudentStatus},
  transaction::{
    EnrollmentSnapshot, NewTransaction, Payload, Slot, TransactionLogEntry, TransactionType,
    can_revert,
  },
};
use serde::Serialize;
use tracing::info;

use crate::error::{IngestError, RevertError};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
  #[serde(flatten)]
  pub entry:      TransactionLogEntry,
  pub can_revert: bool,
}

/// Every log entry of a student, oldest first.
pub async fn history<S: StudentStore>(
  store: &S,
  unique_id: &str,
) -> Result<Vec<HistoryEntry>, IngestError> {
  let entries = store.transactions(unique_id.to_owned()).await.map_err(IngestError::store)?;
  Ok(
    entries
      .into_iter()
      .map(|entry| HistoryEntry { can_revert: can_revert(entry.kind, &entry.original), entry })
      .collect(),
  )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertReport {
  pub student_id:     StudentId,
  pub transaction_id: i64,
  pub kind:           TransactionType,
  pub status:         StudentStatus,
  /// The enrollment state written back.
  pub restored:       EnrollmentSnapshot,
}

pub async fn revert<S: StudentStore>(
  store: &S,
  student_id: StudentId,
  transaction_id: i64,
  actor: i64,
  now: DateTime<Utc>,
) -> Result<RevertReport, RevertError> {
  let current = store
    .student(student_id)
    .await
    .map_err(RevertError::store)?
    .ok_or(RevertError::StudentNotFound(student_id))?;
  let entry = store
    .transaction(transaction_id)
    .await
    .map_err(RevertError::store)?
    .ok_or(RevertError::TransactionNotFound(transaction_id))?;

  let student = &current.student;
  if entry.unique_id != student.unique_id {
    return Err(RevertError::ForeignTransaction { transaction_id, student_id });
  }
  if entry.kind.revert_slots().is_none() {
    return Err(RevertError::NotRevertible(entry.kind));
  }
  let Some(doc) = entry.original.as_document().filter(|_| can_revert(entry.kind, &entry.original))
  else {
    return Err(RevertError::IncompletePayload(transaction_id));
  };

  let target = EnrollmentSnapshot::from_document(doc);
  let status = target.status()?.unwrap_or(student.status);
  let replaced =
    EnrollmentSnapshot::capture(Some(student.status), student.external_id.as_deref(), &current.enrollment);

  let mut enrollment = current.enrollment.clone();
  target.restore_into(&mut enrollment);
  if Slot::Total.is_recorded(doc) {
    enrollment.total = target.total.clone();
  }
  let external_id = if Slot::ExternalId.is_recorded(doc) {
    target.external_id.clone()
  } else {
    student.external_id.clone()
  };

  let mut changes = StudentChanges::new(actor, now);
  changes.status = (status != student.status).then_some(status);
  changes.external_id = (external_id != student.external_id).then(|| external_id.clone());

  let mut plan = WritePlan::new();
  plan
    .push(WriteOp::UpdateStudent { id: student.id, changes })
    .push(WriteOp::ReplaceEnrollment { id: student.id, enrollment: enrollment.clone() })
    .log(
      NewTransaction::new(&student.unique_id, TransactionType::RevertStudentData, actor, now)
        .original(Payload::snapshot_recording(&replaced, &[Slot::ExternalId, Slot::Total])?)
        .updated(Payload::Document(doc.clone())),
    );
  if status != student.status {
    if let Some(kind) = TransactionType::status_change(status) {
      plan.log(
        NewTransaction::new(&student.unique_id, kind, actor, now)
          .original(Payload::scalar(student.status.code()))
          .updated(Payload::scalar(status.code())),
      );
    }
  }

  store.commit(plan).await.map_err(RevertError::store)?;
  info!(student_id, transaction_id, kind = %entry.kind, "reverted transaction");

  Ok(RevertReport {
    student_id,
    transaction_id,
    kind: entry.kind,
    status,
    restored: EnrollmentSnapshot::capture(Some(status), external_id.as_deref(), &enrollment),
  })
}
