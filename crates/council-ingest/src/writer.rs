//! Turning decisions into write plans.
//!
//! Each `plan_*` function builds the complete [`WritePlan`] for one record,
//! log entries included, so that a single [`StudentStore::commit`] either
//! applies all of it or nothing.
//!
//! [`StudentStore::commit`]: council_core::store::StudentStore::commit

use chrono::{DateTime, NaiveDate, Utc};
use council_core::{
  Result,
  store::{StudentChanges, WriteOp, WritePlan},
  student::{NewStudent, StudentBundle, StudentStatus, UniversityEnrollment},
  transaction::{
    EnrollmentSnapshot, NewTransaction, Payload, Slot, TransactionLogEntry, TransactionType,
  },
};

use crate::mapper::MappedRecord;

/// Who makes a change, and when.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stamp {
  pub actor: i64,
  pub at:    DateTime<Utc>,
}

impl Stamp {
  fn entry(&self, unique_id: &str, kind: TransactionType) -> NewTransaction {
    NewTransaction::new(unique_id, kind, self.actor, self.at)
  }
}

fn scalar<T: ToString>(value: Option<T>) -> Payload {
  value.map_or(Payload::Empty, Payload::scalar)
}

// ─── Create ──────────────────────────────────────────────────────────────────

pub fn plan_create(
  unique_id: String,
  external_id: &str,
  mapped: MappedRecord,
  stamp: Stamp,
) -> Result<WritePlan> {
  let status = StudentStatus::InitiallyAccepted;
  let snapshot = EnrollmentSnapshot::capture(Some(status), Some(external_id), &mapped.enrollment);

  let mut plan = WritePlan::new();
  plan
    .push(WriteOp::InsertStudent(Box::new(NewStudent {
      unique_id: unique_id.clone(),
      external_id: Some(external_id.to_owned()),
      old_council_id: None,
      status,
      person: mapped.person,
      secondary: mapped.secondary,
      enrollment: mapped.enrollment,
      application: Some(mapped.application),
      created_at: stamp.at,
      created_by: stamp.actor,
    })))
    .log(
      stamp
        .entry(&unique_id, TransactionType::AddedFromIntake)
        .updated(Payload::snapshot(&snapshot)?),
    );
  Ok(plan)
}

// ─── Update ──────────────────────────────────────────────────────────────────

/// Overwrite a student with a resubmitted record. Returns `None` when the
/// record changes nothing.
pub fn plan_update(
  current: &StudentBundle,
  mapped: MappedRecord,
  external_id: &str,
  stamp: Stamp,
) -> Result<Option<WritePlan>> {
  let student = &current.student;
  let status = StudentStatus::InitiallyAccepted;

  let mut person = mapped.person;
  person.notes = student.person.notes.clone();

  let enrollment = UniversityEnrollment {
    path_shift_date: current.enrollment.path_shift_date,
    level_id: current.enrollment.level_id,
    transfer_date: current.enrollment.transfer_date,
    total_equivalent_hours: current.enrollment.total_equivalent_hours.clone(),
    ..mapped.enrollment
  };
  let application = Some(mapped.application);

  let status_changed = student.status != status;
  let external_id_changed = student.external_id.as_deref() != Some(external_id);
  let person_changed = person != student.person;
  let secondary_changed = mapped.secondary != current.secondary;
  let enrollment_changed = enrollment != current.enrollment;
  let application_changed = application != current.application;

  if !(status_changed
    || external_id_changed
    || person_changed
    || secondary_changed
    || enrollment_changed
    || application_changed)
  {
    return Ok(None);
  }

  let unique_id = student.unique_id.as_str();
  let mut plan = WritePlan::new();

  let mut changes = StudentChanges::new(stamp.actor, stamp.at);
  changes.status = status_changed.then_some(status);
  changes.external_id = external_id_changed.then(|| Some(external_id.to_owned()));
  changes.person = person_changed.then(|| person.clone());
  plan.push(WriteOp::UpdateStudent { id: student.id, changes });

  if secondary_changed {
    plan.push(WriteOp::ReplaceSecondary { id: student.id, secondary: mapped.secondary.clone() });
  }
  if enrollment_changed {
    plan.push(WriteOp::ReplaceEnrollment { id: student.id, enrollment: enrollment.clone() });
  }
  if application_changed {
    plan.push(WriteOp::ReplaceApplication { id: student.id, application });
  }

  // One entry per tracked field that changed.
  let old_secondary = &current.secondary;
  let fields = [
    (
      TransactionType::NameChange,
      Some(student.person.full_name.clone()),
      Some(person.full_name.clone()),
    ),
    (
      TransactionType::NationalIdChange,
      student.person.national_id.clone(),
      person.national_id.clone(),
    ),
    (
      TransactionType::SecondaryTotalChange,
      old_secondary.total.clone(),
      mapped.secondary.total.clone(),
    ),
    (
      TransactionType::SecondaryEquivalentTotalChange,
      old_secondary.equivalent_total.clone(),
      mapped.secondary.equivalent_total.clone(),
    ),
    (
      TransactionType::CertificateChange,
      old_secondary.certificate_id.map(|id| id.to_string()),
      mapped.secondary.certificate_id.map(|id| id.to_string()),
    ),
    (
      TransactionType::CertificateYearChange,
      old_secondary.certificate_year_id.map(|id| id.to_string()),
      mapped.secondary.certificate_year_id.map(|id| id.to_string()),
    ),
  ];
  for (kind, before, after) in fields {
    if before != after {
      plan.log(stamp.entry(unique_id, kind).original(scalar(before)).updated(scalar(after)));
    }
  }
  if status_changed {
    if let Some(kind) = TransactionType::status_change(status) {
      plan.log(
        stamp
          .entry(unique_id, kind)
          .original(Payload::scalar(student.status.code()))
          .updated(Payload::scalar(status.code())),
      );
    }
  }

  let before =
    EnrollmentSnapshot::capture(Some(student.status), student.external_id.as_deref(), &current.enrollment);
  let after = EnrollmentSnapshot::capture(Some(status), Some(external_id), &enrollment);
  plan.log(
    stamp
      .entry(unique_id, TransactionType::AddedFromIntake)
      .original(Payload::snapshot(&before)?)
      .updated(Payload::snapshot(&after)?),
  );

  Ok(Some(plan))
}

// ─── Path-shift and re-enrolment ─────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Relocation {
  PathShift,
  Enroll,
}

/// Move a student into the faculty of an incoming record. Only the
/// enrollment, the status and the external id change.
pub fn plan_relocate(
  relocation: Relocation,
  current: &StudentBundle,
  target: &MappedRecord,
  external_id: &str,
  primary_registration_type_id: i64,
  stamp: Stamp,
) -> Result<WritePlan> {
  let student = &current.student;
  let status = StudentStatus::InitiallyAccepted;
  let incoming = &target.enrollment;

  let mut enrollment = current.enrollment.clone();
  enrollment.faculty_id = incoming.faculty_id;
  enrollment.university_id = incoming.university_id;
  enrollment.enroll_year_id = incoming.enroll_year_id;
  enrollment.enroll_semester_id = incoming.enroll_semester_id;
  enrollment.enroll_stage_id = incoming.enroll_stage_id;
  enrollment.registration_type_id = Some(primary_registration_type_id);
  if incoming.total.is_some() {
    enrollment.total = incoming.total.clone();
  }
  if relocation == Relocation::PathShift {
    let shifted_on: NaiveDate = target.application.decided_at.unwrap_or(stamp.at.date_naive());
    enrollment.path_shift_date = Some(shifted_on);
  }

  let mut changes = StudentChanges::new(stamp.actor, stamp.at);
  changes.status = Some(status);
  changes.external_id = Some(Some(external_id.to_owned()));

  let mut plan = WritePlan::new();
  plan
    .push(WriteOp::UpdateStudent { id: student.id, changes })
    .push(WriteOp::ReplaceEnrollment { id: student.id, enrollment: enrollment.clone() });

  let entry = match relocation {
    Relocation::PathShift => {
      let before = EnrollmentSnapshot::capture(
        Some(student.status),
        student.external_id.as_deref(),
        &current.enrollment,
      );
      let after = EnrollmentSnapshot::capture(Some(status), Some(external_id), &enrollment);
      stamp
        .entry(&student.unique_id, TransactionType::PathShift)
        .original(Payload::snapshot_recording(&before, &[Slot::ExternalId, Slot::Total])?)
        .updated(Payload::snapshot(&after)?)
    }
    Relocation::Enroll => {
      let before = EnrollmentSnapshot::capture(
        Some(student.status),
        student.external_id.as_deref(),
        &current.enrollment,
      );
      let after = EnrollmentSnapshot::capture(Some(status), Some(external_id), &enrollment);
      stamp
        .entry(&student.unique_id, TransactionType::AddedFromIntake)
        .original(Payload::snapshot(&before)?)
        .updated(Payload::snapshot(&after)?)
    }
  };
  plan.log(entry);
  Ok(plan)
}

// ─── Withdrawal ──────────────────────────────────────────────────────────────

/// Withdraw an initially-accepted student. A student who got here through a
/// path-shift goes back to where the shift found them; anyone else is
/// deleted.
pub fn plan_withdraw(
  current: &StudentBundle,
  latest_shift: Option<&TransactionLogEntry>,
  external_id: &str,
  stamp: Stamp,
) -> Result<WritePlan> {
  let student = &current.student;
  let mut plan = WritePlan::new();

  match latest_shift.and_then(|entry| entry.original.as_document()) {
    Some(doc) => {
      let before = EnrollmentSnapshot::from_document(doc);
      let mut enrollment = current.enrollment.clone();
      enrollment.faculty_id = before.faculty_id;
      enrollment.university_id = before.university_id;
      enrollment.enroll_year_id = before.enroll_year_id;
      enrollment.enroll_semester_id = before.enroll_semester_id;
      enrollment.enroll_stage_id = before.enroll_stage_id;
      enrollment.registration_type_id = before.registration_type_id;
      enrollment.path_shift_date = before.path_shift_date;
      if before.total.is_some() {
        enrollment.total = before.total.clone();
      }

      let mut changes = StudentChanges::new(stamp.actor, stamp.at);
      changes.status = Some(before.status()?.unwrap_or(StudentStatus::Withdrawn));
      plan
        .push(WriteOp::UpdateStudent { id: student.id, changes })
        .push(WriteOp::ReplaceEnrollment { id: student.id, enrollment });
    }
    None => {
      plan.push(WriteOp::DeleteStudent(student.id));
    }
  }

  plan.log(
    stamp
      .entry(&student.unique_id, TransactionType::WithdrawByIntake)
      .original(Payload::scalar(external_id)),
  );
  Ok(plan)
}
