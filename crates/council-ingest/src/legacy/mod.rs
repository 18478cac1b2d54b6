//! Migration of student records from the old council.
//!
//! Each requested faculty is fetched from a [`LegacySource`], every record is
//! normalised, and in [`MigrationMode::Store`] written together with its log
//! entries. Problems are reported per faculty and per student; only a
//! failure to read reference data aborts the whole call.

mod normalize;
mod source;

use chrono::{DateTime, Utc};
use council_core::{
  reference::{Dimension, ExternalIdentifierMap, Faculty, KeySource},
  store::{StudentKey, StudentStore, WriteOp, WritePlan},
  student::{NewStudent, SYSTEM_ACTOR},
  transaction::{EnrollmentSnapshot, NewTransaction, Payload, TransactionType},
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{info, warn};

pub use self::{
  normalize::{LEGACY_FIELDS, LegacyStudent, Normalized, normalize, parse_timestamp},
  source::{HttpLegacySource, LegacySource, students_from_body},
};
use crate::{
  error::{IngestError, LegacyError},
  record::{Group, IncomingRecord, RecordLayout},
  settings::IngestSettings,
  unique_id,
};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MigrationMode {
  /// Normalise and report, write nothing.
  #[default]
  Report,
  Store,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StudentVerdict {
  /// Already migrated from a record at least as recent; left alone.
  Exists,
  Replaced,
  Passed,
  Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StudentReport {
  pub id:       Option<String>,
  pub status:   StudentVerdict,
  pub messages: Vec<String>,
  /// The normalised record, in report mode.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub student:  Option<LegacyStudent>,
}

impl StudentReport {
  fn new(id: Option<&str>, status: StudentVerdict, messages: Vec<String>) -> Self {
    Self { id: id.map(str::to_owned), status, messages, student: None }
  }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationCounts {
  pub students: usize,
  pub exist:    usize,
  pub replaced: usize,
  pub passed:   usize,
  pub failed:   usize,
}

impl MigrationCounts {
  fn count(&mut self, verdict: StudentVerdict) {
    self.students += 1;
    match verdict {
      StudentVerdict::Exists => self.exist += 1,
      StudentVerdict::Replaced => self.replaced += 1,
      StudentVerdict::Passed => self.passed += 1,
      StudentVerdict::Failed => self.failed += 1,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FacultyReport {
  /// The old council's faculty id, as requested.
  pub faculty_key: String,
  pub faculty:     Option<Faculty>,
  /// Why the faculty could not be migrated at all.
  #[serde(skip_serializing_if = "Option::is_none")]
  pub error:       Option<String>,
  pub results:     MigrationCounts,
  pub students:    Vec<StudentReport>,
}

impl FacultyReport {
  fn failed(faculty_key: &str, faculty: Option<Faculty>, error: &LegacyError) -> Self {
    Self {
      faculty_key: faculty_key.to_owned(),
      faculty,
      error: Some(error.to_string()),
      results: MigrationCounts::default(),
      students: Vec::new(),
    }
  }
}

/// Migrate every faculty in `faculty_keys`, one after another.
pub async fn migrate<S: StudentStore, L: LegacySource>(
  store: &S,
  source: &L,
  faculty_keys: &[String],
  mode: MigrationMode,
  settings: &IngestSettings,
  now: DateTime<Utc>,
) -> Result<Vec<FacultyReport>, IngestError> {
  let rows = store.reference_rows().await.map_err(IngestError::store)?;
  let ids = ExternalIdentifierMap::build(&rows, KeySource::OldCouncil);
  let migration = Migration { store, ids, mode, settings, now };

  let mut reports = Vec::with_capacity(faculty_keys.len());
  for key in faculty_keys {
    let report = migration.faculty(source, key.trim()).await;
    if let Some(error) = &report.error {
      warn!(faculty = %key, %error, "faculty not migrated");
    } else {
      let r = report.results;
      info!(
        faculty = %key,
        ?mode,
        students = r.students,
        exist = r.exist,
        replaced = r.replaced,
        passed = r.passed,
        failed = r.failed,
        "migrated faculty"
      );
    }
    reports.push(report);
  }
  Ok(reports)
}

struct Migration<'a, S> {
  store:    &'a S,
  ids:      ExternalIdentifierMap,
  mode:     MigrationMode,
  settings: &'a IngestSettings,
  now:      DateTime<Utc>,
}

impl<S: StudentStore> Migration<'_, S> {
  async fn faculty<L: LegacySource>(&self, source: &L, key: &str) -> FacultyReport {
    let unknown = LegacyError::UnknownFaculty(key.to_owned());
    let Some(faculty_id) = self.ids.resolve(Dimension::Faculty, key) else {
      return FacultyReport::failed(key, None, &unknown);
    };
    let faculty = match self.store.faculty(faculty_id).await {
      Ok(Some(faculty)) => faculty,
      Ok(None) => return FacultyReport::failed(key, None, &unknown),
      Err(e) => return FacultyReport::failed(key, None, &LegacyError::store(e)),
    };

    let records = match source.fetch(key.to_owned()).await {
      Ok(records) => records,
      Err(e) => return FacultyReport::failed(key, Some(faculty), &e),
    };

    let mut results = MigrationCounts::default();
    let mut students = Vec::with_capacity(records.len());
    for value in &records {
      let report = self.student(value, &faculty).await;
      results.count(report.status);
      students.push(report);
    }
    FacultyReport { faculty_key: key.to_owned(), faculty: Some(faculty), error: None, results, students }
  }

  async fn student(&self, value: &Value, faculty: &Faculty) -> StudentReport {
    use StudentVerdict::*;

    let record = match IncomingRecord::parse(value, RecordLayout::LEGACY) {
      Ok(record) => record,
      Err(malformed) => {
        return StudentReport::new(malformed.external_id.as_deref(), Failed, vec![
          "Invalid student format, every student must contain student, secondaryEdu, and \
           studentUniversityEdu"
            .to_owned(),
        ]);
      }
    };
    let Some(old_id) = record.external_id.clone() else {
      return StudentReport::new(None, Failed, vec![
        "Missing student id, student id is required".to_owned(),
      ]);
    };
    let id = Some(old_id.as_str());

    let existing = match self.store.find_student(StudentKey::OldCouncilId(old_id.clone())).await {
      Ok(existing) => existing,
      Err(e) => return StudentReport::new(id, Failed, vec![unexpected(&e)]),
    };
    let accepted_at = record
      .text(Group::Acceptance, "AcceptDate")
      .as_deref()
      .and_then(parse_timestamp);

    let mut messages = Vec::new();
    let replaced = match &existing {
      Some(found) if accepted_at.is_some_and(|at| at > found.created_at) => {
        messages.push("Student already exists and will be replaced".to_owned());
        Some(found)
      }
      Some(_) => {
        return StudentReport::new(id, Exists, vec![
          "Student already exists with newer date".to_owned(),
        ]);
      }
      None => None,
    };

    let Normalized { student, messages: found } =
      normalize(record, &old_id, &self.ids, faculty, self.settings);
    messages.extend(found);
    let Some(student) = student else {
      return StudentReport::new(id, Failed, messages);
    };
    let verdict = if replaced.is_some() { Replaced } else { Passed };

    if self.mode == MigrationMode::Report {
      return StudentReport { student: Some(student), ..StudentReport::new(id, verdict, messages) };
    }

    let mut plan = WritePlan::new();
    if let Some(found) = replaced {
      plan
        .push(WriteOp::DeleteStudent(found.id))
        .push(WriteOp::PurgeTransactions { unique_id: found.unique_id.clone() });
    }
    if let Err(e) = plan_insert(&mut plan, student, self.now) {
      messages.push(unexpected(&e));
      return StudentReport::new(id, Failed, messages);
    }
    match self.store.commit(plan).await {
      Ok(_) => StudentReport::new(id, verdict, messages),
      Err(e) => {
        warn!(old_council_id = %old_id, error = %e, "migrated student not stored");
        messages.push(unexpected(&e));
        StudentReport::new(id, Failed, messages)
      }
    }
  }
}

fn unexpected(error: &dyn std::fmt::Display) -> String {
  format!("Student did not stored due to unexpected db error, {error}")
}

/// Insert a migrated student and log where it came from.
fn plan_insert(
  plan: &mut WritePlan,
  student: LegacyStudent,
  now: DateTime<Utc>,
) -> council_core::Result<()> {
  let created_at = student.accepted_at.unwrap_or(now);
  let created_by = student.modified_by.unwrap_or(SYSTEM_ACTOR);
  let unique_id = unique_id::generate(created_at);
  let transfer_actor = student.transfer_actor();

  let snapshot = EnrollmentSnapshot::capture(Some(student.status), None, &student.enrollment);
  let transfer = student.enrollment.transfer_date.map(|_| {
    let origin = student.original_faculty_id.map(|faculty_id| EnrollmentSnapshot {
      faculty_id: Some(faculty_id),
      university_id: student.original_university_id,
      ..Default::default()
    });
    (origin, EnrollmentSnapshot::capture(None, None, &student.enrollment))
  });

  plan.push(WriteOp::InsertStudent(Box::new(NewStudent {
    unique_id: unique_id.clone(),
    external_id: None,
    old_council_id: Some(student.old_council_id),
    status: student.status,
    person: student.person,
    secondary: student.secondary,
    enrollment: student.enrollment,
    application: None,
    created_at,
    created_by,
  })));
  plan.log(
    NewTransaction::new(&unique_id, TransactionType::DataFromOldSystem, SYSTEM_ACTOR, now)
      .updated(Payload::snapshot(&snapshot)?),
  );

  if let Some((origin, transferred)) = transfer {
    let original = match origin {
      Some(origin) => Payload::snapshot(&origin)?,
      None => Payload::Empty,
    };
    plan.log(
      NewTransaction::new(&unique_id, TransactionType::TransferFaculty, transfer_actor, now)
        .original(original)
        .updated(Payload::snapshot(&transferred)?),
    );
  }
  Ok(())
}
