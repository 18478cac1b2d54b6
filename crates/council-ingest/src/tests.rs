//! End-to-end scenarios for the engine against an in-memory `SqliteStore`.

use chrono::{DateTime, NaiveDate, TimeZone as _, Utc};
use council_core::{
  reference::{AcademicPeriod, Dimension, Faculty, ReferenceRow},
  reservation::InMemoryReservations,
  store::{
    CommitReceipt, DuplicateRecord, StudentKey, StudentMatch, StudentStore, WriteOp, WritePlan,
  },
  student::{
    NewStudent, PersonDetails, SecondaryEducation, StudentBundle, StudentId, StudentStatus,
    UniversityEnrollment,
  },
  transaction::{TransactionLogEntry, TransactionType},
};
use council_store_sqlite::SqliteStore;
use serde_json::{Value, json};

use crate::{
  IngestError, IngestSettings, Ingestor, LegacyError, RecordOutcome, RevertError,
  legacy::{self, LegacySource, MigrationMode, StudentVerdict},
};

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn now() -> DateTime<Utc> { Utc.with_ymd_and_hms(2024, 9, 1, 12, 0, 0).unwrap() }

fn row(dimension: Dimension, id: i64, intake: &str, old: &str) -> ReferenceRow {
  let key = |k: &str| (!k.is_empty()).then(|| k.to_owned());
  ReferenceRow {
    intake_key: key(intake),
    old_council_key: key(old),
    ..ReferenceRow::new(dimension, id)
  }
}

fn faculty(id: i64, intake: &str, old: &str, family: i64) -> ReferenceRow {
  ReferenceRow { university_id: Some(1), family_id: Some(family), ..row(Dimension::Faculty, id, intake, old) }
}

fn period(dimension: Dimension, id: i64, code: &str, current: bool) -> ReferenceRow {
  ReferenceRow {
    code: Some(code.to_owned()),
    is_current: current,
    ..row(dimension, id, code, code)
  }
}

fn reference_rows() -> Vec<ReferenceRow> {
  vec![
    faculty(7, "F7", "70", 2),
    faculty(8, "F8", "80", 12),
    faculty(9, "F9", "", 5),
    row(Dimension::University, 1, "U1", ""),
    period(Dimension::Year, 19, "2019", false),
    period(Dimension::Year, 23, "2023", false),
    period(Dimension::Year, 24, "2024", true),
    period(Dimension::Semester, 1, "1", true),
    period(Dimension::Semester, 2, "2", false),
    row(Dimension::Stage, 1, "1", ""),
    row(Dimension::Certificate, 1, "1", "1"),
    row(Dimension::StudyGroup, 3, "S1", "2"),
    row(Dimension::RegistrationType, 1, "1", "1"),
    row(Dimension::Region, 1, "1", "1"),
    row(Dimension::Gender, 1, "M", "0"),
    row(Dimension::Gender, 2, "F", "1"),
    row(Dimension::Status, 2, "", "2"),
    row(Dimension::User, 5, "", "500"),
  ]
}

async fn store() -> SqliteStore {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  store.seed_reference_rows(reference_rows()).await.unwrap();
  store
}

/// A complete intake record for a domestic general-secondary student.
fn intake(external_id: &str, national_id: &str, faculty: &str) -> Value {
  json!({
    "student": {
      "id": external_id,
      "studentNameAr": "محمد احمد علي حسن",
      "studentNID": national_id,
      "studentNationality_id": "1",
      "studentGender_id": "M",
      "studentBirthDate": "2005-03-02",
      "studentMail": "student@example.edu.eg"
    },
    "studentEdu": {
      "studentSecondaryCert_id": "1",
      "year_id": "2023",
      "studentSpecialization_id": "S1",
      "studentTot": "390",
      "studentSeatNumber": "654321"
    },
    "studentAcceptance": {
      "fac_id": faculty,
      "univ_id": "U1",
      "semester_id": "1",
      "stage_id": "1",
      "accept_year_id": "2024",
      "registrationType": "1",
      "accept_studentTot": "390",
      "manualAddition": false,
      "accept_createdBy": "admin",
      "accept_createdAt": "2024-08-01T10:00:00"
    }
  })
}

/// Put a student straight into the store, bypassing the engine.
async fn seed(
  store: &SqliteStore,
  external_id: &str,
  status: StudentStatus,
  faculty: i64,
  year: i64,
) -> StudentId {
  let mut plan = WritePlan::new();
  plan.push(WriteOp::InsertStudent(Box::new(NewStudent {
    unique_id: format!("U-{external_id}"),
    external_id: Some(external_id.to_owned()),
    old_council_id: None,
    status,
    person: PersonDetails {
      full_name: "احمد محمد علي حسن".into(),
      national_id: Some(format!("2900101012{:04}", external_id.len())),
      nationality_id: Some(1),
      ..Default::default()
    },
    secondary: SecondaryEducation { certificate_id: Some(1), ..Default::default() },
    enrollment: UniversityEnrollment {
      faculty_id: Some(faculty),
      university_id: Some(1),
      enroll_year_id: Some(year),
      enroll_semester_id: Some(1),
      enroll_stage_id: Some(1),
      registration_type_id: Some(1),
      ..Default::default()
    },
    application: None,
    created_at: Utc.with_ymd_and_hms(2023, 8, 1, 9, 0, 0).unwrap(),
    created_by: 0,
  })));
  store.commit(plan).await.unwrap().inserted[0]
}

async fn submit(store: &SqliteStore, records: &[Value]) -> Vec<RecordOutcome> {
  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  Ingestor::new(store, &reservations, &settings).submit_at(records, now()).await.unwrap()
}

async fn by_external_id(store: &SqliteStore, external_id: &str) -> Option<StudentId> {
  store
    .find_student(StudentKey::ExternalId(external_id.to_owned()))
    .await
    .unwrap()
    .map(|found| found.id)
}

fn kinds(history: &[crate::audit::HistoryEntry]) -> Vec<TransactionType> {
  history.iter().map(|h| h.entry.kind).collect()
}

/// Delegates to a `SqliteStore`, but refuses any commit that inserts a
/// student with `failing_external_id`.
struct FlakyStore {
  inner:               SqliteStore,
  failing_external_id: &'static str,
}

#[derive(Debug, thiserror::Error)]
enum FlakyError {
  #[error(transparent)]
  Sqlite(#[from] council_store_sqlite::Error),
  #[error("disk I/O error")]
  Disk,
}

impl StudentStore for FlakyStore {
  type Error = FlakyError;

  async fn reference_rows(&self) -> Result<Vec<ReferenceRow>, FlakyError> {
    Ok(self.inner.reference_rows().await?)
  }

  async fn current_period(&self) -> Result<Option<AcademicPeriod>, FlakyError> {
    Ok(self.inner.current_period().await?)
  }

  async fn faculty(&self, id: i64) -> Result<Option<Faculty>, FlakyError> {
    Ok(self.inner.faculty(id).await?)
  }

  async fn find_student(&self, key: StudentKey) -> Result<Option<StudentMatch>, FlakyError> {
    Ok(self.inner.find_student(key).await?)
  }

  async fn student(&self, id: StudentId) -> Result<Option<StudentBundle>, FlakyError> {
    Ok(self.inner.student(id).await?)
  }

  async fn duplicate_records(&self) -> Result<Vec<DuplicateRecord>, FlakyError> {
    Ok(self.inner.duplicate_records().await?)
  }

  async fn transactions(&self, unique_id: String) -> Result<Vec<TransactionLogEntry>, FlakyError> {
    Ok(self.inner.transactions(unique_id).await?)
  }

  async fn transaction(&self, id: i64) -> Result<Option<TransactionLogEntry>, FlakyError> {
    Ok(self.inner.transaction(id).await?)
  }

  async fn latest_transaction(
    &self,
    unique_id: String,
    kind: TransactionType,
  ) -> Result<Option<TransactionLogEntry>, FlakyError> {
    Ok(self.inner.latest_transaction(unique_id, kind).await?)
  }

  async fn commit(&self, plan: WritePlan) -> Result<CommitReceipt, FlakyError> {
    let refused = plan.ops().iter().any(|op| {
      matches!(op, WriteOp::InsertStudent(new)
        if new.external_id.as_deref() == Some(self.failing_external_id))
    });
    if refused {
      return Err(FlakyError::Disk);
    }
    Ok(self.inner.commit(plan).await?)
  }
}

// ─── Intake ──────────────────────────────────────────────────────────────────

#[tokio::test]
async fn storage_failure_is_reported_and_the_batch_goes_on() {
  let store = FlakyStore { inner: store().await, failing_external_id: "8001" };
  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let records =
    [intake("8001", "30503020112345", "F7"), intake("8002", "30503020112399", "F7")];

  let outcomes =
    Ingestor::new(&store, &reservations, &settings).submit_at(&records, now()).await.unwrap();
  let codes: Vec<_> = outcomes.iter().map(|o| o.code).collect();
  assert_eq!(codes, [60, 10], "{outcomes:?}");
  assert!(outcomes[0].message.starts_with("Unexpected error, "), "{}", outcomes[0].message);
  assert!(outcomes[0].message.ends_with("disk I/O error"));

  assert_eq!(by_external_id(&store.inner, "8001").await, None);
  assert!(by_external_id(&store.inner, "8002").await.is_some());
  let nid = StudentKey::NationalId("30503020112345".into());
  assert!(store.inner.find_student(nid).await.unwrap().is_none());
}

#[tokio::test]
async fn create_then_identical_resubmission_then_update() {
  let s = store().await;
  let record = intake("1001", "30503020112345", "F7");

  let first = submit(&s, &[record.clone()]).await;
  assert_eq!(first[0].code, 10, "{first:?}");
  assert_eq!(first[0].case_code.as_deref(), Some("51"));

  let id = by_external_id(&s, "1001").await.unwrap();
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::InitiallyAccepted);
  assert_eq!(bundle.student.unique_id.len(), 23);
  assert_eq!(bundle.enrollment.faculty_id, Some(7));
  assert_eq!(bundle.secondary.study_group_id, Some(3));

  let again = submit(&s, &[record.clone()]).await;
  assert_eq!(again[0].code, 11);
  assert_eq!(again[0].case_code.as_deref(), Some("12"));

  let mut renamed = record;
  renamed["student"]["studentNameAr"] = json!("محمود احمد علي حسن");
  let updated = submit(&s, &[renamed]).await;
  assert_eq!(updated[0].code, 10);
  assert_eq!(by_external_id(&s, "1001").await, Some(id));

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let history = Ingestor::new(&s, &reservations, &settings)
    .history(&bundle.student.unique_id)
    .await
    .unwrap();
  assert_eq!(kinds(&history), [
    TransactionType::AddedFromIntake,
    TransactionType::NameChange,
    TransactionType::AddedFromIntake
  ]);
}

#[tokio::test]
async fn problems_are_reported_per_record() {
  let s = store().await;
  let mut foreign = intake("1002", "30503020112346", "F7");
  foreign["student"]["studentNationality_id"] = json!("7");
  let mut bad_faculty = intake("1003", "30503020112347", "F7");
  bad_faculty["studentAcceptance"]["fac_id"] = json!("nowhere");
  let mut unmapped = intake("1004", "30503020112348", "F7");
  unmapped["studentEdu"]["year_id"] = json!("1999");

  let outcomes = submit(&s, &[json!("not a record"), foreign, bad_faculty, unmapped]).await;
  let codes: Vec<u16> = outcomes.iter().map(|o| o.code).collect();
  assert_eq!(codes, [21, 34, 31, 50]);
  assert!(outcomes[3].message.contains("`studentEdu.year_id` does not exist in the council"));
  assert_eq!(by_external_id(&s, "1002").await, None);
}

#[tokio::test]
async fn national_id_of_another_student_is_rejected() {
  let s = store().await;
  submit(&s, &[intake("2001", "30503020112345", "F7")]).await;
  seed(&s, "2002", StudentStatus::InitiallyAccepted, 7, 24).await;

  // Matched by external id, but the national id belongs to 2001.
  let outcomes = submit(&s, &[intake("2002", "30503020112345", "F7")]).await;
  assert_eq!(outcomes[0].code, 30);
  assert_eq!(outcomes[0].case_code.as_deref(), Some("12"));
}

#[tokio::test]
async fn duplicate_ids_in_one_batch() {
  let s = store().await;
  let record = intake("3001", "30503020112345", "F7");
  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let outcomes = Ingestor::new(&s, &reservations, &settings)
    .submit_at(&[record.clone(), record], now())
    .await
    .unwrap();

  assert_eq!(outcomes[0].code, 10);
  assert_eq!(outcomes[1].code, 61);
  assert!(reservations.is_empty());
}

#[tokio::test]
async fn empty_batch_and_missing_period() {
  let s = store().await;
  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let ingestor = Ingestor::new(&s, &reservations, &settings);
  assert!(matches!(ingestor.submit_at(&[], now()).await, Err(IngestError::EmptyBatch)));

  let bare = SqliteStore::open_in_memory().await.unwrap();
  let outcome = Ingestor::new(&bare, &reservations, &settings)
    .submit_at(&[intake("1", "30503020112345", "F7")], now())
    .await;
  assert!(matches!(outcome, Err(IngestError::NoCurrentPeriod)));
}

#[tokio::test]
async fn withdrawn_student_re_enrolls_in_the_same_faculty() {
  let s = store().await;
  let id = seed(&s, "4001", StudentStatus::Withdrawn, 7, 23).await;

  let outcomes = submit(&s, &[intake("4001", "30503020112345", "F7")]).await;
  assert_eq!(outcomes[0].code, 10);
  assert_eq!(outcomes[0].case_code.as_deref(), Some("13"));

  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::InitiallyAccepted);
  assert_eq!(bundle.enrollment.enroll_year_id, Some(24));
}

#[tokio::test]
async fn accepted_student_in_the_same_faculty_is_refused() {
  let s = store().await;
  seed(&s, "4002", StudentStatus::Accepted, 7, 24).await;
  let outcomes = submit(&s, &[intake("4002", "30503020112345", "F7")]).await;
  assert_eq!(outcomes[0].code, 23);
  assert_eq!(outcomes[0].case_code.as_deref(), Some("10"));
}

#[tokio::test]
async fn path_shift_then_cool_down() {
  let s = store().await;
  let id = seed(&s, "5001", StudentStatus::Accepted, 9, 23).await;

  let shifted = submit(&s, &[intake("5001", "30503020112345", "F7")]).await;
  assert_eq!(shifted[0].code, 14, "{shifted:?}");
  assert_eq!(shifted[0].case_code.as_deref(), Some("15"));

  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::InitiallyAccepted);
  assert_eq!(bundle.enrollment.faculty_id, Some(7));
  assert_eq!(bundle.enrollment.path_shift_date, NaiveDate::from_ymd_opt(2024, 8, 1));

  let again = submit(&s, &[intake("5001", "30503020112345", "F7")]).await;
  assert_eq!(again[0].code, 25);
}

// ─── Audit ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn reverting_a_path_shift_and_then_the_revert() {
  let s = store().await;
  let id = seed(&s, "6001", StudentStatus::Accepted, 9, 23).await;
  submit(&s, &[intake("6001", "30503020112345", "F7")]).await;

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let ingestor = Ingestor::new(&s, &reservations, &settings);

  let history = ingestor.history("U-6001").await.unwrap();
  let shift = history.iter().find(|h| h.entry.kind == TransactionType::PathShift).unwrap();
  assert!(shift.can_revert);

  let report = ingestor.revert(id, shift.entry.id, 42).await.unwrap();
  assert_eq!(report.status, StudentStatus::Accepted);
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::Accepted);
  assert_eq!(bundle.enrollment.faculty_id, Some(9));
  assert_eq!(bundle.enrollment.enroll_year_id, Some(23));
  assert_eq!(bundle.enrollment.path_shift_date, None);

  let history = ingestor.history("U-6001").await.unwrap();
  let revert = history.iter().rfind(|h| h.entry.kind == TransactionType::RevertStudentData).unwrap();
  assert!(revert.can_revert);
  assert!(history.iter().any(|h| h.entry.kind == TransactionType::ChangeToAccepted));

  ingestor.revert(id, revert.entry.id, 42).await.unwrap();
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::InitiallyAccepted);
  assert_eq!(bundle.enrollment.faculty_id, Some(7));
}

#[tokio::test]
async fn revert_refusals() {
  let s = store().await;
  let a = seed(&s, "6101", StudentStatus::Accepted, 9, 23).await;
  let b = seed(&s, "6102", StudentStatus::Accepted, 9, 23).await;
  submit(&s, &[intake("6101", "30503020112345", "F7")]).await;

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let ingestor = Ingestor::new(&s, &reservations, &settings);
  let shift = ingestor.history("U-6101").await.unwrap().remove(0);

  assert!(matches!(ingestor.revert(999, shift.entry.id, 1).await, Err(RevertError::StudentNotFound(999))));
  assert!(matches!(ingestor.revert(a, 999, 1).await, Err(RevertError::TransactionNotFound(999))));
  assert!(matches!(
    ingestor.revert(b, shift.entry.id, 1).await,
    Err(RevertError::ForeignTransaction { .. })
  ));

  let created = submit(&s, &[intake("6103", "30503020112399", "F7")]).await;
  assert_eq!(created[0].code, 10);
  let c = by_external_id(&s, "6103").await.unwrap();
  let unique_id = s.student(c).await.unwrap().unwrap().student.unique_id;
  let added = ingestor.history(&unique_id).await.unwrap().remove(0);
  assert!(!added.can_revert);
  assert!(matches!(
    ingestor.revert(c, added.entry.id, 1).await,
    Err(RevertError::NotRevertible(TransactionType::AddedFromIntake))
  ));
}

#[tokio::test]
async fn reverting_a_path_shift_restores_the_replaced_external_id_and_total() {
  let s = store().await;
  let id = seed(&s, "9001", StudentStatus::Accepted, 9, 23).await;
  let seeded_nid = "29001010120004";

  let shifted = submit(&s, &[intake("9999", seeded_nid, "F7")]).await;
  assert_eq!(shifted[0].code, 14, "{shifted:?}");
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.external_id.as_deref(), Some("9999"));
  assert_eq!(bundle.enrollment.total.as_deref(), Some("390"));

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let ingestor = Ingestor::new(&s, &reservations, &settings);
  let history = ingestor.history("U-9001").await.unwrap();
  let shift = history.iter().find(|h| h.entry.kind == TransactionType::PathShift).unwrap();

  let report = ingestor.revert(id, shift.entry.id, 42).await.unwrap();
  assert_eq!(report.restored.external_id.as_deref(), Some("9001"));
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.external_id.as_deref(), Some("9001"));
  assert_eq!(bundle.enrollment.total, None);
  assert_eq!(bundle.enrollment.faculty_id, Some(9));

  let history = ingestor.history("U-9001").await.unwrap();
  let revert = history.iter().rfind(|h| h.entry.kind == TransactionType::RevertStudentData).unwrap();
  ingestor.revert(id, revert.entry.id, 42).await.unwrap();
  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.external_id.as_deref(), Some("9999"));
  assert_eq!(bundle.enrollment.total.as_deref(), Some("390"));
  assert_eq!(bundle.enrollment.faculty_id, Some(7));
}

// ─── Withdrawal ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn withdrawal_after_a_path_shift_restores_the_previous_enrollment() {
  let s = store().await;
  let id = seed(&s, "7001", StudentStatus::Accepted, 9, 23).await;
  submit(&s, &[intake("7001", "30503020112345", "F7")]).await;

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let outcomes = Ingestor::new(&s, &reservations, &settings)
    .withdraw_at(&["7001".into()], now())
    .await
    .unwrap();
  assert_eq!(outcomes[0].code, 12);

  let bundle = s.student(id).await.unwrap().unwrap();
  assert_eq!(bundle.student.status, StudentStatus::Accepted);
  assert_eq!(bundle.enrollment.faculty_id, Some(9));
  assert_eq!(bundle.enrollment.path_shift_date, None);
}

#[tokio::test]
async fn withdrawal_without_a_path_shift_deletes_the_student() {
  let s = store().await;
  submit(&s, &[intake("7101", "30503020112345", "F7")]).await;
  seed(&s, "7102", StudentStatus::Accepted, 7, 24).await;

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let ids: Vec<String> = ["7101", "7102", "nobody", " ", "7101"].map(String::from).into();
  let outcomes =
    Ingestor::new(&s, &reservations, &settings).withdraw_at(&ids, now()).await.unwrap();
  let codes: Vec<u16> = outcomes.iter().map(|o| o.code).collect();
  assert_eq!(codes, [12, 11, 22, 31, 61]);
  assert_eq!(by_external_id(&s, "7101").await, None);
  assert!(by_external_id(&s, "7102").await.is_some());
}

// ─── Cleanup ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn repeated_records_keep_the_newest() {
  let s = store().await;
  let older = seed(&s, "8001", StudentStatus::InitiallyAccepted, 7, 24).await;
  let newer = seed(&s, "8001", StudentStatus::InitiallyAccepted, 7, 24).await;
  let kept = seed(&s, "8002", StudentStatus::InitiallyAccepted, 7, 24).await;

  let reservations = InMemoryReservations::default();
  let settings = IngestSettings::default();
  let report = Ingestor::new(&s, &reservations, &settings).remove_repeated_records().await.unwrap();

  assert_eq!(report.deleted_count, 1);
  assert_eq!(report.deleted_ids[0].id, older);
  assert!(s.student(older).await.unwrap().is_none());
  assert!(s.student(newer).await.unwrap().is_some());
  assert!(s.student(kept).await.unwrap().is_some());
}

// ─── Old council migration ───────────────────────────────────────────────────

struct StubSource {
  students: Vec<Value>,
}

impl LegacySource for StubSource {
  async fn fetch(&self, faculty_key: String) -> Result<Vec<Value>, LegacyError> {
    match faculty_key.as_str() {
      "70" => Ok(self.students.clone()),
      _ => Err(LegacyError::Connection("connection refused".into())),
    }
  }
}

fn legacy_record(old_id: &str) -> Value {
  json!({
    "student": {
      "id": old_id,
      "studentNameAr": "محمد احمد علي حسن",
      "studentNID": "30001010112345",
      "studentNationality_id": "1",
      "notes": ""
    },
    "secondaryEdu": {
      "studentTotalDegree": "390",
      "certificateYear_id": "2019",
      "studentDeptCode_id": "2",
      "studentSecondaryCert_id": "1"
    },
    "studentUniversityEdu": {
      "studentEnrollYear_id": "2024",
      "studentEnrollStage_id": "1",
      "AcceptanceStatus": "2",
      "UserID": "500",
      "RegistrationTypeID": "1",
      "AcceptDate": "2024-08-01T10:00:00",
      "ModifiedDate": "2024-08-01T10:00:00"
    }
  })
}

#[tokio::test]
async fn migration_reports_then_stores() {
  let s = store().await;
  let source = StubSource {
    students: vec![legacy_record("1234567890"), json!({ "student": { "id": "x" } })],
  };
  let settings = IngestSettings::default();
  let keys = ["70".to_owned(), "80".to_owned(), "99".to_owned()];

  let reports =
    legacy::migrate(&s, &source, &keys, MigrationMode::Report, &settings, now()).await.unwrap();
  assert_eq!(reports.len(), 3);
  let faculty = &reports[0];
  assert_eq!(faculty.results.passed, 1);
  assert_eq!(faculty.results.failed, 1);
  assert!(faculty.students[0].student.is_some());
  assert!(reports[1].error.as_deref().unwrap().starts_with("Failed to establish a new connection"));
  assert_eq!(reports[2].error.as_deref(), Some("No faculty found with id: 99"));
  let old_id = StudentKey::OldCouncilId("1234567890".into());
  assert!(s.find_student(old_id.clone()).await.unwrap().is_none());

  let reports =
    legacy::migrate(&s, &source, &keys[..1], MigrationMode::Store, &settings, now()).await.unwrap();
  assert_eq!(reports[0].students[0].status, StudentVerdict::Passed);
  let found = s.find_student(old_id.clone()).await.unwrap().unwrap();
  assert_eq!(found.status, StudentStatus::Accepted);
  assert_eq!(found.faculty_id, Some(7));
  let log = s.transactions(found.unique_id.clone()).await.unwrap();
  assert_eq!(log.len(), 1);
  assert_eq!(log[0].kind, TransactionType::DataFromOldSystem);

  // The same dump again is not newer than what was stored.
  let reports =
    legacy::migrate(&s, &source, &keys[..1], MigrationMode::Store, &settings, now()).await.unwrap();
  assert_eq!(reports[0].results.exist, 1);

  // A newer acceptance replaces the stored student.
  let mut newer = legacy_record("1234567890");
  newer["studentUniversityEdu"]["AcceptDate"] = json!("2024-08-20T10:00:00");
  let source = StubSource { students: vec![newer] };
  let reports =
    legacy::migrate(&s, &source, &keys[..1], MigrationMode::Store, &settings, now()).await.unwrap();
  assert_eq!(reports[0].results.replaced, 1);
  let replacement = s.find_student(old_id).await.unwrap().unwrap();
  assert_ne!(replacement.id, found.id);
  assert!(s.transactions(found.unique_id).await.unwrap().is_empty());
}
