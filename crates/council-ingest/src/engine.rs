//! The entrypoints: intake batches, withdrawals, repeated-record cleanup and
//! the audit operations.

use chrono::{DateTime, NaiveDate, Utc};
use council_core::{
  reference::{Faculty, KeySource},
  reservation::{BatchReservations, ReservationStore},
  store::{DuplicateRecord, StudentKey, StudentMatch, StudentStore, WriteOp, WritePlan},
  student::{SYSTEM_ACTOR, StudentId, StudentStatus},
  transaction::TransactionType,
};
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{
  audit::{self, HistoryEntry, RevertReport},
  catalog::Catalog,
  classifier::{self, Action, Situation},
  error::{IngestError, RevertError},
  mapper::{INTAKE_FIELDS, MappedRecord, map_ids},
  outcome::{Issue, OutcomeCode, RecordOutcome},
  record::{Group, IncomingRecord, RecordLayout},
  resolver::{self, Lookup},
  settings::IngestSettings,
  unique_id,
  validate::{self, ScreenContext},
  writer::{self, Relocation, Stamp},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanupReport {
  pub deleted_count: usize,
  pub deleted_ids:   Vec<DuplicateRecord>,
}

/// Runs batches against a store. Cheap to build; one per request is fine.
pub struct Ingestor<'a, S> {
  store:        &'a S,
  reservations: &'a dyn ReservationStore,
  settings:     &'a IngestSettings,
}

impl<'a, S: StudentStore> Ingestor<'a, S> {
  pub fn new(
    store: &'a S,
    reservations: &'a dyn ReservationStore,
    settings: &'a IngestSettings,
  ) -> Self {
    Self { store, reservations, settings }
  }

  // ─── Intake ────────────────────────────────────────────────────────────────

  pub async fn submit(&self, records: &[Value]) -> Result<Vec<RecordOutcome>, IngestError> {
    self.submit_at(records, Utc::now()).await
  }

  /// Process a batch in order. Every record gets exactly one outcome; only
  /// an empty batch or missing reference data fails the call.
  pub async fn submit_at(
    &self,
    records: &[Value],
    now: DateTime<Utc>,
  ) -> Result<Vec<RecordOutcome>, IngestError> {
    if records.is_empty() {
      return Err(IngestError::EmptyBatch);
    }
    let catalog = Catalog::load(self.store, KeySource::Intake).await?;
    let mut held = BatchReservations::new(self.reservations);

    let mut outcomes = Vec::with_capacity(records.len());
    for value in records {
      let outcome = self.process(value, &catalog, &mut held, now).await;
      debug!(
        external_id = outcome.external_id.as_deref().unwrap_or("-"),
        code = outcome.code,
        case = outcome.case_code.as_deref().unwrap_or("-"),
        "processed record"
      );
      outcomes.push(outcome);
    }

    let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
    info!(total = outcomes.len(), accepted, "processed intake batch");
    Ok(outcomes)
  }

  async fn process(
    &self,
    value: &Value,
    catalog: &Catalog,
    held: &mut BatchReservations<'_, dyn ReservationStore + '_>,
    now: DateTime<Utc>,
  ) -> RecordOutcome {
    let record = match IncomingRecord::parse(value, RecordLayout::INTAKE) {
      Ok(record) => record,
      Err(malformed) => {
        return RecordOutcome::new(malformed.external_id.as_deref(), OutcomeCode::InvalidFormat);
      }
    };
    let Some(external_id) = record.external_id.clone() else {
      return RecordOutcome::new(None, OutcomeCode::MissingId);
    };
    let ext = Some(external_id.as_str());

    let faculty = record
      .text(Group::Acceptance, "fac_id")
      .and_then(|token| catalog.faculty(&token).copied());
    let Some(faculty) = faculty else {
      return RecordOutcome::new(ext, OutcomeCode::UnknownFaculty);
    };

    if !held.acquire(&external_id) {
      return RecordOutcome::new(ext, OutcomeCode::InAnotherRequest);
    }

    match self.reconcile(&record, &external_id, &faculty, catalog, now).await {
      Ok(outcome) => outcome,
      Err(e) => {
        warn!(external_id, error = %e, "record failed");
        RecordOutcome::unexpected(ext, &e)
      }
    }
  }

  async fn reconcile(
    &self,
    record: &IncomingRecord,
    external_id: &str,
    faculty: &Faculty,
    catalog: &Catalog,
    now: DateTime<Utc>,
  ) -> Result<RecordOutcome, IngestError> {
    let lookup = Lookup::from_record(record, catalog);
    let resolution =
      resolver::resolve(self.store, &lookup, self.settings).await.map_err(IngestError::store)?;
    let situation = Situation::assess(
      resolution.student.as_ref(),
      faculty,
      &catalog.period,
      now.date_naive(),
      self.settings,
    );
    let decision = classifier::classify(&situation);
    let case = format!("{}{}", resolution.basis.code(), decision.branch);
    let ext = Some(external_id);
    let stamp = Stamp { actor: SYSTEM_ACTOR, at: now };

    let outcome = match (decision.action, resolution.student) {
      (Action::Reject(rejection), _) => RecordOutcome::new(ext, rejection.outcome()),
      (Action::Ignore, _) => RecordOutcome::new(ext, OutcomeCode::AlreadyExists),
      (Action::Update, Some(found)) => self.update(record, external_id, &found, catalog, stamp).await?,
      (Action::PathShift, Some(found)) => {
        self.relocate(Relocation::PathShift, record, external_id, &found, catalog, stamp).await?
      }
      (Action::Enroll, Some(found)) => {
        self.relocate(Relocation::Enroll, record, external_id, &found, catalog, stamp).await?
      }
      (Action::Create | Action::Update | Action::PathShift | Action::Enroll, None) => {
        self.create(record, external_id, catalog, stamp).await?
      }
      (Action::Create, Some(found)) => {
        // The table only creates when nothing matched.
        self.update(record, external_id, &found, catalog, stamp).await?
      }
    };
    Ok(outcome.with_case(case))
  }

  /// Validate and map a record for create or update. `own` is the matched
  /// student, whose national id does not count as taken.
  async fn check(
    &self,
    record: &IncomingRecord,
    catalog: &Catalog,
    own: Option<StudentId>,
    today: NaiveDate,
  ) -> Result<Result<MappedRecord, Vec<Issue>>, IngestError> {
    let (ids, mapping_issues) = map_ids(record, INTAKE_FIELDS, &catalog.ids);

    let national_id_taken = match record.text(Group::Person, "studentNID") {
      Some(national_id) => self
        .store
        .find_student(StudentKey::NationalId(national_id))
        .await
        .map_err(IngestError::store)?
        .is_some_and(|other| Some(other.id) != own),
      None => false,
    };

    let cx = ScreenContext {
      settings: self.settings,
      today,
      certificate_id: ids.get(Group::Secondary, "studentSecondaryCert_id"),
      national_id_taken,
    };
    let screening = validate::screen(record, &cx);

    let mut issues = screening.issues;
    issues.extend(mapping_issues);
    if !issues.is_empty() {
      return Ok(Err(issues));
    }
    Ok(Ok(MappedRecord::from_intake(record, &ids, screening.full_name)))
  }

  async fn create(
    &self,
    record: &IncomingRecord,
    external_id: &str,
    catalog: &Catalog,
    stamp: Stamp,
  ) -> Result<RecordOutcome, IngestError> {
    let mapped = match self.check(record, catalog, None, stamp.at.date_naive()).await? {
      Ok(mapped) => mapped,
      Err(issues) => return Ok(RecordOutcome::from_issues(Some(external_id), issues)),
    };

    let plan = writer::plan_create(unique_id::generate(stamp.at), external_id, mapped, stamp)?;
    self.store.commit(plan).await.map_err(IngestError::store)?;
    Ok(RecordOutcome::new(Some(external_id), OutcomeCode::Accepted))
  }

  async fn update(
    &self,
    record: &IncomingRecord,
    external_id: &str,
    found: &StudentMatch,
    catalog: &Catalog,
    stamp: Stamp,
  ) -> Result<RecordOutcome, IngestError> {
    let ext = Some(external_id);
    let mapped = match self.check(record, catalog, Some(found.id), stamp.at.date_naive()).await? {
      Ok(mapped) => mapped,
      Err(issues) => return Ok(RecordOutcome::from_issues(ext, issues)),
    };
    let Some(current) = self.store.student(found.id).await.map_err(IngestError::store)? else {
      return Ok(RecordOutcome::new(ext, OutcomeCode::NotFound));
    };

    match writer::plan_update(&current, mapped, external_id, stamp)? {
      Some(plan) => {
        self.store.commit(plan).await.map_err(IngestError::store)?;
        Ok(RecordOutcome::new(ext, OutcomeCode::Accepted))
      }
      None => Ok(RecordOutcome::new(ext, OutcomeCode::AlreadyExists)),
    }
  }

  /// Path-shift or re-enrol a matched student. Only the acceptance part of
  /// the record is checked, since nothing else is written.
  async fn relocate(
    &self,
    relocation: Relocation,
    record: &IncomingRecord,
    external_id: &str,
    found: &StudentMatch,
    catalog: &Catalog,
    stamp: Stamp,
  ) -> Result<RecordOutcome, IngestError> {
    let ext = Some(external_id);
    let acceptance_fields: Vec<_> =
      INTAKE_FIELDS.iter().filter(|f| f.group == Group::Acceptance).copied().collect();
    let (ids, mapping_issues) = map_ids(record, &acceptance_fields, &catalog.ids);
    let mut issues = validate::screen_acceptance(record);
    issues.extend(mapping_issues);
    if !issues.is_empty() {
      return Ok(RecordOutcome::from_issues(ext, issues));
    }

    let Some(current) = self.store.student(found.id).await.map_err(IngestError::store)? else {
      return Ok(RecordOutcome::new(ext, OutcomeCode::NotFound));
    };
    let target = MappedRecord::from_intake(record, &ids, current.student.person.full_name.clone());
    let plan = writer::plan_relocate(
      relocation,
      &current,
      &target,
      external_id,
      self.settings.primary_registration_type_id,
      stamp,
    )?;
    self.store.commit(plan).await.map_err(IngestError::store)?;

    Ok(RecordOutcome::new(ext, match relocation {
      Relocation::PathShift => OutcomeCode::PathShiftApplied,
      Relocation::Enroll => OutcomeCode::Accepted,
    }))
  }

  // ─── Withdrawal ────────────────────────────────────────────────────────────

  pub async fn withdraw(&self, external_ids: &[String]) -> Result<Vec<RecordOutcome>, IngestError> {
    self.withdraw_at(external_ids, Utc::now()).await
  }

  pub async fn withdraw_at(
    &self,
    external_ids: &[String],
    now: DateTime<Utc>,
  ) -> Result<Vec<RecordOutcome>, IngestError> {
    if external_ids.is_empty() {
      return Err(IngestError::EmptyBatch);
    }
    let mut held = BatchReservations::new(self.reservations);
    let stamp = Stamp { actor: SYSTEM_ACTOR, at: now };

    let mut outcomes = Vec::with_capacity(external_ids.len());
    for raw in external_ids {
      let external_id = raw.trim();
      let outcome = if external_id.is_empty() {
        RecordOutcome::new(None, OutcomeCode::MissingId)
      } else if !held.acquire(external_id) {
        RecordOutcome::new(Some(external_id), OutcomeCode::InAnotherRequest)
      } else {
        self.withdraw_one(external_id, stamp).await.unwrap_or_else(|e| {
          warn!(external_id, error = %e, "withdrawal failed");
          RecordOutcome::unexpected(Some(external_id), &e)
        })
      };
      outcomes.push(outcome);
    }

    let withdrawn = outcomes.iter().filter(|o| o.is_accepted()).count();
    info!(total = outcomes.len(), withdrawn, "processed withdrawal batch");
    Ok(outcomes)
  }

  async fn withdraw_one(&self, external_id: &str, stamp: Stamp) -> Result<RecordOutcome, IngestError> {
    let ext = Some(external_id);
    let found = self
      .store
      .find_student(StudentKey::ExternalId(external_id.to_owned()))
      .await
      .map_err(IngestError::store)?;
    let Some(found) = found else {
      return Ok(RecordOutcome::new(ext, OutcomeCode::NotFound));
    };
    if found.status != StudentStatus::InitiallyAccepted {
      return Ok(RecordOutcome::new(ext, OutcomeCode::CannotWithdraw));
    }
    let Some(current) = self.store.student(found.id).await.map_err(IngestError::store)? else {
      return Ok(RecordOutcome::new(ext, OutcomeCode::NotFound));
    };

    let latest_shift = self
      .store
      .latest_transaction(found.unique_id.clone(), TransactionType::PathShift)
      .await
      .map_err(IngestError::store)?;
    let plan = writer::plan_withdraw(&current, latest_shift.as_ref(), external_id, stamp)?;
    self.store.commit(plan).await.map_err(IngestError::store)?;
    Ok(RecordOutcome::new(ext, OutcomeCode::Withdrawn))
  }

  // ─── Maintenance ───────────────────────────────────────────────────────────

  /// Delete initially-accepted students that share an external id with a
  /// newer one, together with their log entries, until no such pair is left.
  pub async fn remove_repeated_records(&self) -> Result<CleanupReport, IngestError> {
    let mut deleted = Vec::new();
    loop {
      let duplicates = self.store.duplicate_records().await.map_err(IngestError::store)?;
      if duplicates.is_empty() {
        break;
      }
      let mut plan = WritePlan::new();
      for duplicate in &duplicates {
        plan
          .push(WriteOp::DeleteStudent(duplicate.id))
          .push(WriteOp::PurgeTransactions { unique_id: duplicate.unique_id.clone() });
      }
      self.store.commit(plan).await.map_err(IngestError::store)?;
      deleted.extend(duplicates);
    }

    info!(deleted = deleted.len(), "removed repeated records");
    Ok(CleanupReport { deleted_count: deleted.len(), deleted_ids: deleted })
  }

  // ─── Audit ─────────────────────────────────────────────────────────────────

  pub async fn history(&self, unique_id: &str) -> Result<Vec<HistoryEntry>, IngestError> {
    audit::history(self.store, unique_id).await
  }

  pub async fn revert(
    &self,
    student_id: StudentId,
    transaction_id: i64,
    actor: i64,
  ) -> Result<RevertReport, RevertError> {
    audit::revert(self.store, student_id, transaction_id, actor, Utc::now()).await
  }
}
