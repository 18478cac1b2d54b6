//! [`SqliteStore`], the SQLite implementation of [`StudentStore`].

use std::path::Path;

use council_core::{
  reference::{AcademicPeriod, Dimension, Faculty, ReferenceRow},
  store::{
    CommitReceipt, DuplicateRecord, StudentChanges, StudentKey, StudentMatch, StudentStore,
    WriteOp, WritePlan,
  },
  student::{
    AcceptedApplication, NewStudent, SecondaryEducation, StudentBundle,
    StudentId, StudentStatus, UniversityEnrollment,
  },
  transaction::{NewTransaction, TransactionLogEntry, TransactionType},
};
use rusqlite::{OptionalExtension as _, Transaction, params, types::Value as SqlValue};
use tracing::debug;

use crate::{
  Error, Result,
  encode::{
    RawApplication, RawEnrollment, RawMatch, RawReference, RawStudent, RawTransaction,
    encode_date, encode_dt,
  },
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A student store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Insert or overwrite lookup rows. Returns how many rows were written.
  pub async fn seed_reference_rows(&self, rows: Vec<ReferenceRow>) -> Result<usize> {
    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        {
          let mut stmt = tx.prepare(
            "INSERT INTO reference_rows (
               dimension, id, name, intake_key, old_council_key,
               code, is_current, university_id, family_id
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT (dimension, id) DO UPDATE SET
               name            = excluded.name,
               intake_key      = excluded.intake_key,
               old_council_key = excluded.old_council_key,
               code            = excluded.code,
               is_current      = excluded.is_current,
               university_id   = excluded.university_id,
               family_id       = excluded.family_id",
          )?;
          for row in &rows {
            stmt.execute(params![
              row.dimension.as_ref(),
              row.id,
              row.name,
              row.intake_key,
              row.old_council_key,
              row.code,
              row.is_current,
              row.university_id,
              row.family_id,
            ])?;
          }
        }
        tx.commit()?;
        Ok(rows.len())
      })
      .await?;
    debug!(written, "seeded reference rows");
    Ok(written)
  }
}

// ─── Plan execution ──────────────────────────────────────────────────────────

/// Why a plan stopped before committing.
enum PlanFailure {
  Sql(rusqlite::Error),
  MissingStudent(StudentId),
  Core(council_core::Error),
}

impl From<rusqlite::Error> for PlanFailure {
  fn from(e: rusqlite::Error) -> Self { Self::Sql(e) }
}

impl From<council_core::Error> for PlanFailure {
  fn from(e: council_core::Error) -> Self { Self::Core(e) }
}

type PlanResult<T> = std::result::Result<T, PlanFailure>;

fn apply_plan(tx: &Transaction<'_>, ops: &[WriteOp]) -> PlanResult<CommitReceipt> {
  let mut receipt = CommitReceipt::default();
  for op in ops {
    match op {
      WriteOp::InsertStudent(student) => {
        receipt.inserted.push(insert_student(tx, student)?);
      }
      WriteOp::DeleteStudent(id) => {
        let deleted = tx.execute("DELETE FROM students WHERE id = ?1", params![id])?;
        if deleted == 0 {
          return Err(PlanFailure::MissingStudent(*id));
        }
      }
      WriteOp::UpdateStudent { id, changes } => update_student(tx, *id, changes)?,
      WriteOp::ReplaceSecondary { id, secondary } => {
        ensure_student(tx, *id)?;
        tx.execute("DELETE FROM secondary_education WHERE student_id = ?1", params![id])?;
        insert_secondary(tx, *id, secondary)?;
      }
      WriteOp::ReplaceEnrollment { id, enrollment } => {
        ensure_student(tx, *id)?;
        tx.execute("DELETE FROM university_enrollment WHERE student_id = ?1", params![id])?;
        insert_enrollment(tx, *id, enrollment)?;
      }
      WriteOp::ReplaceApplication { id, application } => {
        ensure_student(tx, *id)?;
        tx.execute("DELETE FROM accepted_applications WHERE student_id = ?1", params![id])?;
        if let Some(application) = application {
          insert_application(tx, *id, application)?;
        }
      }
      WriteOp::PurgeTransactions { unique_id } => {
        tx.execute("DELETE FROM transactions WHERE unique_id = ?1", params![unique_id])?;
      }
      WriteOp::AppendTransaction(entry) => insert_transaction(tx, entry)?,
    }
  }
  Ok(receipt)
}

fn ensure_student(tx: &Transaction<'_>, id: StudentId) -> PlanResult<()> {
  let exists = tx
    .query_row("SELECT 1 FROM students WHERE id = ?1", params![id], |_| Ok(()))
    .optional()?
    .is_some();
  if exists { Ok(()) } else { Err(PlanFailure::MissingStudent(id)) }
}

fn insert_student(tx: &Transaction<'_>, student: &NewStudent) -> PlanResult<StudentId> {
  let p = &student.person;
  tx.execute(
    "INSERT INTO students (
       unique_id, external_id, old_council_id, status, full_name,
       national_id, passport, birth_date, gender_id, nationality_id,
       religion_id, birth_place_id, address_place_id, phone, email,
       address, notes, created_at, created_by
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19)",
    params![
      student.unique_id,
      student.external_id,
      student.old_council_id,
      student.status.code(),
      p.full_name,
      p.national_id,
      p.passport,
      encode_date(p.birth_date),
      p.gender_id,
      p.nationality_id,
      p.religion_id,
      p.birth_place_id,
      p.address_place_id,
      p.phone,
      p.email,
      p.address,
      p.notes,
      encode_dt(student.created_at),
      student.created_by,
    ],
  )?;
  let id = tx.last_insert_rowid();
  insert_secondary(tx, id, &student.secondary)?;
  insert_enrollment(tx, id, &student.enrollment)?;
  if let Some(application) = &student.application {
    insert_application(tx, id, application)?;
  }
  Ok(id)
}

fn update_student(tx: &Transaction<'_>, id: StudentId, changes: &StudentChanges) -> PlanResult<()> {
  let touched = tx.execute(
    "UPDATE students SET updated_at = ?2, updated_by = ?3 WHERE id = ?1",
    params![id, encode_dt(changes.updated_at), changes.updated_by],
  )?;
  if touched == 0 {
    return Err(PlanFailure::MissingStudent(id));
  }
  if let Some(status) = changes.status {
    tx.execute("UPDATE students SET status = ?2 WHERE id = ?1", params![id, status.code()])?;
  }
  if let Some(external_id) = &changes.external_id {
    tx.execute(
      "UPDATE students SET external_id = ?2 WHERE id = ?1",
      params![id, external_id],
    )?;
  }
  if let Some(p) = &changes.person {
    tx.execute(
      "UPDATE students SET
         full_name = ?2, national_id = ?3, passport = ?4, birth_date = ?5,
         gender_id = ?6, nationality_id = ?7, religion_id = ?8,
         birth_place_id = ?9, address_place_id = ?10, phone = ?11,
         email = ?12, address = ?13, notes = ?14
       WHERE id = ?1",
      params![
        id,
        p.full_name,
        p.national_id,
        p.passport,
        encode_date(p.birth_date),
        p.gender_id,
        p.nationality_id,
        p.religion_id,
        p.birth_place_id,
        p.address_place_id,
        p.phone,
        p.email,
        p.address,
        p.notes,
      ],
    )?;
  }
  Ok(())
}

fn insert_secondary(
  tx: &Transaction<'_>,
  id: StudentId,
  s: &SecondaryEducation,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO secondary_education (
       student_id, certificate_id, certificate_year_id, seat_number, total,
       equivalent_total, sport_degree, complaint_gain, school, department,
       department_code_id, governorate_id, school_type_id, study_group_id
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
    params![
      id,
      s.certificate_id,
      s.certificate_year_id,
      s.seat_number,
      s.total,
      s.equivalent_total,
      s.sport_degree,
      s.complaint_gain,
      s.school,
      s.department,
      s.department_code_id,
      s.governorate_id,
      s.school_type_id,
      s.study_group_id,
    ],
  )?;
  Ok(())
}

fn insert_enrollment(
  tx: &Transaction<'_>,
  id: StudentId,
  e: &UniversityEnrollment,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO university_enrollment (
       student_id, faculty_id, university_id, enroll_year_id, enroll_semester_id,
       enroll_stage_id, registration_type_id, total, level_id,
       total_equivalent_hours, transfer_date, path_shift_date
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
    params![
      id,
      e.faculty_id,
      e.university_id,
      e.enroll_year_id,
      e.enroll_semester_id,
      e.enroll_stage_id,
      e.registration_type_id,
      e.total,
      e.level_id,
      e.total_equivalent_hours,
      encode_date(e.transfer_date),
      encode_date(e.path_shift_date),
    ],
  )?;
  Ok(())
}

fn insert_application(
  tx: &Transaction<'_>,
  id: StudentId,
  a: &AcceptedApplication,
) -> rusqlite::Result<()> {
  tx.execute(
    "INSERT INTO accepted_applications (
       student_id, faculty_id, university_id, year_id, semester_id, stage_id,
       registration_type_id, total, manual_addition, decided_by, decided_at
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
    params![
      id,
      a.faculty_id,
      a.university_id,
      a.year_id,
      a.semester_id,
      a.stage_id,
      a.registration_type_id,
      a.total,
      a.manual_addition,
      a.decided_by,
      encode_date(a.decided_at),
    ],
  )?;
  Ok(())
}

fn insert_transaction(tx: &Transaction<'_>, entry: &NewTransaction) -> PlanResult<()> {
  tx.execute(
    "INSERT INTO transactions (
       unique_id, kind, original_data, updated_data, created_at, created_by
     ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
    params![
      entry.unique_id,
      entry.kind.code(),
      entry.original.to_column()?,
      entry.updated.to_column()?,
      encode_dt(entry.created_at),
      entry.created_by,
    ],
  )?;
  Ok(())
}

// ─── Queries ─────────────────────────────────────────────────────────────────

const MATCH_SELECT: &str = "
  SELECT s.id, s.unique_id, s.external_id, s.national_id, s.status,
         e.faculty_id, f.family_id, y.code, sem.code, e.path_shift_date,
         s.created_at
  FROM students s
  LEFT JOIN university_enrollment e ON e.student_id = s.id
  LEFT JOIN reference_rows f   ON f.dimension = 'faculty'  AND f.id   = e.faculty_id
  LEFT JOIN reference_rows y   ON y.dimension = 'year'     AND y.id   = e.enroll_year_id
  LEFT JOIN reference_rows sem ON sem.dimension = 'semester' AND sem.id = e.enroll_semester_id";

fn match_filter(key: StudentKey) -> (&'static str, Vec<SqlValue>) {
  match key {
    StudentKey::ExternalId(v) => ("s.external_id = ?1", vec![SqlValue::Text(v)]),
    StudentKey::NationalId(v) => ("s.national_id = ?1", vec![SqlValue::Text(v)]),
    StudentKey::Passport(v) => ("s.passport = ?1", vec![SqlValue::Text(v)]),
    StudentKey::OldCouncilId(v) => ("s.old_council_id = ?1", vec![SqlValue::Text(v)]),
    StudentKey::SeatNumber { seat_number, certificate_year_id } => (
      "s.id IN (SELECT student_id FROM secondary_education
                WHERE seat_number = ?1 AND certificate_year_id = ?2)",
      vec![SqlValue::Text(seat_number), SqlValue::Integer(certificate_year_id)],
    ),
  }
}

const TRANSACTION_COLUMNS: &str =
  "id, unique_id, kind, original_data, updated_data, created_at, created_by";

// ─── StudentStore impl ───────────────────────────────────────────────────────

impl StudentStore for SqliteStore {
  type Error = Error;

  // ── Reference data ────────────────────────────────────────────────────────

  async fn reference_rows(&self) -> Result<Vec<ReferenceRow>> {
    let raws: Vec<RawReference> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT dimension, id, name, intake_key, old_council_key, code,
                  is_current, university_id, family_id
           FROM reference_rows ORDER BY dimension, id",
        )?;
        let rows = stmt
          .query_map([], RawReference::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawReference::into_row).collect()
  }

  async fn current_period(&self) -> Result<Option<AcademicPeriod>> {
    let (year, semester): (Option<String>, Option<String>) = self
      .conn
      .call(|conn| {
        Ok(conn.query_row(
          "SELECT
             (SELECT code FROM reference_rows
              WHERE dimension = 'year' AND is_current = 1 ORDER BY id DESC LIMIT 1),
             (SELECT code FROM reference_rows
              WHERE dimension = 'semester' AND is_current = 1 ORDER BY id DESC LIMIT 1)",
          [],
          |row| Ok((row.get(0)?, row.get(1)?)),
        )?)
      })
      .await?;

    Ok(match (year, semester) {
      (Some(year_code), Some(semester_code)) => {
        Some(AcademicPeriod { year_code, semester_code })
      }
      _ => None,
    })
  }

  async fn faculty(&self, id: i64) -> Result<Option<Faculty>> {
    let dimension = Dimension::Faculty.as_ref().to_owned();
    let faculty = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT id, university_id, family_id FROM reference_rows
             WHERE dimension = ?1 AND id = ?2",
            params![dimension, id],
            |row| {
              Ok(Faculty {
                id:            row.get(0)?,
                university_id: row.get(1)?,
                family_id:     row.get(2)?,
              })
            },
          )
          .optional()?)
      })
      .await?;
    Ok(faculty)
  }

  // ── Students ──────────────────────────────────────────────────────────────

  async fn find_student(&self, key: StudentKey) -> Result<Option<StudentMatch>> {
    let (filter, values) = match_filter(key);
    let sql = format!("{MATCH_SELECT} WHERE {filter} ORDER BY s.id DESC LIMIT 1");

    let raw: Option<RawMatch> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(&sql, rusqlite::params_from_iter(values), |row| {
            Ok(RawMatch {
              id:                   row.get(0)?,
              unique_id:            row.get(1)?,
              external_id:          row.get(2)?,
              national_id:          row.get(3)?,
              status:               row.get(4)?,
              faculty_id:           row.get(5)?,
              faculty_family_id:    row.get(6)?,
              enroll_year_code:     row.get(7)?,
              enroll_semester_code: row.get(8)?,
              path_shift_date:      row.get(9)?,
              created_at:           row.get(10)?,
            })
          })
          .optional()?)
      })
      .await?;

    raw.map(RawMatch::into_match).transpose()
  }

  async fn student(&self, id: StudentId) -> Result<Option<StudentBundle>> {
    type Raw = (RawStudent, SecondaryEducation, RawEnrollment, Option<RawApplication>);

    let raw: Option<Raw> = self
      .conn
      .call(move |conn| {
        let Some(student) = conn
          .query_row("SELECT * FROM students WHERE id = ?1", params![id], |row| {
            RawStudent::from_row(row)
          })
          .optional()?
        else {
          return Ok(None);
        };

        let secondary = conn
          .query_row(
            "SELECT * FROM secondary_education WHERE student_id = ?1",
            params![id],
            |row| {
              Ok(SecondaryEducation {
                certificate_id:      row.get("certificate_id")?,
                certificate_year_id: row.get("certificate_year_id")?,
                seat_number:         row.get("seat_number")?,
                total:               row.get("total")?,
                equivalent_total:    row.get("equivalent_total")?,
                sport_degree:        row.get("sport_degree")?,
                complaint_gain:      row.get("complaint_gain")?,
                school:              row.get("school")?,
                department:          row.get("department")?,
                department_code_id:  row.get("department_code_id")?,
                governorate_id:      row.get("governorate_id")?,
                school_type_id:      row.get("school_type_id")?,
                study_group_id:      row.get("study_group_id")?,
              })
            },
          )
          .optional()?
          .unwrap_or_default();

        let enrollment = conn
          .query_row(
            "SELECT * FROM university_enrollment WHERE student_id = ?1",
            params![id],
            RawEnrollment::from_row,
          )
          .optional()?;

        let application = conn
          .query_row(
            "SELECT * FROM accepted_applications WHERE student_id = ?1",
            params![id],
            RawApplication::from_row,
          )
          .optional()?;

        let enrollment = enrollment.unwrap_or(RawEnrollment {
          faculty_id:             None,
          university_id:          None,
          enroll_year_id:         None,
          enroll_semester_id:     None,
          enroll_stage_id:        None,
          registration_type_id:   None,
          total:                  None,
          level_id:               None,
          total_equivalent_hours: None,
          transfer_date:          None,
          path_shift_date:        None,
        });

        Ok(Some((student, secondary, enrollment, application)))
      })
      .await?;

    let Some((student, secondary, enrollment, application)) = raw else {
      return Ok(None);
    };

    Ok(Some(StudentBundle {
      student: student.into_record()?,
      secondary,
      enrollment: enrollment.into_enrollment()?,
      application: application.map(RawApplication::into_application).transpose()?,
    }))
  }

  async fn duplicate_records(&self) -> Result<Vec<DuplicateRecord>> {
    let initially_accepted = StudentStatus::InitiallyAccepted.code();
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT s.id, s.external_id, s.unique_id
           FROM students s
           JOIN (
             SELECT MIN(id) AS oldest
             FROM students
             WHERE status = ?1 AND external_id IS NOT NULL
             GROUP BY external_id
             HAVING COUNT(*) > 1
           ) d ON d.oldest = s.id
           ORDER BY s.id",
        )?;
        let rows = stmt
          .query_map(params![initially_accepted], |row| {
            Ok(DuplicateRecord {
              id:          row.get(0)?,
              external_id: row.get(1)?,
              unique_id:   row.get(2)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }

  // ── Transaction log ───────────────────────────────────────────────────────

  async fn transactions(&self, unique_id: String) -> Result<Vec<TransactionLogEntry>> {
    let raws: Vec<RawTransaction> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TRANSACTION_COLUMNS} FROM transactions
           WHERE unique_id = ?1 ORDER BY created_at, id"
        ))?;
        let rows = stmt
          .query_map(params![unique_id], RawTransaction::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawTransaction::into_entry).collect()
  }

  async fn transaction(&self, id: i64) -> Result<Option<TransactionLogEntry>> {
    let raw: Option<RawTransaction> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {TRANSACTION_COLUMNS} FROM transactions WHERE id = ?1"),
            params![id],
            RawTransaction::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawTransaction::into_entry).transpose()
  }

  async fn latest_transaction(
    &self,
    unique_id: String,
    kind: TransactionType,
  ) -> Result<Option<TransactionLogEntry>> {
    let kind = kind.code();
    let raw: Option<RawTransaction> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!(
              "SELECT {TRANSACTION_COLUMNS} FROM transactions
               WHERE unique_id = ?1 AND kind = ?2
               ORDER BY created_at DESC, id DESC LIMIT 1"
            ),
            params![unique_id, kind],
            RawTransaction::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawTransaction::into_entry).transpose()
  }

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn commit(&self, plan: WritePlan) -> Result<CommitReceipt> {
    let ops = plan.into_ops();
    let op_count = ops.len();

    // Failures other than SQL errors come back as the inner `Err`; the
    // transaction is dropped uncommitted in every failure path.
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match apply_plan(&tx, &ops) {
          Ok(receipt) => {
            tx.commit()?;
            Ok(Ok(receipt))
          }
          Err(PlanFailure::Sql(e)) => Err(e.into()),
          Err(PlanFailure::MissingStudent(id)) => Ok(Err(Error::StudentNotFound(id))),
          Err(PlanFailure::Core(e)) => Ok(Err(Error::Core(e))),
        }
      })
      .await?;

    if outcome.is_ok() {
      debug!(ops = op_count, "committed write plan");
    }
    outcome
  }
}

