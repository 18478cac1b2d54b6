//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 strings, calendar dates as
//! `YYYY-MM-DD`. Statuses and transaction types are stored as their numeric
//! codes, reference dimensions as snake_case names.

use chrono::{DateTime, NaiveDate, Utc};
use council_core::{
  reference::{Dimension, ReferenceRow},
  store::StudentMatch,
  student::{
    AcceptedApplication, PersonDetails, StudentRecord, StudentStatus, UniversityEnrollment,
  },
  transaction::{Payload, TransactionLogEntry, TransactionType},
};

use crate::{Error, Result};

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::Decode(e.to_string()))
}

// ─── NaiveDate ───────────────────────────────────────────────────────────────

pub fn encode_date(date: Option<NaiveDate>) -> Option<String> {
  date.map(|d| d.format("%Y-%m-%d").to_string())
}

pub fn decode_date(s: Option<&str>) -> Result<Option<NaiveDate>> {
  s.map(|s| {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::Decode(e.to_string()))
  })
  .transpose()
}

// ─── Dimension ───────────────────────────────────────────────────────────────

pub fn decode_dimension(s: &str) -> Result<Dimension> {
  s.parse()
    .map_err(|_| Error::Core(council_core::Error::UnknownDimension(s.to_owned())))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read from a `students` row.
pub struct RawStudent {
  pub id:               i64,
  pub unique_id:        String,
  pub external_id:      Option<String>,
  pub old_council_id:   Option<String>,
  pub status:           i64,
  pub full_name:        String,
  pub national_id:      Option<String>,
  pub passport:         Option<String>,
  pub birth_date:       Option<String>,
  pub gender_id:        Option<i64>,
  pub nationality_id:   Option<i64>,
  pub religion_id:      Option<i64>,
  pub birth_place_id:   Option<i64>,
  pub address_place_id: Option<i64>,
  pub phone:            Option<String>,
  pub email:            Option<String>,
  pub address:          Option<String>,
  pub notes:            Option<String>,
  pub created_at:       String,
  pub created_by:       i64,
  pub updated_at:       Option<String>,
  pub updated_by:       Option<i64>,
}

impl RawStudent {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:               row.get("id")?,
      unique_id:        row.get("unique_id")?,
      external_id:      row.get("external_id")?,
      old_council_id:   row.get("old_council_id")?,
      status:           row.get("status")?,
      full_name:        row.get("full_name")?,
      national_id:      row.get("national_id")?,
      passport:         row.get("passport")?,
      birth_date:       row.get("birth_date")?,
      gender_id:        row.get("gender_id")?,
      nationality_id:   row.get("nationality_id")?,
      religion_id:      row.get("religion_id")?,
      birth_place_id:   row.get("birth_place_id")?,
      address_place_id: row.get("address_place_id")?,
      phone:            row.get("phone")?,
      email:            row.get("email")?,
      address:          row.get("address")?,
      notes:            row.get("notes")?,
      created_at:       row.get("created_at")?,
      created_by:       row.get("created_by")?,
      updated_at:       row.get("updated_at")?,
      updated_by:       row.get("updated_by")?,
    })
  }

  pub fn into_record(self) -> Result<StudentRecord> {
    Ok(StudentRecord {
      id:             self.id,
      unique_id:      self.unique_id,
      external_id:    self.external_id,
      old_council_id: self.old_council_id,
      status:         StudentStatus::from_code(self.status)?,
      person:         PersonDetails {
        full_name:        self.full_name,
        national_id:      self.national_id,
        passport:         self.passport,
        birth_date:       decode_date(self.birth_date.as_deref())?,
        gender_id:        self.gender_id,
        nationality_id:   self.nationality_id,
        religion_id:      self.religion_id,
        birth_place_id:   self.birth_place_id,
        address_place_id: self.address_place_id,
        phone:            self.phone,
        email:            self.email,
        address:          self.address,
        notes:            self.notes,
      },
      created_at:     decode_dt(&self.created_at)?,
      created_by:     self.created_by,
      updated_at:     self.updated_at.as_deref().map(decode_dt).transpose()?,
      updated_by:     self.updated_by,
    })
  }
}

/// Raw values read from a `university_enrollment` row.
pub struct RawEnrollment {
  pub faculty_id:             Option<i64>,
  pub university_id:          Option<i64>,
  pub enroll_year_id:         Option<i64>,
  pub enroll_semester_id:     Option<i64>,
  pub enroll_stage_id:        Option<i64>,
  pub registration_type_id:   Option<i64>,
  pub total:                  Option<String>,
  pub level_id:               Option<i64>,
  pub total_equivalent_hours: Option<String>,
  pub transfer_date:          Option<String>,
  pub path_shift_date:        Option<String>,
}

impl RawEnrollment {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      faculty_id:             row.get("faculty_id")?,
      university_id:          row.get("university_id")?,
      enroll_year_id:         row.get("enroll_year_id")?,
      enroll_semester_id:     row.get("enroll_semester_id")?,
      enroll_stage_id:        row.get("enroll_stage_id")?,
      registration_type_id:   row.get("registration_type_id")?,
      total:                  row.get("total")?,
      level_id:               row.get("level_id")?,
      total_equivalent_hours: row.get("total_equivalent_hours")?,
      transfer_date:          row.get("transfer_date")?,
      path_shift_date:        row.get("path_shift_date")?,
    })
  }

  pub fn into_enrollment(self) -> Result<UniversityEnrollment> {
    Ok(UniversityEnrollment {
      faculty_id:             self.faculty_id,
      university_id:          self.university_id,
      enroll_year_id:         self.enroll_year_id,
      enroll_semester_id:     self.enroll_semester_id,
      enroll_stage_id:        self.enroll_stage_id,
      registration_type_id:   self.registration_type_id,
      total:                  self.total,
      level_id:               self.level_id,
      total_equivalent_hours: self.total_equivalent_hours,
      transfer_date:          decode_date(self.transfer_date.as_deref())?,
      path_shift_date:        decode_date(self.path_shift_date.as_deref())?,
    })
  }
}

/// Raw values read from an `accepted_applications` row.
pub struct RawApplication {
  pub faculty_id:           Option<i64>,
  pub university_id:        Option<i64>,
  pub year_id:              Option<i64>,
  pub semester_id:          Option<i64>,
  pub stage_id:             Option<i64>,
  pub registration_type_id: Option<i64>,
  pub total:                Option<String>,
  pub manual_addition:      bool,
  pub decided_by:           Option<String>,
  pub decided_at:           Option<String>,
}

impl RawApplication {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      faculty_id:           row.get("faculty_id")?,
      university_id:        row.get("university_id")?,
      year_id:              row.get("year_id")?,
      semester_id:          row.get("semester_id")?,
      stage_id:             row.get("stage_id")?,
      registration_type_id: row.get("registration_type_id")?,
      total:                row.get("total")?,
      manual_addition:      row.get("manual_addition")?,
      decided_by:           row.get("decided_by")?,
      decided_at:           row.get("decided_at")?,
    })
  }

  pub fn into_application(self) -> Result<AcceptedApplication> {
    Ok(AcceptedApplication {
      faculty_id:           self.faculty_id,
      university_id:        self.university_id,
      year_id:              self.year_id,
      semester_id:          self.semester_id,
      stage_id:             self.stage_id,
      registration_type_id: self.registration_type_id,
      total:                self.total,
      manual_addition:      self.manual_addition,
      decided_by:           self.decided_by,
      decided_at:           decode_date(self.decided_at.as_deref())?,
    })
  }
}

/// A student row joined with its enrollment period codes and faculty family.
pub struct RawMatch {
  pub id:                   i64,
  pub unique_id:            String,
  pub external_id:          Option<String>,
  pub national_id:          Option<String>,
  pub status:               i64,
  pub faculty_id:           Option<i64>,
  pub faculty_family_id:    Option<i64>,
  pub enroll_year_code:     Option<String>,
  pub enroll_semester_code: Option<String>,
  pub path_shift_date:      Option<String>,
  pub created_at:           String,
}

impl RawMatch {
  pub fn into_match(self) -> Result<StudentMatch> {
    Ok(StudentMatch {
      id:                   self.id,
      unique_id:            self.unique_id,
      external_id:          self.external_id,
      national_id:          self.national_id,
      status:               StudentStatus::from_code(self.status)?,
      faculty_id:           self.faculty_id,
      faculty_family_id:    self.faculty_family_id,
      enroll_year_code:     self.enroll_year_code,
      enroll_semester_code: self.enroll_semester_code,
      path_shift_date:      decode_date(self.path_shift_date.as_deref())?,
      created_at:           decode_dt(&self.created_at)?,
    })
  }
}

/// Raw values read from a `transactions` row.
pub struct RawTransaction {
  pub id:            i64,
  pub unique_id:     String,
  pub kind:          i64,
  pub original_data: Option<String>,
  pub updated_data:  Option<String>,
  pub created_at:    String,
  pub created_by:    i64,
}

impl RawTransaction {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:            row.get("id")?,
      unique_id:     row.get("unique_id")?,
      kind:          row.get("kind")?,
      original_data: row.get("original_data")?,
      updated_data:  row.get("updated_data")?,
      created_at:    row.get("created_at")?,
      created_by:    row.get("created_by")?,
    })
  }

  pub fn into_entry(self) -> Result<TransactionLogEntry> {
    Ok(TransactionLogEntry {
      id:         self.id,
      unique_id:  self.unique_id,
      kind:       TransactionType::from_code(self.kind)?,
      original:   Payload::from_column(self.original_data.as_deref())?,
      updated:    Payload::from_column(self.updated_data.as_deref())?,
      created_at: decode_dt(&self.created_at)?,
      created_by: self.created_by,
    })
  }
}

/// Raw values read from a `reference_rows` row.
pub struct RawReference {
  pub dimension:       String,
  pub id:              i64,
  pub name:            String,
  pub intake_key:      Option<String>,
  pub old_council_key: Option<String>,
  pub code:            Option<String>,
  pub is_current:      bool,
  pub university_id:   Option<i64>,
  pub family_id:       Option<i64>,
}

impl RawReference {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      dimension:       row.get("dimension")?,
      id:              row.get("id")?,
      name:            row.get("name")?,
      intake_key:      row.get("intake_key")?,
      old_council_key: row.get("old_council_key")?,
      code:            row.get("code")?,
      is_current:      row.get("is_current")?,
      university_id:   row.get("university_id")?,
      family_id:       row.get("family_id")?,
    })
  }

  pub fn into_row(self) -> Result<ReferenceRow> {
    Ok(ReferenceRow {
      dimension:       decode_dimension(&self.dimension)?,
      id:              self.id,
      name:            self.name,
      intake_key:      self.intake_key,
      old_council_key: self.old_council_key,
      code:            self.code,
      is_current:      self.is_current,
      university_id:   self.university_id,
      family_id:       self.family_id,
    })
  }
}
