//! The append-only transaction log.
//!
//! Every state change of a student is recorded as a [`TransactionLogEntry`]
//! keyed by the student's unique id. Payloads are either bare scalars (a name,
//! an external id) or a structured [`EnrollmentSnapshot`] document.
//!
//! The log format has changed over the years: the same logical field appears
//! under different keys in older entries (`studentFaculty_id` vs
//! `Faculty_id`). [`Slot::keys`] enumerates every accepted spelling; readers
//! go through it instead of probing for keys ad hoc.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use strum::{AsRefStr, Display, EnumIter};

use crate::{
  Error, Result,
  student::{StudentStatus, UniversityEnrollment},
};

// ─── Transaction type ────────────────────────────────────────────────────────

/// Closed set of log entry types. Discriminants are the persisted codes.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  AsRefStr,
  EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TransactionType {
  AddedFromIntake                = 2,
  WithdrawByIntake               = 3,
  NameChange                     = 4,
  NationalIdChange               = 5,
  SecondaryTotalChange           = 6,
  SecondaryEquivalentTotalChange = 7,
  CertificateChange              = 8,
  CertificateYearChange          = 9,
  ChangeToInitiallyAccepted      = 19,
  ChangeToAccepted               = 20,
  ChangeToFulfillment            = 21,
  ChangeToWithdrawn              = 22,
  ChangeToRejected               = 23,
  ChangeToGraduationApplicant    = 24,
  ChangeToGraduate               = 25,
  TransferFaculty                = 26,
  PathShift                      = 27,
  ManuallyAdded                  = 28,
  WithdrawByOldCouncil           = 29,
  DataFromOldSystem              = 30,
  RevertStudentData              = 31,
}

/// Slots every revertible entry must be able to fill.
const ENROLLMENT_SLOTS: &[Slot] = &[
  Slot::University,
  Slot::Faculty,
  Slot::EnrollYear,
  Slot::EnrollSemester,
  Slot::EnrollStage,
  Slot::RegistrationType,
];

impl TransactionType {
  pub fn code(self) -> i64 { self as i64 }

  pub fn from_code(code: i64) -> Result<Self> {
    use TransactionType::*;
    Ok(match code {
      2 => AddedFromIntake,
      3 => WithdrawByIntake,
      4 => NameChange,
      5 => NationalIdChange,
      6 => SecondaryTotalChange,
      7 => SecondaryEquivalentTotalChange,
      8 => CertificateChange,
      9 => CertificateYearChange,
      19 => ChangeToInitiallyAccepted,
      20 => ChangeToAccepted,
      21 => ChangeToFulfillment,
      22 => ChangeToWithdrawn,
      23 => ChangeToRejected,
      24 => ChangeToGraduationApplicant,
      25 => ChangeToGraduate,
      26 => TransferFaculty,
      27 => PathShift,
      28 => ManuallyAdded,
      29 => WithdrawByOldCouncil,
      30 => DataFromOldSystem,
      31 => RevertStudentData,
      other => return Err(Error::UnknownTransactionType(other)),
    })
  }

  /// The entry type logged when a student moves into `status`.
  pub fn status_change(status: StudentStatus) -> Option<Self> {
    use StudentStatus::*;
    match status {
      InitiallyAccepted => Some(Self::ChangeToInitiallyAccepted),
      Accepted => Some(Self::ChangeToAccepted),
      Fulfillment => Some(Self::ChangeToFulfillment),
      Withdrawn => Some(Self::ChangeToWithdrawn),
      Rejected => Some(Self::ChangeToRejected),
      GraduationApplicant => Some(Self::ChangeToGraduationApplicant),
      Graduate => Some(Self::ChangeToGraduate),
      Transferred => None,
    }
  }

  /// Slots the original payload must fill for this type to be revertible.
  /// `None` means the type can never be reverted.
  pub fn revert_slots(self) -> Option<&'static [Slot]> {
    match self {
      Self::TransferFaculty
      | Self::PathShift
      | Self::WithdrawByOldCouncil
      | Self::DataFromOldSystem
      | Self::RevertStudentData => Some(ENROLLMENT_SLOTS),
      _ => None,
    }
  }
}

// ─── Slots and legacy key spellings ──────────────────────────────────────────

/// A logical field of an enrollment snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum Slot {
  ExternalId,
  Status,
  Total,
  Faculty,
  University,
  EnrollYear,
  EnrollSemester,
  EnrollStage,
  RegistrationType,
  PathShiftDate,
  TransferDate,
  Level,
  TotalEquivalentHours,
}

impl Slot {
  /// Every key this slot has been written under. The first one is the
  /// spelling used for new entries.
  pub const fn keys(self) -> &'static [&'static str] {
    match self {
      Self::ExternalId => &["tansiqid"],
      Self::Status => &["Status_id", "studentStatus_id"],
      Self::Total => &["Tot", "studentTot"],
      Self::Faculty => &["Faculty_id", "studentFaculty_id"],
      Self::University => &["Univeristy_id", "studentUniveristy_id"],
      Self::EnrollYear => &["EnrollYear_id", "studentEnrollYear_id"],
      Self::EnrollSemester => &["EnrollSemester_id", "studentEnrollSemester_id"],
      Self::EnrollStage => &["EnrollStage_id", "studentEnrollStage_id"],
      Self::RegistrationType => &["RegistrationType_id", "studentRegistrationType_id"],
      Self::PathShiftDate => &["pathShiftDate"],
      Self::TransferDate => &["transferDate"],
      Self::Level => &["Level_id", "studentLevel_id"],
      Self::TotalEquivalentHours => &["totalEquivalentHours"],
    }
  }

  /// Whether `doc` carries this slot at all, even as `null`.
  pub fn is_recorded(self, doc: &Map<String, Value>) -> bool {
    self.keys().iter().any(|key| doc.contains_key(*key))
  }

  /// First populated value among this slot's spellings.
  pub fn lookup(self, doc: &Map<String, Value>) -> Option<&Value> {
    self
      .keys()
      .iter()
      .filter_map(|key| doc.get(*key))
      .find(|value| is_populated(value))
  }

  fn id(self, doc: &Map<String, Value>) -> Option<i64> {
    match self.lookup(doc)? {
      Value::Number(n) => n.as_i64(),
      Value::String(s) => s.trim().parse().ok(),
      _ => None,
    }
  }

  fn text(self, doc: &Map<String, Value>) -> Option<String> {
    match self.lookup(doc)? {
      Value::String(s) => Some(s.trim().to_owned()),
      Value::Number(n) => Some(n.to_string()),
      _ => None,
    }
  }

  fn date(self, doc: &Map<String, Value>) -> Option<NaiveDate> {
    let text = self.text(doc)?;
    let day = text.get(..10).unwrap_or(&text);
    NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
  }
}

fn is_populated(value: &Value) -> bool {
  match value {
    Value::Null => false,
    Value::String(s) => !s.trim().is_empty(),
    _ => true,
  }
}

// ─── Payloads ────────────────────────────────────────────────────────────────

/// One side (`originalData` or `updatedData`) of a log entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Payload {
  #[default]
  Empty,
  Scalar(String),
  Document(Map<String, Value>),
}

impl Payload {
  pub fn scalar(value: impl ToString) -> Self { Self::Scalar(value.to_string()) }

  pub fn snapshot(snapshot: &EnrollmentSnapshot) -> Result<Self> {
    match serde_json::to_value(snapshot)? {
      Value::Object(doc) => Ok(Self::Document(doc)),
      other => Err(Error::MalformedPayload(format!("snapshot encoded as {other}"))),
    }
  }

  /// Like [`Payload::snapshot`], but `slots` the snapshot leaves empty are
  /// written as `null`, so reverting to it clears them.
  pub fn snapshot_recording(snapshot: &EnrollmentSnapshot, slots: &[Slot]) -> Result<Self> {
    let mut payload = Self::snapshot(snapshot)?;
    if let Self::Document(doc) = &mut payload {
      for slot in slots {
        if !slot.is_recorded(doc) {
          doc.insert(slot.keys()[0].to_owned(), Value::Null);
        }
      }
    }
    Ok(payload)
  }

  pub fn as_document(&self) -> Option<&Map<String, Value>> {
    match self {
      Self::Document(doc) => Some(doc),
      _ => None,
    }
  }

  /// Text stored in the log column. Documents are JSON objects; scalars are
  /// stored verbatim.
  pub fn to_column(&self) -> Result<Option<String>> {
    Ok(match self {
      Self::Empty => None,
      Self::Scalar(s) => Some(s.clone()),
      Self::Document(doc) => Some(serde_json::to_string(doc)?),
    })
  }

  pub fn from_column(text: Option<&str>) -> Result<Self> {
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
      return Ok(Self::Empty);
    };
    if text.trim_start().starts_with('{') {
      let doc: Map<String, Value> = serde_json::from_str(text)
        .map_err(|e| Error::MalformedPayload(e.to_string()))?;
      Ok(Self::Document(doc))
    } else {
      Ok(Self::Scalar(text.to_owned()))
    }
  }
}

/// Whether an entry of type `kind` with `original` as its original payload
/// carries enough data to be reverted.
pub fn can_revert(kind: TransactionType, original: &Payload) -> bool {
  let (Some(slots), Some(doc)) = (kind.revert_slots(), original.as_document())
  else {
    return false;
  };
  slots.iter().all(|slot| slot.lookup(doc).is_some())
}

// ─── Enrollment snapshot ─────────────────────────────────────────────────────

/// Structured payload describing a student's status and enrollment.
///
/// Serializes under the current key spellings; deserializes from any
/// spelling listed in [`Slot::keys`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Map<String, Value>")]
pub struct EnrollmentSnapshot {
  #[serde(rename = "tansiqid", skip_serializing_if = "Option::is_none")]
  pub external_id:            Option<String>,
  #[serde(rename = "Status_id", skip_serializing_if = "Option::is_none")]
  pub status_id:              Option<i64>,
  #[serde(rename = "Tot", skip_serializing_if = "Option::is_none")]
  pub total:                  Option<String>,
  #[serde(rename = "Faculty_id", skip_serializing_if = "Option::is_none")]
  pub faculty_id:             Option<i64>,
  #[serde(rename = "Univeristy_id", skip_serializing_if = "Option::is_none")]
  pub university_id:          Option<i64>,
  #[serde(rename = "EnrollYear_id", skip_serializing_if = "Option::is_none")]
  pub enroll_year_id:         Option<i64>,
  #[serde(rename = "EnrollSemester_id", skip_serializing_if = "Option::is_none")]
  pub enroll_semester_id:     Option<i64>,
  #[serde(rename = "EnrollStage_id", skip_serializing_if = "Option::is_none")]
  pub enroll_stage_id:        Option<i64>,
  #[serde(rename = "RegistrationType_id", skip_serializing_if = "Option::is_none")]
  pub registration_type_id:   Option<i64>,
  #[serde(rename = "pathShiftDate", skip_serializing_if = "Option::is_none")]
  pub path_shift_date:        Option<NaiveDate>,
  #[serde(rename = "transferDate", skip_serializing_if = "Option::is_none")]
  pub transfer_date:          Option<NaiveDate>,
  #[serde(rename = "Level_id", skip_serializing_if = "Option::is_none")]
  pub level_id:               Option<i64>,
  #[serde(rename = "totalEquivalentHours", skip_serializing_if = "Option::is_none")]
  pub total_equivalent_hours: Option<String>,
}

impl From<Map<String, Value>> for EnrollmentSnapshot {
  fn from(doc: Map<String, Value>) -> Self { Self::from_document(&doc) }
}

impl EnrollmentSnapshot {
  pub fn from_document(doc: &Map<String, Value>) -> Self {
    Self {
      external_id:            Slot::ExternalId.text(doc),
      status_id:              Slot::Status.id(doc),
      total:                  Slot::Total.text(doc),
      faculty_id:             Slot::Faculty.id(doc),
      university_id:          Slot::University.id(doc),
      enroll_year_id:         Slot::EnrollYear.id(doc),
      enroll_semester_id:     Slot::EnrollSemester.id(doc),
      enroll_stage_id:        Slot::EnrollStage.id(doc),
      registration_type_id:   Slot::RegistrationType.id(doc),
      path_shift_date:        Slot::PathShiftDate.date(doc),
      transfer_date:          Slot::TransferDate.date(doc),
      level_id:               Slot::Level.id(doc),
      total_equivalent_hours: Slot::TotalEquivalentHours.text(doc),
    }
  }

  /// Snapshot of the current enrollment state.
  pub fn capture(
    status: Option<StudentStatus>,
    external_id: Option<&str>,
    enrollment: &UniversityEnrollment,
  ) -> Self {
    Self {
      external_id:            external_id.map(str::to_owned),
      status_id:              status.map(StudentStatus::code),
      total:                  enrollment.total.clone(),
      faculty_id:             enrollment.faculty_id,
      university_id:          enrollment.university_id,
      enroll_year_id:         enrollment.enroll_year_id,
      enroll_semester_id:     enrollment.enroll_semester_id,
      enroll_stage_id:        enrollment.enroll_stage_id,
      registration_type_id:   enrollment.registration_type_id,
      path_shift_date:        enrollment.path_shift_date,
      transfer_date:          enrollment.transfer_date,
      level_id:               enrollment.level_id,
      total_equivalent_hours: enrollment.total_equivalent_hours.clone(),
    }
  }

  /// Overwrite the restorable enrollment fields with this snapshot's values.
  /// Absent fields are cleared; the total is only replaced when present.
  pub fn restore_into(&self, enrollment: &mut UniversityEnrollment) {
    enrollment.faculty_id = self.faculty_id;
    enrollment.university_id = self.university_id;
    enrollment.enroll_year_id = self.enroll_year_id;
    enrollment.enroll_semester_id = self.enroll_semester_id;
    enrollment.enroll_stage_id = self.enroll_stage_id;
    enrollment.registration_type_id = self.registration_type_id;
    enrollment.level_id = self.level_id;
    enrollment.total_equivalent_hours = self.total_equivalent_hours.clone();
    enrollment.transfer_date = self.transfer_date;
    enrollment.path_shift_date = self.path_shift_date;
    if self.total.is_some() {
      enrollment.total = self.total.clone();
    }
  }

  pub fn status(&self) -> Result<Option<StudentStatus>> {
    self.status_id.map(StudentStatus::from_code).transpose()
  }
}

// ─── Log entries ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionLogEntry {
  pub id:         i64,
  pub unique_id:  String,
  pub kind:       TransactionType,
  pub original:   Payload,
  pub updated:    Payload,
  pub created_at: DateTime<Utc>,
  /// `0` for the system.
  pub created_by: i64,
}

/// A log entry about to be appended.
#[derive(Debug, Clone, PartialEq)]
pub struct NewTransaction {
  pub unique_id:  String,
  pub kind:       TransactionType,
  pub original:   Payload,
  pub updated:    Payload,
  pub created_at: DateTime<Utc>,
  pub created_by: i64,
}

impl NewTransaction {
  pub fn new(
    unique_id: impl Into<String>,
    kind: TransactionType,
    created_by: i64,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      unique_id: unique_id.into(),
      kind,
      original: Payload::Empty,
      updated: Payload::Empty,
      created_at,
      created_by,
    }
  }

  pub fn original(mut self, payload: Payload) -> Self {
    self.original = payload;
    self
  }

  pub fn updated(mut self, payload: Payload) -> Self {
    self.updated = payload;
    self
  }
}
