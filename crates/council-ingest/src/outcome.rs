//! Per-record results reported back to the caller.
//!
//! Every record in a batch ends with exactly one [`RecordOutcome`]. The
//! numeric codes are part of the wire contract with the intake feed and
//! several of them are shared between outcomes (`11`, `31`).

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumIter};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
  Accepted,
  Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, AsRefStr, EnumIter)]
pub enum OutcomeCode {
  Accepted,
  AlreadyExists,
  CannotWithdraw,
  Withdrawn,
  PathShiftApplied,
  InvalidFormat,
  NotFound,
  AlreadyAccepted,
  ExistsInAnotherFaculty,
  PathShiftCoolDown,
  DifferentFacultyFamily,
  NationalIdExists,
  MissingId,
  UnknownFaculty,
  MissingNationality,
  MissingNationalId,
  MissingPassport,
  MissingCertificate,
  MissingTotal,
  MissingEquivalentTotal,
  Validation,
  Mapping,
  Unexpected,
  InAnotherRequest,
}

impl OutcomeCode {
  pub fn code(self) -> u16 {
    use OutcomeCode::*;
    match self {
      Accepted => 10,
      AlreadyExists | CannotWithdraw => 11,
      Withdrawn => 12,
      PathShiftApplied => 14,
      InvalidFormat => 21,
      NotFound => 22,
      AlreadyAccepted => 23,
      ExistsInAnotherFaculty => 24,
      PathShiftCoolDown => 25,
      DifferentFacultyFamily => 26,
      NationalIdExists => 30,
      MissingId | UnknownFaculty => 31,
      MissingNationality => 32,
      MissingNationalId => 33,
      MissingPassport => 34,
      MissingCertificate => 35,
      MissingTotal => 36,
      MissingEquivalentTotal => 37,
      Validation => 40,
      Mapping => 50,
      Unexpected => 60,
      InAnotherRequest => 61,
    }
  }

  pub fn verdict(self) -> Verdict {
    match self {
      Self::Accepted | Self::AlreadyExists | Self::Withdrawn | Self::PathShiftApplied => {
        Verdict::Accepted
      }
      _ => Verdict::Rejected,
    }
  }

  pub fn message(self) -> &'static str {
    use OutcomeCode::*;
    match self {
      Accepted => "Student accepted",
      AlreadyExists => "Student already exists",
      CannotWithdraw => "Student cannot be withdrawn, status is not initially accepted",
      Withdrawn => "Student withdrawn",
      PathShiftApplied => "Student path shift applied",
      InvalidFormat => {
        "Invalid student format, every student must contain student, studentEdu, and \
         studentAcceptance"
      }
      NotFound => "Student not found",
      AlreadyAccepted => "Student was already accepted in this faculty",
      ExistsInAnotherFaculty => "Student exists in another faculty",
      PathShiftCoolDown => "A path shift was applied to this student recently",
      DifferentFacultyFamily => "Student exists in a faculty of a different family",
      NationalIdExists => "National id belongs to another student",
      MissingId => "Missing student id, student id is required",
      UnknownFaculty => "Invalid id, `studentAcceptance.fac_id` does not exist in the council",
      MissingNationality => "Missing nationality id, a numeric nationality id is required",
      MissingNationalId => "Missing national id, national id is required for domestic students",
      MissingPassport => "Missing passport, passport is required for foreign students",
      MissingCertificate => "Missing id, `studentEdu.studentSecondaryCert_id` is required",
      MissingTotal => {
        "Missing total degree, `studentEdu.studentTot` is required for general secondary \
         students"
      }
      MissingEquivalentTotal => {
        "Missing equivalent total degree, `studentEdu.studentEquivTotscienceB` is required for \
         other certificates"
      }
      Validation => "Invalid student data",
      Mapping => "Invalid student ids",
      Unexpected => "Unexpected error",
      InAnotherRequest => "Student is being processed in another request",
    }
  }
}

/// One problem found while checking a record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
  pub code:    u16,
  pub message: String,
}

impl Issue {
  pub fn new(code: OutcomeCode, message: impl Into<String>) -> Self {
    Self { code: code.code(), message: message.into() }
  }

  /// An issue carrying the code's standard message.
  pub fn of(code: OutcomeCode) -> Self { Self::new(code, code.message()) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
  pub external_id: Option<String>,
  pub status:      Verdict,
  pub code:        u16,
  pub message:     String,
  /// `<match basis><classifier branch>`, for diagnostics only.
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub case_code:   Option<String>,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub errors:      Vec<Issue>,
}

impl RecordOutcome {
  pub fn new(external_id: Option<&str>, code: OutcomeCode) -> Self {
    Self {
      external_id: external_id.map(str::to_owned),
      status:      code.verdict(),
      code:        code.code(),
      message:     code.message().to_owned(),
      case_code:   None,
      errors:      Vec::new(),
    }
  }

  /// A rejection summarising every issue found. The first issue decides the
  /// code.
  pub fn from_issues(external_id: Option<&str>, issues: Vec<Issue>) -> Self {
    let code = issues.first().map_or(OutcomeCode::Validation.code(), |i| i.code);
    let message = issues.iter().map(|i| i.message.as_str()).collect::<Vec<_>>().join("; ");
    Self {
      external_id: external_id.map(str::to_owned),
      status: Verdict::Rejected,
      code,
      message,
      case_code: None,
      errors: issues,
    }
  }

  /// A storage failure, with the underlying message appended.
  pub fn unexpected(external_id: Option<&str>, error: &dyn std::fmt::Display) -> Self {
    Self::new(external_id, OutcomeCode::Unexpected)
      .with_message(format!("{}, {error}", OutcomeCode::Unexpected.message()))
  }

  pub fn with_message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self
  }

  pub fn with_case(mut self, case_code: impl Into<String>) -> Self {
    self.case_code = Some(case_code.into());
    self
  }

  pub fn is_accepted(&self) -> bool { self.status == Verdict::Accepted }
}
