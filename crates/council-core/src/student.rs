//! The student record and its satellite records.
//!
//! A student is stored as one [`StudentRecord`] plus a 1:1
//! [`SecondaryEducation`] and [`UniversityEnrollment`], and optionally the
//! [`AcceptedApplication`] received from the intake feed. All foreign-key
//! fields hold *local* reference ids; translation from external tokens
//! happens before anything reaches this module.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter};

use crate::{Error, Result};

/// Local surrogate key of a student row.
pub type StudentId = i64;

/// Actor id used for changes made by the system itself.
pub const SYSTEM_ACTOR: i64 = 0;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Lifecycle status of a student. Discriminants are the persisted codes.
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
pub enum StudentStatus {
  InitiallyAccepted   = 1,
  Accepted            = 2,
  Fulfillment         = 3,
  Withdrawn           = 4,
  Rejected            = 5,
  Transferred         = 6,
  GraduationApplicant = 7,
  Graduate            = 8,
}

impl StudentStatus {
  pub fn code(self) -> i64 { self as i64 }

  pub fn from_code(code: i64) -> Result<Self> {
    Ok(match code {
      1 => Self::InitiallyAccepted,
      2 => Self::Accepted,
      3 => Self::Fulfillment,
      4 => Self::Withdrawn,
      5 => Self::Rejected,
      6 => Self::Transferred,
      7 => Self::GraduationApplicant,
      8 => Self::Graduate,
      other => return Err(Error::UnknownStatus(other)),
    })
  }
}

// ─── Records ─────────────────────────────────────────────────────────────────

/// Personal data carried on the student row.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetails {
  pub full_name:        String,
  pub national_id:      Option<String>,
  pub passport:         Option<String>,
  pub birth_date:       Option<NaiveDate>,
  pub gender_id:        Option<i64>,
  pub nationality_id:   Option<i64>,
  pub religion_id:      Option<i64>,
  pub birth_place_id:   Option<i64>,
  pub address_place_id: Option<i64>,
  pub phone:            Option<String>,
  pub email:            Option<String>,
  pub address:          Option<String>,
  pub notes:            Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondaryEducation {
  pub certificate_id:      Option<i64>,
  pub certificate_year_id: Option<i64>,
  pub seat_number:         Option<String>,
  pub total:               Option<String>,
  pub equivalent_total:    Option<String>,
  pub sport_degree:        Option<String>,
  pub complaint_gain:      Option<String>,
  pub school:              Option<String>,
  pub department:          Option<String>,
  pub department_code_id:  Option<i64>,
  pub governorate_id:      Option<i64>,
  pub school_type_id:      Option<i64>,
  pub study_group_id:      Option<i64>,
}

/// Where the student is (or was last) enrolled.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniversityEnrollment {
  pub faculty_id:             Option<i64>,
  pub university_id:          Option<i64>,
  pub enroll_year_id:         Option<i64>,
  pub enroll_semester_id:     Option<i64>,
  pub enroll_stage_id:        Option<i64>,
  pub registration_type_id:   Option<i64>,
  pub total:                  Option<String>,
  pub level_id:               Option<i64>,
  pub total_equivalent_hours: Option<String>,
  pub transfer_date:          Option<NaiveDate>,
  /// Date of the most recent path-shift; drives the cool-down rule.
  pub path_shift_date:        Option<NaiveDate>,
}

/// The acceptance decision as received from the intake feed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptedApplication {
  pub faculty_id:           Option<i64>,
  pub university_id:        Option<i64>,
  pub year_id:              Option<i64>,
  pub semester_id:          Option<i64>,
  pub stage_id:             Option<i64>,
  pub registration_type_id: Option<i64>,
  pub total:                Option<String>,
  pub manual_addition:      bool,
  /// Intake-side user that made the decision, kept verbatim.
  pub decided_by:           Option<String>,
  pub decided_at:           Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentRecord {
  pub id:             StudentId,
  /// Human-facing id, assigned once and never changed.
  pub unique_id:      String,
  /// Intake-feed id (tansiqid).
  pub external_id:    Option<String>,
  pub old_council_id: Option<String>,
  pub status:         StudentStatus,
  #[serde(flatten)]
  pub person:         PersonDetails,
  pub created_at:     DateTime<Utc>,
  pub created_by:     i64,
  pub updated_at:     Option<DateTime<Utc>>,
  pub updated_by:     Option<i64>,
}

/// A student row together with its satellites.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StudentBundle {
  pub student:     StudentRecord,
  pub secondary:   SecondaryEducation,
  pub enrollment:  UniversityEnrollment,
  pub application: Option<AcceptedApplication>,
}

/// Everything needed to insert a student and its satellites.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewStudent {
  pub unique_id:      String,
  pub external_id:    Option<String>,
  pub old_council_id: Option<String>,
  pub status:         StudentStatus,
  pub person:         PersonDetails,
  pub secondary:      SecondaryEducation,
  pub enrollment:     UniversityEnrollment,
  pub application:    Option<AcceptedApplication>,
  pub created_at:     DateTime<Utc>,
  pub created_by:     i64,
}

#[cfg(test)]
mod tests {
  use strum::IntoEnumIterator as _;

  use super::*;

  #[test]
  fn status_codes_round_trip() {
    for status in StudentStatus::iter() {
      assert_eq!(StudentStatus::from_code(status.code()).unwrap(), status);
    }
  }

  #[test]
  fn unknown_status_code_is_an_error() {
    assert!(matches!(StudentStatus::from_code(42), Err(Error::UnknownStatus(42))));
  }

  #[test]
  fn status_serializes_snake_case() {
    let json = serde_json::to_string(&StudentStatus::InitiallyAccepted).unwrap();
    assert_eq!(json, "\"initially_accepted\"");
    assert_eq!(StudentStatus::GraduationApplicant.to_string(), "graduation_applicant");
  }
}
