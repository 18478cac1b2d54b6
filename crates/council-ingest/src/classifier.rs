//! The decision table: what to do with a record, given what is known about
//! the student it matched.
//!
//! [`Situation::assess`] reduces a match to a handful of facts and
//! [`classify`] maps those facts to an [`Action`]. The table is a pure
//! function so every combination can be tested.

use chrono::NaiveDate;
use council_core::{
  reference::{AcademicPeriod, Faculty},
  store::StudentMatch,
  student::StudentStatus,
};
use strum::EnumIter;

use crate::{outcome::OutcomeCode, settings::IngestSettings};

/// The matched student's status, as far as classification cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter)]
pub enum StatusClass {
  NoMatch,
  InitiallyAccepted,
  Accepted,
  Fulfillment,
  Withdrawn,
  Other,
}

impl StatusClass {
  pub fn of(status: Option<StudentStatus>) -> Self {
    match status {
      None => Self::NoMatch,
      Some(StudentStatus::InitiallyAccepted) => Self::InitiallyAccepted,
      Some(StudentStatus::Accepted) => Self::Accepted,
      Some(StudentStatus::Fulfillment) => Self::Fulfillment,
      Some(StudentStatus::Withdrawn) => Self::Withdrawn,
      Some(_) => Self::Other,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Situation {
  pub status:       StatusClass,
  /// The student's enrollment year and semester are both recorded.
  pub period_known: bool,
  /// A path-shift happened less than the cool-down period ago.
  pub cool_down:    bool,
  /// Enrolled in the current year and semester.
  pub same_period:  bool,
  /// Enrolled in the current year.
  pub same_year:    bool,
  pub same_faculty: bool,
  /// The target faculty is of the same discipline family.
  pub same_family:  bool,
}

impl Situation {
  pub fn assess(
    found: Option<&StudentMatch>,
    target: &Faculty,
    period: &AcademicPeriod,
    today: NaiveDate,
    settings: &IngestSettings,
  ) -> Self {
    let Some(found) = found else {
      return Self {
        status:       StatusClass::NoMatch,
        period_known: false,
        cool_down:    false,
        same_period:  false,
        same_year:    false,
        same_faculty: false,
        same_family:  false,
      };
    };

    let same_year = found.enroll_year_code.as_deref() == Some(period.year_code.as_str());
    let same_semester =
      found.enroll_semester_code.as_deref() == Some(period.semester_code.as_str());
    let cool_down = found
      .path_shift_date
      .is_some_and(|shifted| (today - shifted).num_days() < settings.path_shift_cool_down_days);

    Self {
      status: StatusClass::of(Some(found.status)),
      period_known: found.enroll_year_code.is_some() && found.enroll_semester_code.is_some(),
      cool_down,
      same_period: same_year && same_semester,
      same_year,
      same_faculty: found.faculty_id == Some(target.id),
      same_family: settings.same_family(found.faculty_family_id, target.family_id),
    }
  }
}

/// Why a record was turned down by the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
  PathShiftCoolDown,
  AlreadyAccepted,
  ExistsInAnotherFaculty,
  DifferentFacultyFamily,
}

impl Rejection {
  pub fn outcome(self) -> OutcomeCode {
    match self {
      Self::PathShiftCoolDown => OutcomeCode::PathShiftCoolDown,
      Self::AlreadyAccepted => OutcomeCode::AlreadyAccepted,
      Self::ExistsInAnotherFaculty => OutcomeCode::ExistsInAnotherFaculty,
      Self::DifferentFacultyFamily => OutcomeCode::DifferentFacultyFamily,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
  Create,
  Update,
  Ignore,
  PathShift,
  Enroll,
  Reject(Rejection),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Decision {
  pub action: Action,
  /// Second digit of the case code.
  pub branch: u8,
}

impl Decision {
  fn new(action: Action) -> Self {
    let branch = match action {
      Action::Reject(_) => 0,
      Action::Create => 1,
      Action::Update => 2,
      Action::Enroll => 3,
      Action::PathShift => 5,
      Action::Ignore => 7,
    };
    Self { action, branch }
  }
}

pub fn classify(s: &Situation) -> Decision {
  use StatusClass::*;

  let withdrawn = s.status == Withdrawn;
  let enroll_or = |rejection| if withdrawn { Action::Enroll } else { Action::Reject(rejection) };

  let action = match s.status {
    NoMatch => Action::Create,
    InitiallyAccepted if !s.period_known => Action::Update,
    InitiallyAccepted if s.cool_down => Action::Reject(Rejection::PathShiftCoolDown),
    InitiallyAccepted if s.same_period => Action::Update,
    InitiallyAccepted => Action::Ignore,
    Accepted | Fulfillment | Withdrawn if s.same_faculty => enroll_or(Rejection::AlreadyAccepted),
    Accepted | Fulfillment | Withdrawn if s.same_family => {
      enroll_or(Rejection::ExistsInAnotherFaculty)
    }
    Accepted | Fulfillment | Withdrawn if s.same_year => {
      Action::Reject(Rejection::DifferentFacultyFamily)
    }
    Accepted | Fulfillment | Withdrawn => Action::PathShift,
    Other => Action::Ignore,
  };

  let mut decision = Decision::new(action);
  if action == Action::Enroll && !s.same_faculty {
    decision.branch = 4;
  }
  decision
}
