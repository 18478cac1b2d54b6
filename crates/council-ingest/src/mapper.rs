//! Translation of external id tokens into local reference ids, and assembly
//! of the mapped record into the local student shape.

use std::collections::HashMap;

use council_core::{
  reference::{Dimension, ExternalIdentifierMap},
  student::{AcceptedApplication, PersonDetails, SecondaryEducation, UniversityEnrollment},
};

use crate::{
  outcome::{Issue, OutcomeCode},
  record::{Group, IncomingRecord},
  rules::parse_date_prefix,
};

/// How a missing or unknown token is treated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presence {
  /// Must be present and known.
  Required,
  /// Left unset when absent or unknown.
  Optional,
  /// May be absent, but a present token must be known.
  Strict,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
  pub group:     Group,
  pub key:       &'static str,
  pub dimension: Dimension,
  pub presence:  Presence,
}

const fn field(group: Group, key: &'static str, dimension: Dimension, presence: Presence) -> FieldSpec {
  FieldSpec { group, key, dimension, presence }
}

/// Id-shaped fields of an intake record.
pub const INTAKE_FIELDS: &[FieldSpec] = {
  use Dimension::*;
  use Group::*;
  use Presence::*;
  &[
    field(Person, "studentGender_id", Gender, Optional),
    field(Person, "studentNationality_id", Region, Optional),
    field(Person, "studentReligion_id", Religion, Optional),
    field(Person, "studentBirthPlace_id", Region, Optional),
    field(Person, "studentAddressPlace_id", Region, Optional),
    field(Secondary, "studentDeptCode_id", Region, Optional),
    field(Secondary, "studentSecondaryCert_id", Certificate, Required),
    field(Secondary, "studentSchoolType_id", SchoolType, Optional),
    field(Secondary, "year_id", Year, Required),
    field(Secondary, "studentCity_id", Region, Optional),
    field(Secondary, "studentSpecialization_id", StudyGroup, Required),
    field(Acceptance, "fac_id", Faculty, Required),
    field(Acceptance, "semester_id", Semester, Required),
    field(Acceptance, "stage_id", Stage, Required),
    field(Acceptance, "accept_year_id", Year, Required),
    field(Acceptance, "univ_id", University, Required),
    field(Acceptance, "registrationType", RegistrationType, Required),
  ]
};

/// Local ids found for a record, by field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedIds {
  ids: HashMap<(Group, &'static str), i64>,
}

impl MappedIds {
  pub fn get(&self, group: Group, key: &'static str) -> Option<i64> {
    self.ids.get(&(group, key)).copied()
  }

  pub fn insert(&mut self, group: Group, key: &'static str, id: i64) {
    self.ids.insert((group, key), id);
  }

  pub fn len(&self) -> usize { self.ids.len() }

  pub fn is_empty(&self) -> bool { self.ids.is_empty() }
}

/// Translate every field in `fields`. All failures are reported, one issue
/// per field.
pub fn map_ids(
  record: &IncomingRecord,
  fields: &[FieldSpec],
  ids: &ExternalIdentifierMap,
) -> (MappedIds, Vec<Issue>) {
  let mut mapped = MappedIds::default();
  let mut issues = Vec::new();

  for spec in fields {
    let label = record.field_label(spec.group, spec.key);
    let Some(token) = record.text(spec.group, spec.key) else {
      if spec.presence == Presence::Required {
        issues.push(Issue::new(
          OutcomeCode::Mapping,
          format!("Missing id, `{label}` is required"),
        ));
      }
      continue;
    };
    match ids.resolve(spec.dimension, &token) {
      Some(id) => mapped.insert(spec.group, spec.key, id),
      None if spec.presence == Presence::Optional => {}
      None => issues.push(Issue::new(
        OutcomeCode::Mapping,
        format!("Invalid id, `{label}` does not exist in the council"),
      )),
    }
  }

  (mapped, issues)
}

/// A record in the local shape, ready to be written.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MappedRecord {
  pub person:      PersonDetails,
  pub secondary:   SecondaryEducation,
  pub enrollment:  UniversityEnrollment,
  pub application: AcceptedApplication,
}

impl MappedRecord {
  /// Build the local shape of an intake record from its mapped ids.
  pub fn from_intake(record: &IncomingRecord, ids: &MappedIds, full_name: String) -> Self {
    use Group::*;
    let text = |group, key| record.text(group, key);

    let person = PersonDetails {
      full_name,
      national_id: text(Person, "studentNID"),
      passport: text(Person, "studentPassport"),
      birth_date: text(Person, "studentBirthDate").as_deref().and_then(parse_date_prefix),
      gender_id: ids.get(Person, "studentGender_id"),
      nationality_id: ids.get(Person, "studentNationality_id"),
      religion_id: ids.get(Person, "studentReligion_id"),
      birth_place_id: ids.get(Person, "studentBirthPlace_id"),
      address_place_id: ids.get(Person, "studentAddressPlace_id"),
      phone: text(Person, "studentPhone"),
      email: text(Person, "studentMail"),
      address: text(Person, "studentAddress"),
      notes: None,
    };

    let secondary = SecondaryEducation {
      certificate_id:      ids.get(Secondary, "studentSecondaryCert_id"),
      certificate_year_id: ids.get(Secondary, "year_id"),
      seat_number:         text(Secondary, "studentSeatNumber"),
      total:               text(Secondary, "studentTot"),
      equivalent_total:    text(Secondary, "studentEquivTotscienceB"),
      sport_degree:        text(Secondary, "studentSportDegree"),
      complaint_gain:      text(Secondary, "studentComplainGain"),
      school:              text(Secondary, "studentSchool"),
      department:          text(Secondary, "studentDept"),
      department_code_id:  ids.get(Secondary, "studentDeptCode_id"),
      governorate_id:      ids.get(Secondary, "studentCity_id"),
      school_type_id:      ids.get(Secondary, "studentSchoolType_id"),
      study_group_id:      ids.get(Secondary, "studentSpecialization_id"),
    };

    let accepted_total = text(Acceptance, "accept_studentTot");
    let enrollment = UniversityEnrollment {
      faculty_id: ids.get(Acceptance, "fac_id"),
      university_id: ids.get(Acceptance, "univ_id"),
      enroll_year_id: ids.get(Acceptance, "accept_year_id"),
      enroll_semester_id: ids.get(Acceptance, "semester_id"),
      enroll_stage_id: ids.get(Acceptance, "stage_id"),
      registration_type_id: ids.get(Acceptance, "registrationType"),
      total: accepted_total.clone(),
      ..Default::default()
    };

    let application = AcceptedApplication {
      faculty_id:           enrollment.faculty_id,
      university_id:        enrollment.university_id,
      year_id:              enrollment.enroll_year_id,
      semester_id:          enrollment.enroll_semester_id,
      stage_id:             enrollment.enroll_stage_id,
      registration_type_id: enrollment.registration_type_id,
      total:                accepted_total,
      manual_addition:      record.flag(Acceptance, "manualAddition"),
      decided_by:           text(Acceptance, "accept_createdBy"),
      decided_at:           text(Acceptance, "accept_createdAt").as_deref().and_then(parse_date_prefix),
    };

    Self { person, secondary, enrollment, application }
  }
}
