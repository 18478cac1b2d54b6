//! Cleaning and mapping of one old-council record.
//!
//! The old council's data is dirty, so most problems are repaired and
//! reported as warnings. Only unmapped ids and an unusable status block a
//! record.

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use council_core::{
  reference::{Dimension, ExternalIdentifierMap, Faculty},
  student::{PersonDetails, SecondaryEducation, StudentStatus, UniversityEnrollment},
};
use serde::Serialize;
use serde_json::Value;

use crate::{
  mapper::{FieldSpec, Presence, map_ids},
  patterns::{
    DECIMAL, DISALLOWED_NAME_CHARS, LETTERS_ONLY, NATIONAL_ID, PHONE, TOTAL_DEGREE,
    collapse_spaces,
  },
  record::{Group, IncomingRecord, value_text},
  rules::{self, Check, Rule, parse_date_prefix},
  settings::IngestSettings,
};

/// Id-shaped fields of an old-council record, keyed on old-council tokens.
pub const LEGACY_FIELDS: &[FieldSpec] = {
  use Dimension::*;
  use Group::*;
  use Presence::*;
  &[
    field(Person, "studentGender_id", Gender, Strict),
    field(Person, "studentNationality_id", Region, Strict),
    field(Secondary, "certificateYear_id", Year, Strict),
    field(Secondary, "studentDeptCode_id", StudyGroup, Strict),
    field(Secondary, "studentSecondaryCert_id", Certificate, Strict),
    field(Acceptance, "studentEnrollYear_id", Year, Strict),
    field(Acceptance, "studentFaculty_id", Faculty, Strict),
    field(Acceptance, "AcceptanceStatus", Status, Required),
    field(Acceptance, "UserID", User, Strict),
    field(Acceptance, "RegistrationTypeID", RegistrationType, Strict),
    field(Acceptance, "OriginalFacultyID", Faculty, Strict),
    field(Acceptance, "OriginalUniID", University, Strict),
  ]
};

const fn field(group: Group, key: &'static str, dimension: Dimension, presence: Presence) -> FieldSpec {
  FieldSpec { group, key, dimension, presence }
}

/// Registration type of students transferred in from another university.
const TRANSFER_REGISTRATION: &str = "-1";

/// Old-council stage ids and the local (semester, stage) they stand for.
fn map_stage(stage: i64) -> Option<(i64, i64)> {
  match stage {
    1 | 7 => Some((1, 1)),
    2 => Some((1, 2)),
    3 => Some((1, 3)),
    4 => Some((2, 1)),
    5..=26 => Some((2, 6)),
    _ => None,
  }
}

/// An old-council student in the local shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStudent {
  pub old_council_id:         String,
  pub status:                 StudentStatus,
  pub person:                 PersonDetails,
  pub secondary:              SecondaryEducation,
  pub enrollment:             UniversityEnrollment,
  pub accepted_at:            Option<DateTime<Utc>>,
  pub modified_at:            Option<DateTime<Utc>>,
  /// Local user that last modified the record.
  pub modified_by:            Option<i64>,
  pub original_faculty_id:    Option<i64>,
  pub original_university_id: Option<i64>,
}

impl LegacyStudent {
  /// Who made the transfer: the last modifier if the record was never
  /// touched after the transfer day, the system otherwise.
  pub fn transfer_actor(&self) -> i64 {
    let untouched = self.enrollment.transfer_date.is_some()
      && self.modified_at.map(|at| at.date_naive()) == self.enrollment.transfer_date;
    if untouched { self.modified_by.unwrap_or_default() } else { 0 }
  }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Normalized {
  /// Absent when the record is blocked.
  pub student:  Option<LegacyStudent>,
  pub messages: Vec<String>,
}

impl Normalized {
  pub fn is_blocked(&self) -> bool { self.student.is_none() }
}

/// Parse the many timestamp shapes the old council emits.
pub fn parse_timestamp(text: &str) -> Option<DateTime<Utc>> {
  let text = text.trim();
  if let Ok(at) = DateTime::parse_from_rfc3339(text) {
    return Some(at.with_timezone(&Utc));
  }
  for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
    if let Ok(at) = NaiveDateTime::parse_from_str(text, format) {
      return Some(at.and_utc());
    }
  }
  parse_date_prefix(text).and_then(|day| day.and_hms_opt(0, 0, 0)).map(|at| at.and_utc())
}

/// Birth date and gender token encoded in a valid national id.
fn from_national_id(national_id: &str) -> Option<(NaiveDate, &'static str)> {
  let century = if national_id.starts_with('2') { 1900 } else { 2000 };
  let year: i32 = national_id.get(1..3)?.parse().ok()?;
  let month: u32 = national_id.get(3..5)?.parse().ok()?;
  let day: u32 = national_id.get(5..7)?.parse().ok()?;
  let birth_date = NaiveDate::from_ymd_opt(century + year, month, day)?;
  let sex_digit: u32 = national_id.get(12..13)?.parse().ok()?;
  Some((birth_date, if sex_digit % 2 == 1 { "0" } else { "1" }))
}

fn clean_legacy_name(raw: &str) -> String {
  let without_marker = raw.replace("(م)", "");
  collapse_spaces(&DISALLOWED_NAME_CHARS.replace_all(&without_marker, ""))
}

/// Clean, check and map one record. `faculty` is the faculty being migrated;
/// it stands in for a missing faculty and supplies the university.
pub fn normalize(
  mut record: IncomingRecord,
  old_council_id: &str,
  ids: &ExternalIdentifierMap,
  faculty: &Faculty,
  settings: &IngestSettings,
) -> Normalized {
  use Group::*;
  let mut messages = Vec::new();

  let transfer_date = if record.text(Acceptance, "RegistrationTypeID").as_deref()
    == Some(TRANSFER_REGISTRATION)
  {
    record.text(Acceptance, "AcceptDate").as_deref().and_then(parse_date_prefix)
  } else {
    None
  };

  // National id: drop it when malformed, otherwise trust what it encodes.
  let mut birth_date = record.text(Person, "studentBirthDate").as_deref().and_then(parse_date_prefix);
  let mut national_id = record.text(Person, "studentNID");
  if let Some(nid) = national_id.clone() {
    match from_national_id(&nid).filter(|_| NATIONAL_ID.is_match(&nid)) {
      Some((born, gender)) => {
        birth_date = Some(born);
        record.set(Person, "studentGender_id", Some(gender.to_owned()));
      }
      None => {
        national_id = None;
        messages.push(format!("Invalid national id, found {nid} and set to null"));
      }
    }
  }

  let raw_name = record.text(Person, "studentNameAr").unwrap_or_default();
  let full_name = clean_legacy_name(&raw_name);
  if full_name != raw_name {
    messages.push(format!(
      "Invalid student name, student name does not contain letters only, found `{raw_name}` and \
       replaced with `{full_name}`"
    ));
  }

  let mut phone = record.text(Person, "studentPhone");
  if let Some(number) = phone.clone().filter(|p| !PHONE.is_match(p)) {
    phone = None;
    messages.push(format!("Invalid student phone number, found `{number}` and set to `null`"));
  }

  let mut notes = record.text(Person, "notes").unwrap_or_default();
  if notes.contains("DB Entry") {
    notes = notes.replace("DB Entry", "").trim().to_owned();
    messages.push("`DB Entry` is found and removed from notes".to_owned());
  }
  if let Some(previous) = record.text(Acceptance, "OriginalUniName") {
    if !notes.contains(&previous) {
      notes = format!("{notes}\n{previous}").trim().to_owned();
    }
  }

  // A zero degree means the old council never had one.
  let nonzero = |v: Option<String>| v.filter(|d| d != "0");
  let total = nonzero(record.text(Secondary, "studentTotalDegree"));
  let equivalent_total = nonzero(record.text(Secondary, "studentEquivTotalDegree"));
  let certificate_token = record.text(Secondary, "studentSecondaryCert_id");
  let general_secondary = certificate_token
    .as_deref()
    .is_some_and(|token| settings.is_general_secondary(ids.resolve(Dimension::Certificate, token)));
  match &certificate_token {
    None => messages.push("Missing id `secondaryEdu.studentSecondaryCert_id`".to_owned()),
    Some(_) if general_secondary && total.is_none() => messages.push(
      "Missing total degree, `secondaryEdu.studentTotalDegree` is required for GS students"
        .to_owned(),
    ),
    Some(_) if !general_secondary && equivalent_total.is_none() => messages.push(
      "Missing equivalent total degree, `secondaryEdu.studentEquivTotalDegree` is required for \
       non GS students"
        .to_owned(),
    ),
    Some(_) => {}
  }

  messages.extend(warnings(&record, &full_name));

  let level_id = record
    .text(Acceptance, "ConvertLevel")
    .filter(|level| level != "0")
    .and_then(|level| level.parse().ok());

  let (mut mapped, issues) = map_ids(&record, LEGACY_FIELDS, ids);
  let blocked = !issues.is_empty();
  messages.extend(issues.into_iter().map(|issue| issue.message));

  if mapped.get(Acceptance, "studentFaculty_id").is_none() {
    mapped.insert(Acceptance, "studentFaculty_id", faculty.id);
  }

  let stage_token = record.text(Acceptance, "studentEnrollStage_id");
  let semester_and_stage = stage_token.as_deref().and_then(|s| s.parse().ok()).and_then(map_stage);
  if semester_and_stage.is_none() {
    messages.push(format!(
      "Unknown stage id, found `{}`",
      stage_token.as_deref().unwrap_or_default()
    ));
  }

  let status = match mapped.get(Acceptance, "AcceptanceStatus").map(StudentStatus::from_code) {
    Some(Ok(status)) => Some(status),
    Some(Err(e)) => {
      messages.push(format!("Invalid acceptance status, {e}"));
      None
    }
    None => None,
  };
  let Some(status) = status.filter(|_| !blocked) else {
    return Normalized { student: None, messages };
  };

  let student = LegacyStudent {
    old_council_id: old_council_id.to_owned(),
    status,
    person: PersonDetails {
      full_name,
      national_id,
      passport: record.text(Person, "studentPassport"),
      birth_date,
      gender_id: mapped.get(Person, "studentGender_id"),
      nationality_id: mapped.get(Person, "studentNationality_id"),
      phone,
      address: record.text(Person, "studentAddress"),
      notes: (!notes.is_empty()).then_some(notes),
      ..Default::default()
    },
    secondary: SecondaryEducation {
      certificate_id: mapped.get(Secondary, "studentSecondaryCert_id"),
      certificate_year_id: mapped.get(Secondary, "certificateYear_id"),
      seat_number: seat_number(old_council_id, general_secondary),
      total: total.clone(),
      equivalent_total,
      study_group_id: mapped.get(Secondary, "studentDeptCode_id"),
      ..Default::default()
    },
    enrollment: UniversityEnrollment {
      faculty_id: mapped.get(Acceptance, "studentFaculty_id"),
      university_id: faculty.university_id,
      enroll_year_id: mapped.get(Acceptance, "studentEnrollYear_id"),
      enroll_semester_id: semester_and_stage.map(|(semester, _)| semester),
      enroll_stage_id: semester_and_stage.map(|(_, stage)| stage),
      registration_type_id: mapped.get(Acceptance, "RegistrationTypeID"),
      total,
      level_id,
      total_equivalent_hours: record.text(Acceptance, "TotalEquivalentHours"),
      transfer_date,
      path_shift_date: None,
    },
    accepted_at: record.text(Acceptance, "AcceptDate").as_deref().and_then(parse_timestamp),
    modified_at: record.text(Acceptance, "ModifiedDate").as_deref().and_then(parse_timestamp),
    modified_by: mapped.get(Acceptance, "UserID"),
    original_faculty_id: mapped.get(Acceptance, "OriginalFacultyID"),
    original_university_id: mapped.get(Acceptance, "OriginalUniID"),
  };
  Normalized { student: Some(student), messages }
}

/// General secondary seat numbers are the old-council id minus its last four
/// characters.
fn seat_number(old_council_id: &str, general_secondary: bool) -> Option<String> {
  let chars: Vec<char> = old_council_id.chars().collect();
  (general_secondary && chars.len() > 4).then(|| chars[..chars.len() - 4].iter().collect())
}

fn rule<'a>(field: &str, value: Option<&'a Value>, check: Check, message: &str) -> Rule<'a> {
  let found = value.and_then(value_text).unwrap_or_default();
  Rule::new(field, value, check).message(format!("{message}, found `{found}`"))
}

/// Format checks whose failures are only reported.
fn warnings(record: &IncomingRecord, cleaned_name: &str) -> Vec<String> {
  use Group::*;
  let name = Value::String(cleaned_name.to_owned());

  let invalid_name = "Invalid student name";
  let degree = "must be a number with maximum 3 integer numbers and 3 floating numbers";
  let rules = [
    rule(
      "student.studentNameAr",
      Some(&name),
      Check::Matches(&LETTERS_ONLY),
      &format!("{invalid_name}, student name does not contain letters only"),
    ),
    rule(
      "student.studentNameAr",
      Some(&name),
      Check::MaxLength(100),
      &format!("{invalid_name}, student name exceeds 100 letters"),
    ),
    rule(
      "student.studentNameAr",
      Some(&name),
      Check::MinWords(4),
      &format!("{invalid_name}, student name is not quadrilateral"),
    ),
    rule(
      "student.studentNationality_id",
      record.raw(Person, "studentNationality_id"),
      Check::Required,
      "Missing nationality id, nationality id is required",
    ),
    rule(
      "student.studentAddress",
      record.raw(Person, "studentAddress"),
      Check::MaxLength(250),
      "Address must not exceed 250 characters",
    ),
    rule(
      "secondaryEdu.studentTotalDegree",
      record.raw(Secondary, "studentTotalDegree"),
      Check::Matches(&TOTAL_DEGREE),
      &format!("Invalid student total degree, {degree}"),
    ),
    rule(
      "secondaryEdu.studentEquivTotalDegree",
      record.raw(Secondary, "studentEquivTotalDegree"),
      Check::Matches(&TOTAL_DEGREE),
      &format!("Invalid student equivalent total degree, {degree}"),
    ),
    rule(
      "studentUniversityEdu.TotalEquivalentHours",
      record.raw(Acceptance, "TotalEquivalentHours"),
      Check::Matches(&DECIMAL),
      "Invalid total equivalent hours, must be a number",
    ),
  ];
  rules::run(&rules).into_iter().map(|issue| issue.message).collect()
}

#[cfg(test)]
mod tests {
  use council_core::reference::{KeySource, ReferenceRow};
  use serde_json::json;

  use super::*;
  use crate::record::RecordLayout;

  fn ids() -> ExternalIdentifierMap {
    let row = |dimension, id: i64, key: &str| ReferenceRow {
      old_council_key: Some(key.to_owned()),
      ..ReferenceRow::new(dimension, id)
    };
    ExternalIdentifierMap::build(
      &[
        row(Dimension::Gender, 1, "0"),
        row(Dimension::Gender, 2, "1"),
        row(Dimension::Region, 1, "1"),
        row(Dimension::Year, 20, "2019"),
        row(Dimension::Year, 25, "2024"),
        row(Dimension::StudyGroup, 3, "2"),
        row(Dimension::Certificate, 1, "1"),
        row(Dimension::Certificate, 4, "9"),
        row(Dimension::Faculty, 7, "70"),
        row(Dimension::Status, 2, "2"),
        row(Dimension::Status, 99, "99"),
        row(Dimension::User, 5, "500"),
        row(Dimension::RegistrationType, 1, "1"),
        row(Dimension::RegistrationType, 3, "-1"),
        row(Dimension::Faculty, 8, "80"),
        row(Dimension::University, 2, "20"),
      ],
      KeySource::OldCouncil,
    )
  }

  fn faculty() -> Faculty { Faculty { id: 7, university_id: Some(1), family_id: Some(2) } }

  fn raw() -> Value {
    json!({
      "student": {
        "id": "1234567890",
        "studentNameAr": "محمد احمد علي حسن (م)",
        "studentNID": "30001010112345",
        "studentNationality_id": "1",
        "studentPhone": "01001234567",
        "studentAddress": "Giza",
        "notes": "DB Entry transferred"
      },
      "secondaryEdu": {
        "studentTotalDegree": "390",
        "studentEquivTotalDegree": "0",
        "certificateYear_id": "2019",
        "studentDeptCode_id": "2",
        "studentSecondaryCert_id": "1"
      },
      "studentUniversityEdu": {
        "studentEnrollYear_id": "2024",
        "studentFaculty_id": "70",
        "studentEnrollStage_id": "7",
        "AcceptanceStatus": "2",
        "UserID": "500",
        "RegistrationTypeID": "1",
        "ConvertLevel": "0",
        "TotalEquivalentHours": "",
        "AcceptDate": "2024-08-01T10:00:00",
        "ModifiedDate": "2024-08-02 09:30:00.000"
      }
    })
  }

  fn run(value: &Value) -> Normalized {
    let record = IncomingRecord::parse(value, RecordLayout::LEGACY).unwrap();
    normalize(record, "1234567890", &ids(), &faculty(), &IngestSettings::default())
  }

  #[test]
  fn clean_record_is_repaired_and_mapped() {
    let normalized = run(&raw());
    let student = normalized.student.clone().unwrap();

    assert_eq!(student.status, StudentStatus::Accepted);
    assert_eq!(student.person.full_name, "محمد احمد علي حسن");
    assert_eq!(student.person.birth_date, NaiveDate::from_ymd_opt(2000, 1, 1));
    // Digit 13 is 4: female.
    assert_eq!(student.person.gender_id, Some(2));
    assert_eq!(student.person.notes.as_deref(), Some("transferred"));
    assert_eq!(student.secondary.certificate_year_id, Some(20));
    assert_eq!(student.secondary.study_group_id, Some(3));
    assert_eq!(student.secondary.seat_number.as_deref(), Some("123456"));
    assert_eq!(student.secondary.equivalent_total, None);
    assert_eq!(student.enrollment.faculty_id, Some(7));
    assert_eq!(student.enrollment.university_id, Some(1));
    assert_eq!(student.enrollment.enroll_semester_id, Some(1));
    assert_eq!(student.enrollment.enroll_stage_id, Some(1));
    assert_eq!(student.enrollment.level_id, None);
    assert_eq!(student.modified_by, Some(5));
    assert_eq!(student.transfer_actor(), 0);

    assert!(normalized.messages.iter().any(|m| m.contains("DB Entry")));
    assert!(normalized.messages.iter().any(|m| m.contains("letters only")));
  }

  #[test]
  fn bad_national_id_and_phone_are_dropped() {
    let mut value = raw();
    value["student"]["studentNID"] = json!("123");
    value["student"]["studentPhone"] = json!("call me");
    let normalized = run(&value);
    let student = normalized.student.unwrap();
    assert_eq!(student.person.national_id, None);
    assert_eq!(student.person.phone, None);
    assert!(normalized.messages.contains(&"Invalid national id, found 123 and set to null".into()));
  }

  #[test]
  fn unknown_ids_block_the_record() {
    let mut value = raw();
    value["secondaryEdu"]["certificateYear_id"] = json!("1999");
    let normalized = run(&value);
    assert!(normalized.is_blocked());
    assert!(normalized.messages.iter().any(|m| {
      m == "Invalid id, `secondaryEdu.certificateYear_id` does not exist in the council"
    }));
  }

  #[test]
  fn status_is_required_and_must_be_known() {
    let mut value = raw();
    value["studentUniversityEdu"]["AcceptanceStatus"] = json!("");
    assert!(run(&value).is_blocked());

    value["studentUniversityEdu"]["AcceptanceStatus"] = json!("99");
    let normalized = run(&value);
    assert!(normalized.is_blocked());
    assert!(normalized.messages.iter().any(|m| m.starts_with("Invalid acceptance status")));
  }

  #[test]
  fn transfers_carry_a_transfer_date_and_actor() {
    let mut value = raw();
    value["studentUniversityEdu"]["RegistrationTypeID"] = json!("-1");
    value["studentUniversityEdu"]["ModifiedDate"] = json!("2024-08-01T16:00:00");
    value["studentUniversityEdu"]["OriginalFacultyID"] = json!("80");
    value["studentUniversityEdu"]["OriginalUniID"] = json!("20");
    value["studentUniversityEdu"]["OriginalUniName"] = json!("Old University");
    let student = run(&value).student.unwrap();

    assert_eq!(student.enrollment.transfer_date, NaiveDate::from_ymd_opt(2024, 8, 1));
    assert_eq!(student.enrollment.registration_type_id, Some(3));
    assert_eq!(student.transfer_actor(), 5);
    assert_eq!(student.original_faculty_id, Some(8));
    assert_eq!(student.original_university_id, Some(2));
    assert_eq!(student.person.notes.as_deref(), Some("transferred\nOld University"));
  }

  #[test]
  fn missing_degree_for_general_secondary_is_a_warning() {
    let mut value = raw();
    value["secondaryEdu"]["studentTotalDegree"] = json!("0");
    let normalized = run(&value);
    assert!(!normalized.is_blocked());
    assert!(normalized.messages.iter().any(|m| m.starts_with("Missing total degree")));
  }

  #[test]
  fn stages_map_to_semester_and_stage() {
    assert_eq!(map_stage(1), Some((1, 1)));
    assert_eq!(map_stage(7), Some((1, 1)));
    assert_eq!(map_stage(4), Some((2, 1)));
    assert_eq!(map_stage(26), Some((2, 6)));
    assert_eq!(map_stage(27), None);
  }

  #[test]
  fn timestamps_in_several_shapes() {
    let expected = NaiveDate::from_ymd_opt(2024, 8, 1).unwrap().and_hms_opt(10, 0, 0).unwrap().and_utc();
    assert_eq!(parse_timestamp("2024-08-01T10:00:00"), Some(expected));
    assert_eq!(parse_timestamp("2024-08-01 10:00:00.000"), Some(expected));
    assert_eq!(parse_timestamp("2024-08-01T12:00:00+02:00"), Some(expected));
    assert_eq!(parse_timestamp("2024-08-01").map(|at| at.date_naive()), Some(expected.date_naive()));
    assert_eq!(parse_timestamp("yesterday"), None);
  }
}
