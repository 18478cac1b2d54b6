//! Business and field validation of intake records.
//!
//! [`screen`] runs the identity checks (nationality, national id, passport),
//! the degree checks and the per-group rule sets, collecting every issue
//! instead of stopping at the first.

use chrono::{Months, NaiveDate};
use serde_json::Value;

use crate::{
  outcome::{Issue, OutcomeCode},
  patterns::{
    EMAIL, INTEGER, ISO_DATE, LETTERS_ONLY, NATIONAL_ID, PHONE, TOTAL_DEGREE, collapse_spaces,
    is_arabic_letter,
  },
  record::{Group, IncomingRecord},
  rules::{self, Check, Rule},
  settings::IngestSettings,
};

pub struct ScreenContext<'a> {
  pub settings:          &'a IngestSettings,
  pub today:             NaiveDate,
  /// Local id the record's certificate token maps to.
  pub certificate_id:    Option<i64>,
  /// Another student already holds the record's national id.
  pub national_id_taken: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Screening {
  pub issues:    Vec<Issue>,
  /// The name as it will be stored.
  pub full_name: String,
}

impl Screening {
  pub fn is_clean(&self) -> bool { self.issues.is_empty() }
}

/// Whether the record registers an incoming (foreign-programme) student.
pub fn is_incoming(record: &IncomingRecord, settings: &IngestSettings) -> bool {
  record.text(Group::Acceptance, "registrationType").as_deref()
    == Some(settings.incoming_registration_token.as_str())
}

/// Strip leading and trailing non-Arabic characters and collapse spaces.
pub fn clean_name(raw: &str) -> String {
  collapse_spaces(raw.trim_matches(|c: char| !is_arabic_letter(c)))
}

pub fn screen(record: &IncomingRecord, cx: &ScreenContext<'_>) -> Screening {
  let incoming = is_incoming(record, cx.settings);
  let mut issues = Vec::new();

  identity_issues(record, cx, incoming, &mut issues);
  degree_issues(record, cx, &mut issues);

  let full_name = clean_name(&record.text(Group::Person, "studentNameAr").unwrap_or_default());
  let name = Value::String(full_name.clone());
  let min_words = if incoming { 2 } else { 4 };

  let mut rules = name_rules(record, &name, min_words);
  rules.extend(person_rules(record, cx));
  rules.extend(secondary_rules(record));
  rules.extend(acceptance_rules(record));
  issues.extend(rules::run(&rules));

  Screening { issues, full_name }
}

/// Only the acceptance group; used when a shift or re-enrolment touches
/// nothing but the enrollment.
pub fn screen_acceptance(record: &IncomingRecord) -> Vec<Issue> {
  rules::run(&acceptance_rules(record))
}

fn identity_issues(
  record: &IncomingRecord,
  cx: &ScreenContext<'_>,
  incoming: bool,
  issues: &mut Vec<Issue>,
) {
  let nationality = record
    .text(Group::Person, "studentNationality_id")
    .and_then(|n| n.parse::<i64>().ok());
  let Some(nationality) = nationality else {
    issues.push(Issue::of(OutcomeCode::MissingNationality));
    return;
  };

  let national_id = record.text(Group::Person, "studentNID");
  let passport = record.text(Group::Person, "studentPassport");
  let domestic = nationality == cx.settings.domestic_nationality_id;

  if domestic && national_id.is_none() {
    issues.push(Issue::of(OutcomeCode::MissingNationalId));
  } else if !domestic && passport.is_none() {
    issues.push(Issue::of(OutcomeCode::MissingPassport));
  }

  let Some(national_id) = national_id else { return };
  if cx.national_id_taken {
    issues.push(Issue::of(OutcomeCode::NationalIdExists));
  }
  if !incoming && !NATIONAL_ID.is_match(&national_id) {
    issues.push(Issue::new(
      OutcomeCode::Validation,
      format!("Invalid national id, found `{national_id}`"),
    ));
  }
}

fn degree_issues(record: &IncomingRecord, cx: &ScreenContext<'_>, issues: &mut Vec<Issue>) {
  if record.text(Group::Secondary, "studentSecondaryCert_id").is_none() {
    issues.push(Issue::of(OutcomeCode::MissingCertificate));
  } else if cx.settings.is_general_secondary(cx.certificate_id) {
    if record.text(Group::Secondary, "studentTot").is_none() {
      issues.push(Issue::of(OutcomeCode::MissingTotal));
    }
  } else if record.text(Group::Secondary, "studentEquivTotscienceB").is_none() {
    issues.push(Issue::of(OutcomeCode::MissingEquivalentTotal));
  }
}

// ─── Rule sets ───────────────────────────────────────────────────────────────

fn name_rules<'a>(record: &IncomingRecord, name: &'a Value, min_words: usize) -> Vec<Rule<'a>> {
  let field = record.field_label(Group::Person, "studentNameAr");
  vec![
    Rule::new(&field, Some(name), Check::Required),
    Rule::new(&field, Some(name), Check::Matches(&LETTERS_ONLY))
      .message("Invalid student name, name must contain letters only"),
    Rule::new(&field, Some(name), Check::MaxLength(100))
      .message("Invalid student name, name must not exceed 100 letters"),
    Rule::new(&field, Some(name), Check::MinWords(min_words))
      .message(format!("Invalid student name, name must have at least {min_words} words")),
  ]
}

fn person_rules<'a>(record: &'a IncomingRecord, cx: &ScreenContext<'_>) -> Vec<Rule<'a>> {
  let field = |key: &'static str| (record.field_label(Group::Person, key), record.raw(Group::Person, key));
  let oldest_birth_day = cx
    .today
    .checked_sub_months(Months::new(12 * cx.settings.minimum_age_years))
    .unwrap_or(NaiveDate::MIN);

  let (passport, passport_value) = field("studentPassport");
  let (mail, mail_value) = field("studentMail");
  let (phone, phone_value) = field("studentPhone");
  let (address, address_value) = field("studentAddress");
  let (birth, birth_value) = field("studentBirthDate");

  vec![
    Rule::new(passport, passport_value, Check::MaxLength(20)),
    Rule::new(&mail, mail_value, Check::MaxLength(50)),
    Rule::new(mail, mail_value, Check::Matches(&EMAIL)).message("Invalid student email address"),
    Rule::new(phone, phone_value, Check::Matches(&PHONE)).message("Invalid student phone number"),
    Rule::new(address, address_value, Check::MaxLength(250)),
    Rule::new(&birth, birth_value, Check::Matches(&ISO_DATE)),
    Rule::new(birth, birth_value, Check::DateNotAfter(oldest_birth_day)).message(format!(
      "Invalid birth date, student must be at least {} years old",
      cx.settings.minimum_age_years
    )),
  ]
}

fn secondary_rules(record: &IncomingRecord) -> Vec<Rule<'_>> {
  let rule = |key: &'static str, check: Check| {
    Rule::new(record.field_label(Group::Secondary, key), record.raw(Group::Secondary, key), check)
  };
  let mut rules = vec![
    rule("studentSchool", Check::MaxLength(200)),
    rule("studentDept", Check::MaxLength(200)),
    rule("studentSeatNumber", Check::MaxLength(9)),
    rule("studentSeatNumber", Check::Matches(&INTEGER)),
  ];
  for key in ["studentTot", "studentEquivTotscienceB", "studentSportDegree", "studentComplainGain"] {
    rules.push(rule(key, Check::Matches(&TOTAL_DEGREE)).message(format!(
      "Invalid `{}`, must be a number with at most 3 integer and 3 fraction digits",
      record.field_label(Group::Secondary, key)
    )));
  }
  rules
}

fn acceptance_rules(record: &IncomingRecord) -> Vec<Rule<'_>> {
  let rule = |key: &'static str, check: Check| {
    Rule::new(record.field_label(Group::Acceptance, key), record.raw(Group::Acceptance, key), check)
  };
  vec![
    rule("accept_studentTot", Check::Present),
    rule("manualAddition", Check::Present),
    rule("accept_createdBy", Check::Present),
    rule("accept_createdAt", Check::Present),
    rule("accept_createdAt", Check::Matches(&ISO_DATE)),
  ]
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::record::RecordLayout;

  fn record(person: Value, secondary: Value, acceptance: Value) -> IncomingRecord {
    IncomingRecord::parse(
      &json!({ "student": person, "studentEdu": secondary, "studentAcceptance": acceptance }),
      RecordLayout::INTAKE,
    )
    .unwrap()
  }

  fn acceptance() -> Value {
    json!({
      "fac_id": "A1",
      "registrationType": "1",
      "accept_studentTot": "320",
      "manualAddition": false,
      "accept_createdBy": "admin",
      "accept_createdAt": "2024-08-01T10:00:00",
    })
  }

  fn cx(settings: &IngestSettings) -> ScreenContext<'_> {
    ScreenContext {
      settings,
      today: NaiveDate::from_ymd_opt(2024, 8, 15).unwrap(),
      certificate_id: Some(1),
      national_id_taken: false,
    }
  }

  #[test]
  fn clean_record_has_no_issues() {
    let settings = IngestSettings::default();
    let screening = screen(
      &record(
        json!({
          "id": "12345",
          "studentNameAr": " 1محمد احمد  علي حسن. ",
          "studentNID": "29001010123456",
          "studentNationality_id": "1",
          "studentBirthDate": "2006-01-01",
        }),
        json!({ "studentSecondaryCert_id": "GS", "studentTot": "320", "studentSeatNumber": 123456 }),
        acceptance(),
      ),
      &cx(&settings),
    );
    assert_eq!(screening.issues, vec![]);
    assert_eq!(screening.full_name, "محمد احمد علي حسن");
  }

  #[test]
  fn identity_checks() {
    let settings = IngestSettings::default();
    let edu = json!({ "studentSecondaryCert_id": "GS", "studentTot": "320" });

    let no_nationality = screen(&record(json!({}), edu.clone(), acceptance()), &cx(&settings));
    assert_eq!(no_nationality.issues[0].code, 32);

    let domestic = screen(
      &record(json!({ "studentNationality_id": 1 }), edu.clone(), acceptance()),
      &cx(&settings),
    );
    assert_eq!(domestic.issues[0].code, 33);

    let foreign = screen(
      &record(json!({ "studentNationality_id": "7" }), edu.clone(), acceptance()),
      &cx(&settings),
    );
    assert_eq!(foreign.issues[0].code, 34);

    let mut taken = cx(&settings);
    taken.national_id_taken = true;
    let duplicate = screen(
      &record(
        json!({ "studentNationality_id": "1", "studentNID": "123" }),
        edu.clone(),
        acceptance(),
      ),
      &taken,
    );
    let codes: Vec<u16> = duplicate.issues.iter().map(|i| i.code).collect();
    assert_eq!(&codes[..2], &[30, 40]);
  }

  #[test]
  fn incoming_students_skip_the_national_id_pattern_and_need_two_names() {
    let settings = IngestSettings::default();
    let mut accept = acceptance();
    accept["registrationType"] = json!("332");
    let screening = screen(
      &record(
        json!({
          "studentNameAr": "محمد احمد",
          "studentNID": "A-1",
          "studentNationality_id": "1",
        }),
        json!({ "studentSecondaryCert_id": "GS", "studentTot": "320" }),
        accept,
      ),
      &cx(&settings),
    );
    assert_eq!(screening.issues, vec![]);
  }

  #[test]
  fn degree_requirements_follow_the_certificate() {
    let settings = IngestSettings::default();
    let person = json!({
      "studentNameAr": "محمد احمد علي حسن",
      "studentNID": "29001010123456",
      "studentNationality_id": "1",
    });

    let missing_cert = screen(&record(person.clone(), json!({}), acceptance()), &cx(&settings));
    assert_eq!(missing_cert.issues[0].code, 35);

    let gs = screen(
      &record(person.clone(), json!({ "studentSecondaryCert_id": "GS" }), acceptance()),
      &cx(&settings),
    );
    assert_eq!(gs.issues[0].code, 36);

    let mut other = cx(&settings);
    other.certificate_id = Some(9);
    let equivalent = screen(
      &record(person, json!({ "studentSecondaryCert_id": "IG", "studentTot": "320" }), acceptance()),
      &other,
    );
    assert_eq!(equivalent.issues[0].code, 37);
  }

  #[test]
  fn rule_violations_are_collected() {
    let settings = IngestSettings::default();
    let screening = screen(
      &record(
        json!({
          "studentNameAr": "محمد احمد",
          "studentNID": "29001010123456",
          "studentNationality_id": "1",
          "studentMail": "not-an-email",
          "studentBirthDate": "2020-01-01",
        }),
        json!({ "studentSecondaryCert_id": "GS", "studentTot": "3200", "studentSeatNumber": "12ab" }),
        json!({ "fac_id": "A1" }),
      ),
      &cx(&settings),
    );
    let messages: Vec<&str> = screening.issues.iter().map(|i| i.message.as_str()).collect();
    assert!(messages.iter().any(|m| m.contains("at least 4 words")));
    assert!(messages.contains(&"Invalid student email address"));
    assert!(messages.iter().any(|m| m.contains("at least 10 years old")));
    assert!(messages.iter().any(|m| m.contains("studentEdu.studentTot")));
    assert!(messages.iter().any(|m| m.contains("studentEdu.studentSeatNumber")));
    assert!(messages.contains(&"`studentAcceptance.accept_createdAt` must be present"));
    assert!(screening.issues.iter().all(|i| i.code == 40));
  }

  #[test]
  fn acceptance_only_screening() {
    let incomplete = record(json!({}), json!({}), json!({ "fac_id": "A1" }));
    assert_eq!(screen_acceptance(&incomplete).len(), 4);
    let complete = record(json!({}), json!({}), acceptance());
    assert!(screen_acceptance(&complete).is_empty());
  }
}
