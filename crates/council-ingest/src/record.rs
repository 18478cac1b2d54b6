//! Structural parsing of one incoming record.
//!
//! A record is a JSON object with three groups (person, secondary education,
//! acceptance). Field values are loosely typed: ids may arrive as numbers or
//! strings, blanks mean "absent".

use serde_json::{Map, Value};

/// The three logical groups of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Group {
  Person,
  Secondary,
  Acceptance,
}

/// The key names a source uses for the three groups. The first name of each
/// list is the one used in messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordLayout {
  pub person:     &'static [&'static str],
  pub secondary:  &'static [&'static str],
  pub acceptance: &'static [&'static str],
}

impl RecordLayout {
  pub const INTAKE: Self = Self {
    person:     &["student", "person"],
    secondary:  &["studentEdu", "secondaryEdu"],
    acceptance: &["studentAcceptance", "acceptance"],
  };

  pub const LEGACY: Self = Self {
    person:     &["student"],
    secondary:  &["secondaryEdu"],
    acceptance: &["studentUniversityEdu"],
  };

  fn names(&self, group: Group) -> &'static [&'static str] {
    match group {
      Group::Person => self.person,
      Group::Secondary => self.secondary,
      Group::Acceptance => self.acceptance,
    }
  }

  pub fn label(&self, group: Group) -> &'static str { self.names(group)[0] }
}

/// The record is not an object holding all three groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Malformed {
  /// Whatever id could be salvaged, for the report.
  pub external_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncomingRecord {
  pub layout:      RecordLayout,
  pub person:      Map<String, Value>,
  pub secondary:   Map<String, Value>,
  pub acceptance:  Map<String, Value>,
  /// `person.id`, or the top-level `externalId`.
  pub external_id: Option<String>,
}

impl IncomingRecord {
  pub fn parse(value: &Value, layout: RecordLayout) -> Result<Self, Malformed> {
    let Value::Object(root) = value else {
      return Err(Malformed { external_id: None });
    };

    let group = |names: &[&str]| {
      names.iter().find_map(|name| match root.get(*name) {
        Some(Value::Object(map)) => Some(map.clone()),
        _ => None,
      })
    };
    let person = group(layout.person);
    let external_id = person
      .as_ref()
      .and_then(|p| p.get("id"))
      .or_else(|| root.get("externalId"))
      .and_then(value_text);

    match (person, group(layout.secondary), group(layout.acceptance)) {
      (Some(person), Some(secondary), Some(acceptance)) => Ok(Self {
        layout,
        person,
        secondary,
        acceptance,
        external_id,
      }),
      _ => Err(Malformed { external_id }),
    }
  }

  pub fn group(&self, group: Group) -> &Map<String, Value> {
    match group {
      Group::Person => &self.person,
      Group::Secondary => &self.secondary,
      Group::Acceptance => &self.acceptance,
    }
  }

  pub fn group_mut(&mut self, group: Group) -> &mut Map<String, Value> {
    match group {
      Group::Person => &mut self.person,
      Group::Secondary => &mut self.secondary,
      Group::Acceptance => &mut self.acceptance,
    }
  }

  pub fn raw(&self, group: Group, key: &str) -> Option<&Value> { self.group(group).get(key) }

  /// The field as trimmed text; `None` when absent, null or blank.
  pub fn text(&self, group: Group, key: &str) -> Option<String> {
    self.raw(group, key).and_then(value_text)
  }

  /// A boolean-ish flag (`true`, `1`, `"1"`, `"true"`).
  pub fn flag(&self, group: Group, key: &str) -> bool {
    match self.raw(group, key) {
      Some(Value::Bool(b)) => *b,
      Some(Value::Number(n)) => n.as_i64().is_some_and(|n| n != 0),
      Some(Value::String(s)) => matches!(s.trim().to_ascii_lowercase().as_str(), "1" | "true"),
      _ => false,
    }
  }

  pub fn set(&mut self, group: Group, key: &str, value: Option<String>) {
    let value = value.map_or(Value::Null, Value::String);
    self.group_mut(group).insert(key.to_owned(), value);
  }

  /// `"<group label>.<key>"`, as used in messages.
  pub fn field_label(&self, group: Group, key: &str) -> String {
    format!("{}.{key}", self.layout.label(group))
  }
}

/// Scalar JSON value as trimmed text. Blank strings count as absent.
pub fn value_text(value: &Value) -> Option<String> {
  match value {
    Value::String(s) => {
      let s = s.trim();
      (!s.is_empty()).then(|| s.to_owned())
    }
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn intake_groups_accept_aliases() {
    let record = IncomingRecord::parse(
      &json!({
        "externalId": 12345,
        "person": { "studentNID": "29001010123456" },
        "secondaryEdu": { "studentSecondaryCert_id": 1 },
        "acceptance": { "fac_id": "A1" },
      }),
      RecordLayout::INTAKE,
    )
    .unwrap();
    assert_eq!(record.external_id.as_deref(), Some("12345"));
    assert_eq!(record.text(Group::Secondary, "studentSecondaryCert_id").as_deref(), Some("1"));
    assert_eq!(record.field_label(Group::Acceptance, "fac_id"), "studentAcceptance.fac_id");
  }

  #[test]
  fn person_id_wins_over_top_level_id() {
    let record = IncomingRecord::parse(
      &json!({
        "externalId": "1",
        "student": { "id": " 2 " },
        "studentEdu": {},
        "studentAcceptance": {},
      }),
      RecordLayout::INTAKE,
    )
    .unwrap();
    assert_eq!(record.external_id.as_deref(), Some("2"));
  }

  #[test]
  fn missing_group_is_malformed_but_keeps_the_id() {
    let err = IncomingRecord::parse(
      &json!({ "student": { "id": "9" }, "studentEdu": {} }),
      RecordLayout::INTAKE,
    )
    .unwrap_err();
    assert_eq!(err.external_id.as_deref(), Some("9"));

    let err = IncomingRecord::parse(&json!(["not", "an", "object"]), RecordLayout::INTAKE)
      .unwrap_err();
    assert_eq!(err, Malformed { external_id: None });

    // A group must be an object.
    assert!(
      IncomingRecord::parse(
        &json!({ "student": {}, "studentEdu": [], "studentAcceptance": {} }),
        RecordLayout::INTAKE
      )
      .is_err()
    );
  }

  #[test]
  fn legacy_layout_uses_its_own_names() {
    let value = json!({ "student": {}, "secondaryEdu": {}, "studentUniversityEdu": {} });
    assert!(IncomingRecord::parse(&value, RecordLayout::LEGACY).is_ok());
    assert!(IncomingRecord::parse(&value, RecordLayout::INTAKE).is_err());
  }

  #[test]
  fn blank_values_are_absent() {
    let record = IncomingRecord::parse(
      &json!({
        "student": { "studentPhone": "  ", "manualAddition": "1" },
        "studentEdu": {},
        "studentAcceptance": { "manualAddition": true },
      }),
      RecordLayout::INTAKE,
    )
    .unwrap();
    assert_eq!(record.text(Group::Person, "studentPhone"), None);
    assert!(record.flag(Group::Acceptance, "manualAddition"));
    assert!(record.flag(Group::Person, "manualAddition"));
    assert!(!record.flag(Group::Secondary, "manualAddition"));
  }
}
