//! Tunables of the engine. Every field has a default so a partial
//! configuration file is enough.

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestSettings {
  pub reservation_ttl_secs:             u64,
  /// Days after a path-shift during which the student cannot be shifted or
  /// updated again.
  pub path_shift_cool_down_days:        i64,
  /// Groups of faculty-name ids that count as the same family.
  pub interchangeable_faculty_families: Vec<Vec<i64>>,
  /// Local certificate id of the general secondary certificate.
  pub general_secondary_certificate_id: i64,
  /// Nationality token of domestic students.
  pub domestic_nationality_id:          i64,
  /// Intake registration-type token of incoming (foreign) students.
  pub incoming_registration_token:      String,
  /// Local registration type given to shifted and re-enrolled students.
  pub primary_registration_type_id:     i64,
  pub minimum_age_years:                u32,
}

impl Default for IngestSettings {
  fn default() -> Self {
    Self {
      reservation_ttl_secs:             60 * 60,
      path_shift_cool_down_days:        90,
      interchangeable_faculty_families: vec![vec![2, 12]],
      general_secondary_certificate_id: 1,
      domestic_nationality_id:          1,
      incoming_registration_token:      "332".into(),
      primary_registration_type_id:     1,
      minimum_age_years:                10,
    }
  }
}

impl IngestSettings {
  pub fn reservation_ttl(&self) -> Duration { Duration::from_secs(self.reservation_ttl_secs) }

  /// Whether two faculty-name ids belong to the same family.
  pub fn same_family(&self, a: Option<i64>, b: Option<i64>) -> bool {
    if a == b {
      return true;
    }
    let (Some(a), Some(b)) = (a, b) else { return false };
    self
      .interchangeable_faculty_families
      .iter()
      .any(|group| group.contains(&a) && group.contains(&b))
  }

  pub fn is_general_secondary(&self, certificate_id: Option<i64>) -> bool {
    certificate_id == Some(self.general_secondary_certificate_id)
  }
}

/// Where the old council serves its per-faculty student dumps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacySettings {
  /// Must contain `{faculty_id}`.
  pub url_template: String,
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 30 }

impl LegacySettings {
  pub fn url_for(&self, faculty_key: &str) -> String {
    self.url_template.replace("{faculty_id}", faculty_key)
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn families_are_interchangeable_only_within_a_group() {
    let settings = IngestSettings::default();
    assert!(settings.same_family(Some(2), Some(12)));
    assert!(settings.same_family(Some(12), Some(2)));
    assert!(settings.same_family(Some(5), Some(5)));
    assert!(!settings.same_family(Some(2), Some(5)));
    assert!(!settings.same_family(Some(2), None));
    assert!(settings.same_family(None, None));
  }

  #[test]
  fn partial_config_keeps_defaults() {
    let settings: IngestSettings =
      serde_json::from_str(r#"{ "path_shift_cool_down_days": 30 }"#).unwrap();
    assert_eq!(settings.path_shift_cool_down_days, 30);
    assert_eq!(settings.incoming_registration_token, "332");
    assert_eq!(settings.reservation_ttl(), Duration::from_secs(3600));
  }

  #[test]
  fn legacy_url_is_filled_in() {
    let legacy: LegacySettings =
      serde_json::from_str(r#"{ "url_template": "http://old/students/{faculty_id}" }"#).unwrap();
    assert_eq!(legacy.url_for("17"), "http://old/students/17");
    assert_eq!(legacy.timeout(), Duration::from_secs(30));
  }
}
