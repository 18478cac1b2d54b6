//! Reference (lookup) data and the per-batch [`ExternalIdentifierMap`].
//!
//! Each lookup row carries the token the intake feed uses for it and the
//! token the old council used. A row may answer to several tokens, written
//! as `"12|13"`.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString};

/// A reference dimension (one lookup table).
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
  EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Dimension {
  Faculty,
  University,
  Year,
  Semester,
  Stage,
  Certificate,
  Gender,
  /// Nationalities, governorates and birth places.
  Region,
  Religion,
  RegistrationType,
  SchoolType,
  StudyGroup,
  Grade,
  Status,
  User,
}

/// Which external system's tokens to key a map on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeySource {
  Intake,
  OldCouncil,
}

/// One row of a lookup table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReferenceRow {
  pub dimension:       Dimension,
  pub id:              i64,
  #[serde(default)]
  pub name:            String,
  #[serde(default)]
  pub intake_key:      Option<String>,
  #[serde(default)]
  pub old_council_key: Option<String>,
  /// Year and semester code, e.g. `"2024"`.
  #[serde(default)]
  pub code:            Option<String>,
  /// Marks the current year and semester.
  #[serde(default)]
  pub is_current:      bool,
  /// Faculties only.
  #[serde(default)]
  pub university_id:   Option<i64>,
  /// Faculties only: the faculty-name (discipline family) id.
  #[serde(default)]
  pub family_id:       Option<i64>,
}

impl ReferenceRow {
  pub fn new(dimension: Dimension, id: i64) -> Self {
    Self {
      dimension,
      id,
      name: String::new(),
      intake_key: None,
      old_council_key: None,
      code: None,
      is_current: false,
      university_id: None,
      family_id: None,
    }
  }

  pub fn key(&self, source: KeySource) -> Option<&str> {
    match source {
      KeySource::Intake => self.intake_key.as_deref(),
      KeySource::OldCouncil => self.old_council_key.as_deref(),
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Faculty {
  pub id:            i64,
  pub university_id: Option<i64>,
  pub family_id:     Option<i64>,
}

/// The academic year and semester currently accepting students.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcademicPeriod {
  pub year_code:     String,
  pub semester_code: String,
}

// ─── Identifier map ──────────────────────────────────────────────────────────

/// External token → local id, per dimension. Built once per batch and only
/// read afterwards.
#[derive(Debug, Clone, Default)]
pub struct ExternalIdentifierMap {
  tokens: HashMap<Dimension, HashMap<String, i64>>,
}

impl ExternalIdentifierMap {
  pub fn build<'a>(
    rows: impl IntoIterator<Item = &'a ReferenceRow>,
    source: KeySource,
  ) -> Self {
    let mut tokens: HashMap<Dimension, HashMap<String, i64>> = HashMap::new();
    for row in rows {
      let Some(key) = row.key(source) else { continue };
      let dimension = tokens.entry(row.dimension).or_default();
      for token in key.split('|').map(str::trim).filter(|t| !t.is_empty()) {
        dimension.entry(token.to_owned()).or_insert(row.id);
      }
    }
    Self { tokens }
  }

  pub fn resolve(&self, dimension: Dimension, token: &str) -> Option<i64> {
    self.tokens.get(&dimension)?.get(token.trim()).copied()
  }

  pub fn len(&self) -> usize { self.tokens.values().map(HashMap::len).sum() }

  pub fn is_empty(&self) -> bool { self.len() == 0 }
}
