//! Declarative field rules and the runner that evaluates them.
//!
//! A rule set is plain data: a list of [`Rule`]s built by a function per
//! record group. [`run`] evaluates all of them and reports at most one
//! [`Issue`] per field, so a caller sees every offending field at once.

use std::collections::HashSet;

use chrono::NaiveDate;
use regex::Regex;
use serde_json::Value;

use crate::{
  outcome::{Issue, OutcomeCode},
  record::value_text,
};

#[derive(Debug, Clone, Copy)]
pub enum Check {
  /// Present and not blank.
  Required,
  /// Key present; the value may be blank.
  Present,
  /// At most this many characters.
  MaxLength(usize),
  Matches(&'static Regex),
  /// A `YYYY-MM-DD` date (a time part may follow) on or before the given day.
  DateNotAfter(NaiveDate),
  /// At least this many space-separated words.
  MinWords(usize),
}

#[derive(Debug, Clone)]
pub struct Rule<'a> {
  /// `group.key`, used to report at most one issue per field.
  pub field:   String,
  pub value:   Option<&'a Value>,
  pub check:   Check,
  pub message: String,
}

impl<'a> Rule<'a> {
  pub fn new(field: impl Into<String>, value: Option<&'a Value>, check: Check) -> Self {
    let field = field.into();
    let message = default_message(&field, check);
    Self { field, value, check, message }
  }

  pub fn message(mut self, message: impl Into<String>) -> Self {
    self.message = message.into();
    self
  }

  pub fn passes(&self) -> bool {
    match self.check {
      Check::Required => self.value.and_then(value_text).is_some(),
      Check::Present => self.value.is_some_and(|v| !v.is_null()),
      check => match self.value {
        None | Some(Value::Null) => true,
        Some(value) => match value_text(value) {
          // Blank values are checked by `Required` only.
          None if matches!(value, Value::String(_)) => true,
          None => false,
          Some(text) => passes_on_text(check, &text),
        },
      },
    }
  }
}

fn passes_on_text(check: Check, text: &str) -> bool {
  match check {
    Check::Required | Check::Present => true,
    Check::MaxLength(max) => text.chars().count() <= max,
    Check::Matches(pattern) => pattern.is_match(text),
    Check::DateNotAfter(latest) => parse_date_prefix(text).is_some_and(|d| d <= latest),
    Check::MinWords(min) => text.split_whitespace().count() >= min,
  }
}

/// The `YYYY-MM-DD` prefix of `text` as a date.
pub fn parse_date_prefix(text: &str) -> Option<NaiveDate> {
  let day = text.get(..10)?;
  NaiveDate::parse_from_str(day, "%Y-%m-%d").ok()
}

fn default_message(field: &str, check: Check) -> String {
  match check {
    Check::Required => format!("`{field}` is required"),
    Check::Present => format!("`{field}` must be present"),
    Check::MaxLength(max) => format!("`{field}` must not exceed {max} characters"),
    Check::Matches(_) => format!("`{field}` has an invalid format"),
    Check::DateNotAfter(latest) => format!("`{field}` must be a date on or before {latest}"),
    Check::MinWords(min) => format!("`{field}` must have at least {min} words"),
  }
}

/// Evaluate every rule. Returns one validation issue per failing field, in
/// rule order.
pub fn run(rules: &[Rule<'_>]) -> Vec<Issue> {
  let mut failed: HashSet<&str> = HashSet::new();
  let mut issues = Vec::new();
  for rule in rules {
    if failed.contains(rule.field.as_str()) || rule.passes() {
      continue;
    }
    failed.insert(rule.field.as_str());
    issues.push(Issue::new(OutcomeCode::Validation, rule.message.clone()));
  }
  issues
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;
  use crate::patterns::{INTEGER, ISO_DATE};

  #[test]
  fn required_and_present() {
    let blank = json!("  ");
    let null = Value::Null;
    assert!(!Rule::new("a.b", Some(&blank), Check::Required).passes());
    assert!(!Rule::new("a.b", None, Check::Required).passes());
    assert!(Rule::new("a.b", Some(&blank), Check::Present).passes());
    assert!(!Rule::new("a.b", Some(&null), Check::Present).passes());
    assert!(!Rule::new("a.b", None, Check::Present).passes());
  }

  #[test]
  fn absent_values_pass_format_checks() {
    let blank = json!("");
    assert!(Rule::new("a.b", None, Check::MaxLength(1)).passes());
    assert!(Rule::new("a.b", Some(&blank), Check::Matches(&INTEGER)).passes());
  }

  #[test]
  fn format_checks_apply_to_numbers_too() {
    let number = json!(123456789);
    let long = json!(1234567890);
    assert!(Rule::new("a.seat", Some(&number), Check::MaxLength(9)).passes());
    assert!(!Rule::new("a.seat", Some(&long), Check::MaxLength(9)).passes());
    assert!(Rule::new("a.seat", Some(&number), Check::Matches(&INTEGER)).passes());

    let object = json!({ "nested": true });
    assert!(!Rule::new("a.seat", Some(&object), Check::Matches(&INTEGER)).passes());
  }

  #[test]
  fn length_counts_characters_not_bytes() {
    let name = json!("محمد");
    assert!(Rule::new("a.name", Some(&name), Check::MaxLength(4)).passes());
  }

  #[test]
  fn dates() {
    let cutoff = NaiveDate::from_ymd_opt(2014, 8, 1).unwrap();
    let old = json!("2005-03-02T00:00:00");
    let young = json!("2020-01-01");
    let garbage = json!("2005-02-30");
    assert!(Rule::new("a.d", Some(&old), Check::DateNotAfter(cutoff)).passes());
    assert!(!Rule::new("a.d", Some(&young), Check::DateNotAfter(cutoff)).passes());
    assert!(!Rule::new("a.d", Some(&garbage), Check::DateNotAfter(cutoff)).passes());
    assert!(Rule::new("a.d", Some(&garbage), Check::Matches(&ISO_DATE)).passes());
  }

  #[test]
  fn one_issue_per_field() {
    let value = json!("12a");
    let rules = [
      Rule::new("edu.seat", Some(&value), Check::MaxLength(2)),
      Rule::new("edu.seat", Some(&value), Check::Matches(&INTEGER)),
      Rule::new("edu.total", None, Check::Required).message("total please"),
    ];
    let issues = run(&rules);
    assert_eq!(issues.len(), 2);
    assert_eq!(issues[0].message, "`edu.seat` must not exceed 2 characters");
    assert_eq!(issues[1].message, "total please");
    assert!(issues.iter().all(|i| i.code == 40));
  }
}
