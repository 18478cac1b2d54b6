//! Fetching per-faculty student dumps from the old council.

use std::future::Future;

use reqwest::Client;
use serde_json::Value;
use tracing::debug;

use crate::{error::LegacyError, settings::LegacySettings};

/// Somewhere the old council's records can be read from.
pub trait LegacySource: Send + Sync {
  /// Every student record the old council holds for one faculty.
  fn fetch(
    &self,
    faculty_key: String,
  ) -> impl Future<Output = Result<Vec<Value>, LegacyError>> + Send + '_;
}

/// The old council's HTTP endpoint. Requests are never retried.
#[derive(Debug, Clone)]
pub struct HttpLegacySource {
  client:   Client,
  settings: LegacySettings,
}

impl HttpLegacySource {
  pub fn new(settings: LegacySettings) -> Result<Self, LegacyError> {
    let client = Client::builder()
      .timeout(settings.timeout())
      .build()
      .map_err(|e| LegacyError::Client(e.to_string()))?;
    Ok(Self { client, settings })
  }
}

impl LegacySource for HttpLegacySource {
  async fn fetch(&self, faculty_key: String) -> Result<Vec<Value>, LegacyError> {
    let url = self.settings.url_for(&faculty_key);
    debug!(%url, "fetching old council students");

    let response =
      self.client.get(&url).send().await.map_err(|e| LegacyError::Connection(e.to_string()))?;
    let status = response.status();
    if !status.is_success() {
      return Err(LegacyError::Status(status.as_u16()));
    }
    let body = response.text().await.map_err(|e| LegacyError::Connection(e.to_string()))?;
    students_from_body(&body)
  }
}

/// The `students` array of a `{"students": [...]}` body.
pub fn students_from_body(body: &str) -> Result<Vec<Value>, LegacyError> {
  let value: Value = serde_json::from_str(body).map_err(|e| LegacyError::Json(e.to_string()))?;
  match value {
    Value::Object(mut root) => match root.remove("students") {
      Some(Value::Array(students)) => Ok(students),
      _ => Err(LegacyError::MissingStudents),
    },
    _ => Err(LegacyError::MissingStudents),
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn body_must_hold_a_students_array() {
    let students = students_from_body(r#"{ "students": [{ "student": {} }, {}] }"#).unwrap();
    assert_eq!(students.len(), 2);

    assert!(matches!(students_from_body(r#"{ "students": {} }"#), Err(LegacyError::MissingStudents)));
    assert!(matches!(students_from_body("[]"), Err(LegacyError::MissingStudents)));
    assert!(matches!(students_from_body("<html>"), Err(LegacyError::Json(_))));
  }

  #[test]
  fn client_builds_from_settings() {
    let settings = LegacySettings {
      url_template: "http://old.example/students/{faculty_id}".into(),
      timeout_secs: 5,
    };
    assert!(HttpLegacySource::new(settings).is_ok());
  }
}
