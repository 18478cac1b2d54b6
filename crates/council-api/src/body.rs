//! Loose request-body helpers. Callers send ids as strings or numbers.

use serde_json::Value;

use crate::error::ApiError;

/// The array under `key`. Anything else is a bad request.
pub(crate) fn list<'a>(body: &'a Value, key: &str) -> Result<&'a [Value], ApiError> {
  match body.get(key) {
    Some(Value::Array(items)) => Ok(items),
    _ => Err(ApiError::BadRequest(format!("Invalid data format, `{key}` must be a list"))),
  }
}

/// An id token as text. Non-scalar values become blank.
pub(crate) fn token(value: &Value) -> String {
  match value {
    Value::String(s) => s.clone(),
    Value::Number(n) => n.to_string(),
    _ => String::new(),
  }
}

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn list_requires_an_array() {
    let body = json!({ "students": [1, "2"], "other": {} });
    assert_eq!(list(&body, "students").unwrap().len(), 2);
    assert!(list(&body, "other").is_err());
    assert!(list(&body, "missing").is_err());
  }

  #[test]
  fn tokens_accept_strings_and_numbers() {
    assert_eq!(token(&json!("E1")), "E1");
    assert_eq!(token(&json!(1234)), "1234");
    assert_eq!(token(&json!(null)), "");
    assert_eq!(token(&json!(["E1"])), "");
  }
}
