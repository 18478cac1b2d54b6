//! Async HTTP client wrapping the council JSON API.

use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use council_ingest::{RecordOutcome, legacy::MigrationMode};
use reqwest::{Client, RequestBuilder, Response};
use serde::{Deserialize, de::DeserializeOwned};
use serde_json::{Value, json};
use tracing::debug;

/// Connection settings for the council API.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiConfig {
  pub base_url: String,
  /// Service token sent as `Authorization: Bearer`. Empty sends none.
  pub token:    String,
}

#[derive(Debug, Deserialize)]
struct Reply<T> {
  data: T,
}

/// Async HTTP client for the council JSON API.
///
/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct ApiClient {
  client: Client,
  config: ApiConfig,
}

impl ApiClient {
  pub fn new(config: ApiConfig) -> Result<Self> {
    let client = Client::builder()
      // Migrations wait on the old council, one faculty at a time.
      .timeout(Duration::from_secs(600))
      .build()
      .context("failed to build HTTP client")?;
    Ok(Self { client, config })
  }

  fn url(&self, path: &str) -> String {
    format!("{}/api{}", self.config.base_url.trim_end_matches('/'), path)
  }

  fn auth(&self, req: RequestBuilder) -> RequestBuilder {
    if self.config.token.is_empty() { req } else { req.bearer_auth(&self.config.token) }
  }

  /// Send `req` and unwrap the `data` of the reply envelope.
  async fn call<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T> {
    debug!(%what, "calling council API");
    let resp = self.auth(req).send().await.with_context(|| format!("{what} failed"))?;
    let resp = check(what, resp).await?;
    let reply: Reply<T> =
      resp.json().await.with_context(|| format!("deserialising {what} response"))?;
    Ok(reply.data)
  }

  // ── Intake ────────────────────────────────────────────────────────────────

  /// `POST /api/students/send`
  pub async fn send(&self, students: Vec<Value>) -> Result<Vec<RecordOutcome>> {
    let req = self.client.post(self.url("/students/send")).json(&json!({ "students": students }));
    self.call("POST /students/send", req).await
  }

  /// `POST /api/students/withdraw`
  pub async fn withdraw(&self, external_ids: &[String]) -> Result<Vec<RecordOutcome>> {
    let req =
      self.client.post(self.url("/students/withdraw")).json(&json!({ "students": external_ids }));
    self.call("POST /students/withdraw", req).await
  }

  /// `DELETE /api/students/repeated-records`
  pub async fn cleanup(&self) -> Result<Value> {
    let req = self.client.delete(self.url("/students/repeated-records"));
    self.call("DELETE /students/repeated-records", req).await
  }

  // ── Audit ─────────────────────────────────────────────────────────────────

  /// `GET /api/students/:unique_id/transactions`
  pub async fn history(&self, unique_id: &str) -> Result<Vec<Value>> {
    let req = self.client.get(self.url(&format!("/students/{unique_id}/transactions")));
    self.call("GET /students/:unique_id/transactions", req).await
  }

  /// `POST /api/students/:id/transactions/:transaction_id/revert`
  pub async fn revert(&self, student_id: i64, transaction_id: i64, actor_id: i64) -> Result<Value> {
    let req = self
      .client
      .post(self.url(&format!("/students/{student_id}/transactions/{transaction_id}/revert")))
      .json(&json!({ "actorId": actor_id }));
    self.call("POST /students/:id/transactions/:transaction_id/revert", req).await
  }

  // ── Old council ───────────────────────────────────────────────────────────

  /// `POST /api/old-council/faculties`
  pub async fn migrate(&self, faculty_ids: &[String], mode: MigrationMode) -> Result<Vec<Value>> {
    let req = self
      .client
      .post(self.url("/old-council/faculties"))
      .json(&json!({ "facultiesIds": faculty_ids, "mode": mode }));
    self.call("POST /old-council/faculties", req).await
  }
}

/// Turn a non-2xx response into an error carrying the server's message.
async fn check(what: &str, resp: Response) -> Result<Response> {
  let status = resp.status();
  if status.is_success() {
    return Ok(resp);
  }
  let body = resp.text().await.unwrap_or_default();
  Err(anyhow!("{what} → {status}: {}", error_message(&body)))
}

fn error_message(body: &str) -> String {
  serde_json::from_str::<Value>(body)
    .ok()
    .and_then(|v| v.get("error").and_then(Value::as_str).map(str::to_owned))
    .unwrap_or_else(|| body.trim().to_owned())
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn urls_are_under_api() {
    let client = ApiClient::new(ApiConfig {
      base_url: "http://localhost:8080/".into(),
      token:    String::new(),
    })
    .unwrap();
    assert_eq!(client.url("/students/send"), "http://localhost:8080/api/students/send");
  }

  #[test]
  fn error_message_prefers_the_json_error() {
    assert_eq!(error_message(r#"{"error":"bad request: nope"}"#), "bad request: nope");
    assert_eq!(error_message("Unauthorized\n"), "Unauthorized");
  }
}
