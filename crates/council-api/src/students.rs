//! Handlers for `/students` endpoints.
//!
//! | Method   | Path | Notes |
//! |----------|------|-------|
//! | `POST`   | `/students/send` | Body: `{"students": [...]}`; one outcome per record |
//! | `POST`   | `/students/withdraw` | Body: `{"students": ["<external id>", ...]}` |
//! | `DELETE` | `/students/repeated-records` | Removes older duplicates |
//! | `GET`    | `/students/:unique_id/transactions` | Log entries, oldest first |
//! | `POST`   | `/students/:id/transactions/:transaction_id/revert` | Body: `{"actorId": n}` |

use axum::{
  Json,
  extract::{Path, State},
};
use council_core::{store::StudentStore, student::StudentId};
use council_ingest::{CleanupReport, RecordOutcome, audit::HistoryEntry, audit::RevertReport};
use serde::Deserialize;
use serde_json::Value;

use crate::{ApiState, Reply, body, error::ApiError};

// ─── Intake ───────────────────────────────────────────────────────────────────

/// `POST /students/send`
pub async fn send<S: StudentStore, L>(
  State(state): State<ApiState<S, L>>,
  Json(body): Json<Value>,
) -> Result<Json<Reply<Vec<RecordOutcome>>>, ApiError> {
  let records = body::list(&body, "students")?;
  let outcomes = state.ingestor().submit(records).await?;
  Ok(Json(Reply::ok(outcomes)))
}

/// `POST /students/withdraw`
pub async fn withdraw<S: StudentStore, L>(
  State(state): State<ApiState<S, L>>,
  Json(body): Json<Value>,
) -> Result<Json<Reply<Vec<RecordOutcome>>>, ApiError> {
  let ids: Vec<String> = body::list(&body, "students")?.iter().map(body::token).collect();
  let outcomes = state.ingestor().withdraw(&ids).await?;
  Ok(Json(Reply::ok(outcomes)))
}

/// `DELETE /students/repeated-records`
pub async fn remove_repeated<S: StudentStore, L>(
  State(state): State<ApiState<S, L>>,
) -> Result<Json<Reply<CleanupReport>>, ApiError> {
  let report = state.ingestor().remove_repeated_records().await?;
  Ok(Json(Reply::ok(report)))
}

// ─── Audit ────────────────────────────────────────────────────────────────────

/// `GET /students/:unique_id/transactions`
///
/// An unknown unique id yields an empty list.
pub async fn transactions<S: StudentStore, L>(
  State(state): State<ApiState<S, L>>,
  Path(unique_id): Path<String>,
) -> Result<Json<Reply<Vec<HistoryEntry>>>, ApiError> {
  let history = state.ingestor().history(&unique_id).await?;
  Ok(Json(Reply::ok(history)))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RevertBody {
  /// Local user id recorded as the revert's author.
  pub actor_id: i64,
}

/// `POST /students/:id/transactions/:transaction_id/revert`
pub async fn revert<S: StudentStore, L>(
  State(state): State<ApiState<S, L>>,
  Path((student_id, transaction_id)): Path<(StudentId, i64)>,
  Json(body): Json<RevertBody>,
) -> Result<Json<Reply<RevertReport>>, ApiError> {
  let report = state.ingestor().revert(student_id, transaction_id, body.actor_id).await?;
  Ok(Json(Reply::ok(report)))
}
