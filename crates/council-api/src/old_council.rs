//! Handler for `POST /old-council/faculties`.
//!
//! Body: `{"facultiesIds": ["<old council faculty id>", ...], "mode": "report" | "store"}`.
//! `mode` defaults to `report`. Answers 503 when no old council is configured.

use axum::{Json, extract::State};
use chrono::Utc;
use council_core::store::StudentStore;
use council_ingest::legacy::{self, FacultyReport, LegacySource, MigrationMode};
use serde_json::Value;

use crate::{ApiState, Reply, body, error::ApiError};

pub async fn migrate<S: StudentStore, L: LegacySource>(
  State(state): State<ApiState<S, L>>,
  Json(body): Json<Value>,
) -> Result<Json<Reply<Vec<FacultyReport>>>, ApiError> {
  let keys: Vec<String> = body::list(&body, "facultiesIds")?.iter().map(body::token).collect();
  let mode = match body.get("mode") {
    None | Some(Value::Null) => MigrationMode::default(),
    Some(mode) => serde_json::from_value(mode.clone())
      .map_err(|_| ApiError::BadRequest("Invalid mode, expected `report` or `store`".into()))?,
  };
  let Some(source) = &state.legacy else {
    return Err(ApiError::Unavailable("old council migration is not configured".into()));
  };

  let reports =
    legacy::migrate(state.store.as_ref(), source.as_ref(), &keys, mode, &state.settings, Utc::now())
      .await?;
  Ok(Json(Reply::ok(reports)))
}
