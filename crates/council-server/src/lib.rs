//! Deployable HTTP server for the council engine.
//!
//! Wires configuration, service-token authentication and request tracing
//! around the [`council_api`] router.

pub mod auth;
pub mod error;

pub use error::Error;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use axum::{Router, middleware, routing::get};
use council_api::ApiState;
use council_core::{reference::ReferenceRow, store::StudentStore};
use council_ingest::{IngestSettings, LegacySettings, legacy::LegacySource};
use serde::Deserialize;
use tower_http::trace::TraceLayer;

use auth::TokenAuth;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `council.toml` and
/// `COUNCIL_*` environment variables.
#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:               String,
  #[serde(default = "default_port")]
  pub port:               u16,
  pub store_path:         PathBuf,
  /// Argon2 PHC hash of the bearer token callers must present.
  pub service_token_hash: String,
  /// JSON file of reference rows loaded at startup.
  #[serde(default)]
  pub reference_seed:     Option<PathBuf>,
  #[serde(default)]
  pub ingest:             IngestSettings,
  #[serde(default)]
  pub legacy:             Option<LegacySettings>,
}

fn default_host() -> String { "127.0.0.1".into() }

fn default_port() -> u16 { 8080 }

impl ServerConfig {
  /// Catch settings that deserialise fine but cannot work.
  pub fn validate(&self) -> Result<(), Error> {
    if let Some(legacy) = &self.legacy
      && !legacy.url_template.contains("{faculty_id}")
    {
      return Err(Error::Config("legacy.url_template must contain `{faculty_id}`".into()));
    }
    if self.ingest.reservation_ttl_secs == 0 {
      return Err(Error::Config("ingest.reservation_ttl_secs must be positive".into()));
    }
    Ok(())
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }
}

// ─── Reference seed ───────────────────────────────────────────────────────────

/// Read a JSON array of reference rows.
pub fn load_reference_rows(path: &Path) -> Result<Vec<ReferenceRow>, Error> {
  let raw = std::fs::read_to_string(path)
    .map_err(|source| Error::SeedIo { path: path.to_path_buf(), source })?;
  serde_json::from_str(&raw)
    .map_err(|source| Error::SeedFormat { path: path.to_path_buf(), source })
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// The full application: `/api/health` open, every other `/api` route behind
/// the service token.
pub fn router<S, L>(state: ApiState<S, L>, auth: TokenAuth) -> Router
where
  S: StudentStore + 'static,
  L: LegacySource + 'static,
{
  let api = council_api::api_router(state)
    .route_layer(middleware::from_fn_with_state(Arc::new(auth), auth::require_token))
    .route("/health", get(council_api::health));

  Router::new().nest("/api", api).layer(TraceLayer::new_for_http())
}

// ─── Integration tests ────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
  use axum::{
    body::Body,
    http::{Request, StatusCode, header},
  };
  use council_ingest::legacy::HttpLegacySource;
  use council_store_sqlite::SqliteStore;
  use rand_core::OsRng;
  use tower::ServiceExt as _;

  use super::*;

  async fn app(token: &str) -> Router {
    let store = SqliteStore::open_in_memory().await.unwrap();
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default().hash_password(token.as_bytes(), &salt).unwrap().to_string();
    let state: ApiState<SqliteStore, HttpLegacySource> =
      ApiState::new(Arc::new(store), IngestSettings::default());
    router(state, TokenAuth::new(hash).unwrap())
  }

  fn request(uri: &str, bearer: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder().method("DELETE").uri(uri);
    if let Some(token) = bearer {
      builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(Body::empty()).unwrap()
  }

  #[tokio::test]
  async fn api_routes_need_the_service_token() {
    let app = app("s3cret").await;

    let resp = app.clone().oneshot(request("/api/students/repeated-records", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert!(resp.headers().contains_key(header::WWW_AUTHENTICATE));

    let resp =
      app.clone().oneshot(request("/api/students/repeated-records", Some("nope"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let resp = app.oneshot(request("/api/students/repeated-records", Some("s3cret"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[tokio::test]
  async fn health_is_open() {
    let app = app("s3cret").await;
    let req = Request::builder().uri("/api/health").body(Body::empty()).unwrap();
    let resp = app.oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
  }

  #[test]
  fn config_defaults_and_validation() {
    let cfg: ServerConfig = serde_json::from_value(serde_json::json!({
      "store_path": "council.db",
      "service_token_hash": "$argon2id$v=19$m=19456,t=2,p=1$c2FsdHNhbHQ$aGFzaA",
      "ingest": { "path_shift_cool_down_days": 30 },
    }))
    .unwrap();
    assert_eq!(cfg.address(), "127.0.0.1:8080");
    assert_eq!(cfg.ingest.path_shift_cool_down_days, 30);
    assert_eq!(cfg.ingest.minimum_age_years, 10);
    assert!(cfg.legacy.is_none());
    assert!(cfg.validate().is_ok());

    let bad = ServerConfig {
      legacy: Some(LegacySettings { url_template: "http://old/students".into(), timeout_secs: 5 }),
      ..cfg
    };
    assert!(matches!(bad.validate(), Err(Error::Config(_))));
  }

  #[test]
  fn reference_seed_reads_a_json_array() {
    let path = std::env::temp_dir().join(format!("council-seed-{}.json", std::process::id()));
    let mut file = std::fs::File::create(&path).unwrap();
    write!(
      file,
      r#"[{{ "dimension": "faculty", "id": 7, "intakeKey": "F7", "universityId": 1 }}]"#
    )
    .unwrap();

    let rows = load_reference_rows(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].intake_key.as_deref(), Some("F7"));

    assert!(matches!(
      load_reference_rows(Path::new("/nonexistent/seed.json")),
      Err(Error::SeedIo { .. })
    ));
  }
}
