//! council-server binary.
//!
//! Reads `council.toml` (or the path given with `--config`) plus `COUNCIL_*`
//! environment overrides, opens the SQLite store, optionally seeds reference
//! data, and serves the JSON API over HTTP.
//!
//! # Token hash generation
//!
//! To generate the argon2 PHC string for `service_token_hash`:
//!
//! ```text
//! council-server --hash-token <token>
//! ```

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use argon2::{Argon2, PasswordHasher, password_hash::SaltString};
use clap::Parser;
use council_api::ApiState;
use council_ingest::legacy::HttpLegacySource;
use council_server::{ServerConfig, auth::TokenAuth, load_reference_rows};
use council_store_sqlite::SqliteStore;
use rand_core::OsRng;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Council student reconciliation server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "council.toml")]
  config: PathBuf,

  /// Print the argon2 hash of a service token and exit.
  #[arg(long, value_name = "TOKEN")]
  hash_token: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder().with_default_directive(LevelFilter::INFO.into()).from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Some(token) = cli.hash_token {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
      .hash_password(token.as_bytes(), &salt)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?
      .to_string();
    println!("{hash}");
    return Ok(());
  }

  let settings = config::Config::builder()
    .add_source(config::File::from(cli.config).required(false))
    .add_source(
      config::Environment::with_prefix("COUNCIL")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let server_cfg: ServerConfig =
    settings.try_deserialize().context("failed to deserialise ServerConfig")?;
  server_cfg.validate()?;
  let auth = TokenAuth::new(server_cfg.service_token_hash.clone())?;

  let store_path = expand_tilde(&server_cfg.store_path);
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;

  if let Some(seed) = &server_cfg.reference_seed {
    let rows = load_reference_rows(&expand_tilde(seed))?;
    let written = store.seed_reference_rows(rows).await.context("failed to seed reference data")?;
    tracing::info!(rows = written, path = %seed.display(), "seeded reference data");
  }

  let mut state: ApiState<SqliteStore, HttpLegacySource> =
    ApiState::new(Arc::new(store), server_cfg.ingest.clone());
  if let Some(legacy) = server_cfg.legacy.clone() {
    let source = HttpLegacySource::new(legacy).context("failed to build old council client")?;
    state = state.with_legacy(source);
  } else {
    tracing::info!("no legacy source configured; old council migration disabled");
  }

  let app = council_server::router(state, auth);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener =
    TcpListener::bind(&address).await.with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}

/// Expand a leading `~` to the user's home directory.
fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}
