//! `council`: operator CLI for the council server.
//!
//! # Usage
//!
//! ```text
//! council send batch.json
//! council withdraw 1001 1002
//! council history 12345-6789012-ABCDE-FGHIJKL
//! council revert 42 17 --actor 5
//! council migrate 70 80 --store
//! council --url http://localhost:8080 --token s3cret cleanup
//! ```
//!
//! Settings come from `~/.config/council/config.toml` (`server_url`, `token`)
//! unless `--config` names another file; flags and `COUNCIL_*` variables win.

mod client;

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use client::{ApiClient, ApiConfig};
use council_ingest::{RecordOutcome, legacy::MigrationMode};
use serde::Deserialize;
use serde_json::Value;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

// ─── CLI args ─────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "council", about = "Operator CLI for the council student server")]
struct Args {
  /// Path to a TOML config file (server_url, token).
  #[arg(short, long, value_name = "FILE")]
  config: Option<PathBuf>,

  /// Base URL of the council server (default: http://localhost:8080).
  #[arg(long, env = "COUNCIL_URL")]
  url: Option<String>,

  /// Service token.
  #[arg(long, env = "COUNCIL_TOKEN", hide_env_values = true)]
  token: Option<String>,

  /// Print raw JSON instead of a summary.
  #[arg(long, global = true)]
  json: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
enum Command {
  /// Submit intake records from a JSON file (`[...]` or `{"students": [...]}`).
  Send { file: PathBuf },
  /// Withdraw students by external id.
  Withdraw {
    #[arg(required = true)]
    external_ids: Vec<String>,
  },
  /// Delete older duplicates of initially-accepted students.
  Cleanup,
  /// Show a student's transaction log.
  History { unique_id: String },
  /// Revert one transaction of a student.
  Revert {
    student_id:     i64,
    transaction_id: i64,
    /// Local user id recorded as the author.
    #[arg(long)]
    actor:          i64,
  },
  /// Migrate faculties from the old council.
  Migrate {
    #[arg(required = true)]
    faculty_ids: Vec<String>,
    /// Write the students instead of only reporting.
    #[arg(long)]
    store:       bool,
  },
}

// ─── Config file ──────────────────────────────────────────────────────────────

/// Shape of the optional TOML config file.
#[derive(Deserialize, Default, Debug)]
struct ConfigFile {
  #[serde(default)]
  server_url: String,
  #[serde(default)]
  token:      String,
}

fn default_config_path() -> Option<PathBuf> {
  std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".config/council/config.toml"))
}

/// An explicit `--config` must exist; the default location may be absent.
fn load_config(explicit: Option<&Path>) -> Result<ConfigFile> {
  let (path, required) = match explicit {
    Some(path) => (path.to_path_buf(), true),
    None => match default_config_path() {
      Some(path) => (path, false),
      None => return Ok(ConfigFile::default()),
    },
  };
  if !required && !path.exists() {
    return Ok(ConfigFile::default());
  }
  let raw = std::fs::read_to_string(&path)
    .with_context(|| format!("reading config file {}", path.display()))?;
  toml::from_str(&raw).context("parsing config file")
}

/// Flags override the config file, which overrides defaults.
fn resolve(url: Option<String>, token: Option<String>, file: ConfigFile) -> ApiConfig {
  ApiConfig {
    base_url: url
      .or_else(|| (!file.server_url.is_empty()).then_some(file.server_url))
      .unwrap_or_else(|| "http://localhost:8080".to_string()),
    token:    token.or_else(|| (!file.token.is_empty()).then_some(file.token)).unwrap_or_default(),
  }
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
  tracing_subscriber::fmt()
    .with_writer(std::io::stderr)
    .with_env_filter(
      EnvFilter::builder().with_default_directive(LevelFilter::WARN.into()).from_env_lossy(),
    )
    .init();

  let args = Args::parse();
  let file_cfg = load_config(args.config.as_deref())?;
  let client = ApiClient::new(resolve(args.url, args.token, file_cfg))?;

  match args.command {
    Command::Send { file } => {
      let raw = std::fs::read_to_string(&file)
        .with_context(|| format!("reading {}", file.display()))?;
      let value: Value = serde_json::from_str(&raw).context("parsing student batch")?;
      let outcomes = client.send(records_from(value)?).await?;
      print_outcomes(&outcomes, args.json)?;
    }
    Command::Withdraw { external_ids } => {
      let outcomes = client.withdraw(&external_ids).await?;
      print_outcomes(&outcomes, args.json)?;
    }
    Command::Cleanup => {
      let report = client.cleanup().await?;
      if args.json {
        print_json(&report)?;
      } else {
        println!("deleted {} repeated record(s)", report["deletedCount"]);
        for id in report["deletedIds"].as_array().into_iter().flatten() {
          println!("  {}\t{}\t{}", id["id"], text(&id["externalId"]), text(&id["uniqueId"]));
        }
      }
    }
    Command::History { unique_id } => {
      let entries = client.history(&unique_id).await?;
      if args.json {
        print_json(&entries)?;
      } else {
        for entry in &entries {
          let revertible = if entry["canRevert"] == Value::Bool(true) { "revertible" } else { "" };
          println!(
            "{}\t{}\t{}\tby {}\t{revertible}",
            entry["id"],
            text(&entry["createdAt"]),
            text(&entry["kind"]),
            entry["createdBy"],
          );
        }
      }
    }
    Command::Revert { student_id, transaction_id, actor } => {
      let report = client.revert(student_id, transaction_id, actor).await?;
      print_json(&report)?;
    }
    Command::Migrate { faculty_ids, store } => {
      let mode = if store { MigrationMode::Store } else { MigrationMode::Report };
      let reports = client.migrate(&faculty_ids, mode).await?;
      if args.json {
        print_json(&reports)?;
      } else {
        for report in &reports {
          let key = text(&report["facultyKey"]);
          match report["error"].as_str() {
            Some(error) => println!("{key}\tfailed\t{error}"),
            None => {
              let r = &report["results"];
              println!(
                "{key}\t{} students\t{} passed\t{} replaced\t{} exist\t{} failed",
                r["students"], r["passed"], r["replaced"], r["exist"], r["failed"],
              );
            }
          }
        }
      }
    }
  }

  Ok(())
}

// ─── Output ───────────────────────────────────────────────────────────────────

/// Accept a bare array or the request envelope.
fn records_from(value: Value) -> Result<Vec<Value>> {
  match value {
    Value::Array(records) => Ok(records),
    Value::Object(mut root) => match root.remove("students") {
      Some(Value::Array(records)) => Ok(records),
      _ => bail!("expected a `students` array"),
    },
    _ => bail!("expected a JSON array of students"),
  }
}

fn print_outcomes(outcomes: &[RecordOutcome], json: bool) -> Result<()> {
  if json {
    return print_json(outcomes);
  }
  for o in outcomes {
    let id = o.external_id.as_deref().unwrap_or("-");
    println!("{id}\t{:?}\t{}\t{}", o.status, o.code, o.message);
  }
  let accepted = outcomes.iter().filter(|o| o.is_accepted()).count();
  println!("{accepted}/{} accepted", outcomes.len());
  Ok(())
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> Result<()> {
  println!("{}", serde_json::to_string_pretty(value)?);
  Ok(())
}

fn text(value: &Value) -> &str { value.as_str().unwrap_or("-") }

#[cfg(test)]
mod tests {
  use serde_json::json;

  use super::*;

  #[test]
  fn flags_override_the_config_file() {
    let file = ConfigFile { server_url: "http://council:9000".into(), token: "from-file".into() };
    let cfg = resolve(None, Some("from-flag".into()), file);
    assert_eq!(cfg, ApiConfig {
      base_url: "http://council:9000".into(),
      token:    "from-flag".into(),
    });

    let cfg = resolve(None, None, ConfigFile::default());
    assert_eq!(cfg.base_url, "http://localhost:8080");
    assert!(cfg.token.is_empty());
  }

  #[test]
  fn subcommands_parse() {
    let args = Args::try_parse_from(["council", "revert", "42", "17", "--actor", "5"]).unwrap();
    assert_eq!(args.command, Command::Revert { student_id: 42, transaction_id: 17, actor: 5 });

    let args = Args::try_parse_from(["council", "migrate", "70", "80", "--store", "--json"]).unwrap();
    assert!(args.json);
    assert_eq!(args.command, Command::Migrate {
      faculty_ids: vec!["70".into(), "80".into()],
      store:       true,
    });

    assert!(Args::try_parse_from(["council", "withdraw"]).is_err());
  }

  #[test]
  fn batches_may_be_bare_or_wrapped() {
    assert_eq!(records_from(json!([{}, {}])).unwrap().len(), 2);
    assert_eq!(records_from(json!({ "students": [{}] })).unwrap().len(), 1);
    assert!(records_from(json!({ "students": 3 })).is_err());
    assert!(records_from(json!("x")).is_err());
  }

  #[test]
  fn explicit_config_must_exist() {
    assert!(load_config(Some(Path::new("/nonexistent/council.toml"))).is_err());
  }
}
