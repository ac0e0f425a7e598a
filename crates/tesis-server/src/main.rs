//! tesis-server binary.
//!
//! Reads `config.toml` (or the path given with `--config`), opens the SQLite
//! store, and serves the JSON API under `/api`.
//!
//! # Bootstrapping
//!
//! The first coordinator has to be registered from the command line:
//!
//! ```text
//! tesis-server add-person --name "Coordinación" --email coord@uni.cl --role coordinador
//! ```

mod config;

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use axum::Router;
use clap::{Parser, Subcommand};
use tesis_core::{
  career::CareerMatcher,
  person::{NewPerson, Role},
  store::ThesisStore,
};
use tesis_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

use crate::config::ServerConfig;

#[derive(Parser)]
#[command(author, version, about = "Thesis topic and enrollment server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the HTTP API (the default).
  Serve,
  /// Print the argon2 hash for a password entered on stdin and exit.
  HashPassword,
  /// Register a person; the password is read from stdin.
  AddPerson {
    #[arg(long)]
    name:    String,
    #[arg(long)]
    email:   String,
    /// alumno, docente or coordinador.
    #[arg(long)]
    role:    Role,
    #[arg(long, default_value = "")]
    career:  String,
    /// Assigned advisor, for students.
    #[arg(long)]
    advisor: Option<Uuid>,
  },
  /// Materialise accepted advisor proposals that have no topic yet.
  Sync,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Some(Command::HashPassword) = cli.command {
    let password = read_password()?;
    let hash = tesis_api::hash_password(&password)
      .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
    println!("{hash}");
    return Ok(());
  }

  let server_cfg = ServerConfig::load(&cli.config)?;
  let store = open_store(&server_cfg).await?;

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(&server_cfg, store).await,
    Command::AddPerson { name, email, role, career, advisor } => {
      let password = read_password()?;
      let password_hash = tesis_api::hash_password(&password)
        .map_err(|e| anyhow::anyhow!("argon2 error: {e}"))?;
      let person = store
        .add_person(NewPerson {
          full_name: name,
          email,
          career,
          role,
          advisor_id: advisor,
          password_hash,
        })
        .await
        .context("failed to register person")?;
      println!("{}", serde_json::to_string_pretty(&person)?);
      Ok(())
    }
    Command::Sync => {
      let report = store
        .sync_accepted_proposals()
        .await
        .context("proposal sync failed")?;
      println!("{}", serde_json::to_string_pretty(&report)?);
      Ok(())
    }
    Command::HashPassword => Ok(()),
  }
}

async fn open_store(cfg: &ServerConfig) -> anyhow::Result<SqliteStore> {
  let store_path = cfg.store_path();
  if let Some(dir) = store_path.parent().filter(|d| !d.as_os_str().is_empty()) {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create {dir:?}"))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  Ok(store.with_career_matcher(CareerMatcher::new(&cfg.careers)))
}

async fn serve(cfg: &ServerConfig, store: SqliteStore) -> anyhow::Result<()> {
  let app = Router::new()
    .nest("/api", tesis_api::api_router(Arc::new(store)))
    .layer(TraceLayer::new_for_http());

  let address = cfg.address();
  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;
  Ok(())
}

/// Read a password from stdin.
fn read_password() -> anyhow::Result<String> {
  use std::io::{self, BufRead, Write};
  let stdin = io::stdin();
  eprint!("Password: ");
  io::stderr().flush().ok();
  let mut line = String::new();
  stdin.lock().read_line(&mut line)?;
  Ok(line.trim_end_matches(['\n', '\r']).to_string())
}
