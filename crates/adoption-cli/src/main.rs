//! adoption - command-line client for the cat adoption marketplace
//!
//! Signs in against the marketplace API, keeps the session in the platform
//! data directory, and prints API responses as JSON on stdout. Logs go to
//! stderr.

mod commands;
mod config;
mod error;

use std::path::PathBuf;
use std::sync::Arc;

use adoption_api::AdoptionClient;
use adoption_session::{FileTokenStorage, MemoryTokenStorage, SessionManager, TokenStorage};
use clap::Parser;
use tracing::{debug, error, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

use crate::commands::{App, Commands};
use crate::config::Config;
use crate::error::Result;

#[derive(Parser, Debug)]
#[command(name = "adoption")]
#[command(about = "Browse, favorite and adopt cats from the command line")]
#[command(version)]
struct Cli {
    /// API base URL (overrides ADOPTION_API_URL)
    #[arg(long, global = true)]
    api_url: Option<String>,

    /// Where to keep the session tokens (overrides ADOPTION_TOKEN_FILE)
    #[arg(long, global = true)]
    token_file: Option<PathBuf>,

    /// Keep the session in memory only; nothing is written to disk
    #[arg(long, global = true, conflicts_with = "token_file")]
    ephemeral: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn apply(&self, config: &mut Config) {
        if let Some(url) = &self.api_url {
            config.api_url = url.clone();
        }
        if let Some(path) = &self.token_file {
            config.token_file = Some(path.clone());
        }
        if self.ephemeral {
            config.token_file = None;
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    let env_filter = EnvFilter::from_default_env()
        .add_directive("adoption_cli=info".parse()?)
        .add_directive("adoption_session=info".parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_writer(std::io::stderr)
            .init();
    };

    let cli = Cli::parse();
    let mut config = Config::from_env();
    cli.apply(&mut config);
    debug!(api_url = %config.api_url, "Configuration loaded");

    let client = AdoptionClient::with_timeout(&config.api_url, config.http_timeout)?;
    let _sweeper = client.cache().start_sweeper(config.cache_sweep_interval);

    let storage: Arc<dyn TokenStorage> = match &config.token_file {
        Some(path) => Arc::new(FileTokenStorage::new(path)),
        None => {
            if !cli.ephemeral {
                warn!("No data directory found, the session will not be saved");
            }
            Arc::new(MemoryTokenStorage::new())
        }
    };

    let session = SessionManager::with_cache(
        Arc::new(client.clone()),
        storage,
        config.session_config(),
        client.cache().clone(),
    );
    let state = session.init().await;
    debug!(?state, "Session initialized");

    let app = App {
        client,
        session,
        config,
    };
    let result = cli.command.execute(&app).await;
    app.session.dispose();

    if let Err(e) = result {
        error!(error = %e, "Command failed");
        eprintln!("{}", e.user_message());
        std::process::exit(1);
    }

    Ok(())
}
