//! rulesync-enforcer
//!
//! Loads a profile from `RULESYNC_CONFIG` (default `rulesync.yaml`), builds the
//! enforcer, and keeps it in sync with peers until Ctrl-C.

use std::env;
use std::process::ExitCode;

use tracing_subscriber::{fmt, EnvFilter};

use rulesync_core::error::Result;
use rulesync_enforcer::{config, AdapterRegistry, Enforcer};

const DEFAULT_CONFIG_PATH: &str = "rulesync.yaml";

#[tokio::main]
async fn main() -> ExitCode {
    fmt().with_env_filter(EnvFilter::from_default_env()).init();

    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, kind = e.kind().as_str(), "rulesync-enforcer failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<()> {
    let path = env::var("RULESYNC_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let profile = env::var("RULESYNC_PROFILE").ok();

    let cfg = config::load_from_file(&path)?;
    let registry = AdapterRegistry::with_builtins();
    let enforcer = Enforcer::from_config(&cfg, profile.as_deref(), &registry).await?;

    tracing::info!(config = %path, watching = enforcer.watcher().await.is_some(), "rulesync-enforcer running");
    tokio::signal::ctrl_c().await?;

    tracing::info!("shutting down");
    enforcer.close().await
}
