//! JobHunt engine shell
//!
//! This is the thin process shell that loads configuration, opens the
//! database and drives the polling loop. Ingestion logic lives in the
//! `crates/` directory.

pub mod state;

use anyhow::Context;
use clap::Parser;
use jobhunt_core::AppConfig;
use jobhunt_scanner::Orchestrator;
use jobhunt_scheduler::Poller;
use state::EngineState;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::info;

/// Command-line options.
#[derive(Parser, Debug, Clone, Default, PartialEq, Eq)]
#[command(
    name = "jobhunt",
    version,
    about = "Job posting ingestion engine",
    after_help = "Log verbosity follows RUST_LOG (default: info,jobhunt=debug)."
)]
pub struct Options {
    /// Run one ingestion cycle and exit
    #[arg(long)]
    pub once: bool,
    /// Read configuration from this file instead of the default location
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

/// Initialize tracing subscriber for logging
pub fn init_tracing() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,jobhunt=debug"));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();
}

/// Load the configuration snapshot for `options`.
pub fn load_config(options: &Options) -> anyhow::Result<AppConfig> {
    let mut config = match &options.config {
        Some(path) => AppConfig::load_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => AppConfig::load().context("failed to load config")?,
    };
    config.apply_env_overrides();
    Ok(config)
}

/// Run the engine until `shutdown` fires (or after one cycle with `--once`).
pub async fn run(options: Options, shutdown: CancellationToken) -> anyhow::Result<()> {
    info!("Starting JobHunt v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&options)?;
    let state = EngineState::open(config).await?;

    let orchestrator = Orchestrator::new(
        Arc::clone(&state.config),
        state.db.clone(),
        state.events.clone(),
    )
    .context("failed to build orchestrator")?;
    let poller = Poller::new(Arc::clone(&state.config), Arc::new(orchestrator), state.status.clone());

    if options.once {
        match poller.poll_once(&shutdown).await {
            Ok(report) => info!("Cycle finished: added={}", report.added),
            Err(reason) => info!("Cycle skipped: {:?}", reason),
        }
        if let Some(error) = &state.status.snapshot().last_error {
            anyhow::bail!("cycle failed: {error}");
        }
    } else {
        if !state.config.any_source_enabled() {
            tracing::warn!("No source is enabled; the poller will idle");
        }
        poller.run(shutdown).await;
    }

    state.db.close().await;
    info!("Shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_options() {
        let options = Options::try_parse_from(["jobhunt", "--once", "--config", "/tmp/jobhunt.toml"])
            .expect("parse");
        assert!(options.once);
        assert_eq!(options.config, Some(PathBuf::from("/tmp/jobhunt.toml")));

        assert_eq!(Options::try_parse_from(["jobhunt"]).expect("parse"), Options::default());
    }

    #[test]
    fn test_parse_rejects_unknown_and_incomplete() {
        assert!(Options::try_parse_from(["jobhunt", "--verbose"]).is_err());
        assert!(Options::try_parse_from(["jobhunt", "--config"]).is_err());
    }

    #[test]
    fn test_cli_definition_is_consistent() {
        use clap::CommandFactory;
        Options::command().debug_assert();
    }
}
