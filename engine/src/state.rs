//! Engine state shared by the poller and status readers.

use anyhow::Context;
use jobhunt_core::{AppConfig, EventHub};
use jobhunt_db::Database;
use jobhunt_scheduler::StatusRegister;
use std::sync::Arc;

/// Events buffered per subscriber before the oldest are dropped.
const EVENT_CAPACITY: usize = 256;

/// Everything one engine process owns.
#[derive(Debug, Clone)]
pub struct EngineState {
    /// Configuration snapshot taken at startup
    pub config: Arc<AppConfig>,
    /// Open, migrated database
    pub db: Database,
    /// Pipeline notifications
    pub events: EventHub,
    /// Latest cycle outcome
    pub status: StatusRegister,
}

impl EngineState {
    /// Open the database named by `config` and run migrations.
    pub async fn open(config: AppConfig) -> anyhow::Result<Self> {
        let db_path = config
            .database_path()
            .context("failed to resolve database path")?;
        tracing::info!("Database: {}", db_path.display());

        let db = Database::new(&db_path)
            .await
            .with_context(|| format!("failed to open database at {}", db_path.display()))?;
        db.run_migrations().await.context("failed to run migrations")?;

        Ok(Self {
            config: Arc::new(config),
            db,
            events: EventHub::new(EVENT_CAPACITY),
            status: StatusRegister::new(),
        })
    }
}
