//! JobHunt Core - Foundation crate for the JobHunt ingestion engine.
//!
//! This crate provides shared types, error handling, configuration management,
//! and the text/URL helpers that every connector and the lead processor rely on.
//!
//! # Modules
//!
//! - [`error`] - Central error types using thiserror
//! - [`config`] - TOML-based configuration with XDG paths
//! - [`types`] - Lead model, work mode, and the `Fetcher` contract
//! - [`text`] - Whitespace, location, and work-mode normalization
//! - [`canonical`] - URL canonicalization and stable source ids
//! - [`events`] - Broadcast hub for pipeline notifications
//!
//! # Example
//!
//! ```rust
//! use jobhunt_core::{canonical::canonicalize_url, AppConfig};
//!
//! let config = AppConfig::default();
//! assert!(!config.filters.remote_ok);
//!
//! let canon = canonicalize_url("https://www.linkedin.com/comm/jobs/view/42/?trk=eml");
//! assert_eq!(canon, "https://www.linkedin.com/jobs/view/42");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod canonical;
pub mod config;
pub mod error;
pub mod events;
pub mod text;
pub mod types;

// Re-export commonly used types
pub use config::{
    AppConfig, CompanyEntry, DatabaseConfig, EmailConfig, FilterConfig, PenaltyRule,
    PollingConfig, RateLimitConfig, ScoreRule, ScoringConfig, SourceConfig, SourcesConfig,
};
pub use error::{ConfigError, ConfigResult, JobhuntError, Result};
pub use events::{Event, EventHub};
pub use types::{EmailOrigin, Fetcher, Finalize, JobLead, ScrapeResult, WorkMode};
