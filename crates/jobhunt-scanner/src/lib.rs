//! JobHunt Scanner - source connectors and the ingestion cycle.
//!
//! This crate fetches postings from ATS boards and the mailbox, admits and
//! scores them against the user's rules, stores new ones exactly once and
//! enriches them with a company domain and logo.
//!
//! # Features
//!
//! - Greenhouse, Lever, Workday and SmartRecruiters connectors
//! - Per-host token-bucket rate limiting shared by every request
//! - Bounded per-company worker pool with per-company timeouts
//! - Per-source deadlines with partial results on cancellation
//! - Best-effort domain and logo enrichment with per-cycle memoization
//!
//! # Example
//!
//! ```rust,ignore
//! use jobhunt_scanner::Orchestrator;
//! use std::sync::Arc;
//!
//! let orchestrator = Orchestrator::new(Arc::new(config), database, events)?;
//! let report = orchestrator.run_cycle(&shutdown).await?;
//! println!("added {} jobs", report.added);
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

pub mod connectors;
pub mod enrichment;
pub mod error;
pub mod filter;
pub mod http;
pub mod limiter;
pub mod orchestrator;
pub mod processor;
pub mod scoring;

// Re-export commonly used types
pub use connectors::{
    GreenhouseConnector, LeverConnector, SmartRecruitersConnector, WorkdayConnector,
};
pub use enrichment::{EnrichmentCache, Enricher};
pub use error::{Result, ScanError};
pub use filter::{should_keep_job, SkipReason};
pub use limiter::HostLimiter;
pub use orchestrator::{CycleReport, Orchestrator, SourceReport};
pub use processor::LeadProcessor;
pub use scoring::score_lead;
