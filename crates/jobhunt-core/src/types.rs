//! Shared types used across the JobHunt engine.
//!
//! This module defines the ephemeral lead representation every connector
//! produces, the work-mode enum, and the [`Fetcher`] contract the
//! orchestrator drives.

use crate::error::{JobhuntError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio_util::sync::CancellationToken;

/// Where a job is performed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WorkMode {
    /// Fully remote
    Remote,
    /// Mix of remote and office
    Hybrid,
    /// Office only
    Onsite,
    /// Not stated
    #[default]
    Unknown,
}

impl WorkMode {
    /// Get the string representation stored in the database.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Remote => "Remote",
            Self::Hybrid => "Hybrid",
            Self::Onsite => "Onsite",
            Self::Unknown => "Unknown",
        }
    }

    /// True when the mode is [`WorkMode::Unknown`].
    #[must_use]
    pub const fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WorkMode {
    type Err = JobhuntError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(Self::Remote),
            "hybrid" => Ok(Self::Hybrid),
            "onsite" | "on-site" | "on site" => Ok(Self::Onsite),
            "unknown" | "" => Ok(Self::Unknown),
            other => Err(JobhuntError::Validation(format!(
                "invalid work mode: '{other}'"
            ))),
        }
    }
}

/// Mail headers a lead was extracted from.
///
/// Only set by the email connector; used to derive a stable identity when the
/// posting itself carries none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailOrigin {
    /// `Message-Id` header, angle brackets included
    pub message_id: String,
    /// Decoded `From` header
    pub from: String,
    /// Decoded `Subject` header
    pub subject: String,
}

/// A job posting as produced by a connector, before filtering and storage.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobLead {
    /// Company display name
    pub company: String,
    /// Posting title
    pub title: String,
    /// Posting URL
    pub url: String,
    /// Raw, normalized location text
    pub location: String,
    /// Inferred work mode
    pub work_mode: WorkMode,
    /// Stable connector-supplied identity (e.g. `lever:acme:123`)
    pub source_job_id: Option<String>,
    /// Requisition id when the ATS exposes one
    pub req_id: Option<String>,
    /// Plain text or HTML description
    pub description: String,
    /// Publication time when known
    pub posted_at: Option<DateTime<Utc>>,
    /// Originating source tag (`greenhouse`, `lever`, `email`, ...)
    pub source: String,
    /// Logo image URL seen next to the posting
    pub logo_url: Option<String>,
    /// Mail headers for leads that came from the mailbox
    pub email: Option<EmailOrigin>,
}

impl JobLead {
    /// Create a lead with the fields every connector knows.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        company: impl Into<String>,
        title: impl Into<String>,
        url: impl Into<String>,
    ) -> Self {
        Self {
            source: source.into(),
            company: company.into(),
            title: title.into(),
            url: url.into(),
            ..Self::default()
        }
    }
}

/// Post-commit side effect attached to a [`ScrapeResult`].
pub type Finalize = Box<dyn FnOnce() -> BoxFuture<'static, Result<()>> + Send>;

/// Everything one connector produced in one cycle.
pub struct ScrapeResult {
    /// Connector name
    pub source: String,
    /// Leads, in connector order
    pub leads: Vec<JobLead>,
    /// Run after the leads were processed (e.g. mark mail read)
    pub finalize: Option<Finalize>,
}

impl ScrapeResult {
    /// Result without a finalize callback.
    #[must_use]
    pub fn new(source: impl Into<String>, leads: Vec<JobLead>) -> Self {
        Self {
            source: source.into(),
            leads,
            finalize: None,
        }
    }

    /// Attach a finalize callback.
    #[must_use]
    pub fn with_finalize(mut self, finalize: Finalize) -> Self {
        self.finalize = Some(finalize);
        self
    }
}

impl fmt::Debug for ScrapeResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScrapeResult")
            .field("source", &self.source)
            .field("leads", &self.leads.len())
            .field("finalize", &self.finalize.is_some())
            .finish()
    }
}

/// A job source the orchestrator can run.
///
/// Implementations must stop issuing work once `cancel` fires. ATS sources
/// return what they collected so far; sources that cannot produce a
/// consistent partial result return [`JobhuntError::Cancelled`].
#[async_trait]
pub trait Fetcher: Send + Sync {
    /// Stable source name, used for timeouts and logging.
    fn name(&self) -> &str;

    /// Fetch leads until done or cancelled.
    async fn fetch(&self, cancel: CancellationToken) -> Result<ScrapeResult>;
}
