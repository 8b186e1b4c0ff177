//! Fetch orchestrator for one ingestion cycle.
//!
//! A cycle builds the enabled connectors from configuration, runs them all
//! concurrently with a per-source deadline, then feeds each source's leads
//! through the [`LeadProcessor`] in the order the sources finished. A failing
//! or slow source never cancels its siblings.

use crate::connectors::{
    GreenhouseConnector, LeverConnector, SmartRecruitersConnector, WorkdayConnector,
};
use crate::enrichment::Enricher;
use crate::error::Result;
use crate::http;
use crate::limiter::HostLimiter;
use crate::processor::LeadProcessor;
use jobhunt_core::{AppConfig, EventHub, Fetcher, Finalize, JobhuntError, ScrapeResult};
use jobhunt_db::Database;
use jobhunt_mail::EmailFetcher;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Deadline for the ATS sources.
pub const ATS_TIMEOUT: Duration = Duration::from_secs(5 * 60);

/// Deadline for the mailbox and any other source.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// Budget for filtering, storing and enriching all leads of a cycle.
pub const INSERT_TIMEOUT: Duration = Duration::from_secs(2 * 60);

/// How long a source may keep running after its token was cancelled.
const CANCEL_GRACE: Duration = Duration::from_secs(5);

/// Client timeout for API connectors.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// Deadline for a source by name.
#[must_use]
pub fn source_timeout(source: &str) -> Duration {
    match source {
        "greenhouse" | "lever" | "workday" | "smartrecruiters" => ATS_TIMEOUT,
        _ => DEFAULT_TIMEOUT,
    }
}

/// Outcome of one source in a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    /// Source name
    pub source: String,
    /// Leads the source returned
    pub leads: usize,
    /// New rows stored from those leads
    pub added: usize,
    /// Why the source produced nothing, if it failed
    pub error: Option<String>,
}

/// Outcome of one cycle.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Correlation id stamped on every event of the cycle
    pub request_id: String,
    /// New rows stored
    pub added: usize,
    /// Per-source outcomes, in completion order
    pub sources: Vec<SourceReport>,
}

impl CycleReport {
    /// Names of sources that failed.
    #[must_use]
    pub fn failed_sources(&self) -> Vec<&str> {
        self.sources
            .iter()
            .filter(|s| s.error.is_some())
            .map(|s| s.source.as_str())
            .collect()
    }
}

struct SourceOutcome {
    source: String,
    elapsed: Duration,
    result: jobhunt_core::Result<ScrapeResult>,
}

/// Runs ingestion cycles.
#[derive(Debug, Clone)]
pub struct Orchestrator {
    config: Arc<AppConfig>,
    limiter: Arc<HostLimiter>,
    processor: LeadProcessor,
    timeouts: HashMap<String, Duration>,
    insert_timeout: Duration,
}

impl Orchestrator {
    /// Create an orchestrator with domain and logo enrichment enabled.
    pub fn new(config: Arc<AppConfig>, db: Database, events: EventHub) -> Result<Self> {
        let limiter = Arc::new(HostLimiter::from_config(&config.rate_limit));
        let enricher = Enricher::new(Arc::clone(&limiter))?;
        Ok(Self::with_parts(config, db, events, limiter, Some(enricher)))
    }

    /// Create an orchestrator from explicit parts.
    #[must_use]
    pub fn with_parts(
        config: Arc<AppConfig>,
        db: Database,
        events: EventHub,
        limiter: Arc<HostLimiter>,
        enricher: Option<Enricher>,
    ) -> Self {
        let processor = LeadProcessor::new(Arc::clone(&config), db, events, enricher);
        Self {
            config,
            limiter,
            processor,
            timeouts: HashMap::new(),
            insert_timeout: INSERT_TIMEOUT,
        }
    }

    /// Override the deadline of one source.
    #[must_use]
    pub fn with_source_timeout(mut self, source: impl Into<String>, timeout: Duration) -> Self {
        self.timeouts.insert(source.into(), timeout);
        self
    }

    /// Override the insert-phase budget.
    #[must_use]
    pub fn with_insert_timeout(mut self, timeout: Duration) -> Self {
        self.insert_timeout = timeout;
        self
    }

    fn timeout_for(&self, source: &str) -> Duration {
        self.timeouts
            .get(source)
            .copied()
            .unwrap_or_else(|| source_timeout(source))
    }

    /// Connectors for every enabled source.
    pub fn build_fetchers(&self) -> Result<Vec<Arc<dyn Fetcher>>> {
        let sources = &self.config.sources;
        let mut fetchers: Vec<Arc<dyn Fetcher>> = Vec::new();
        let client = http::build_client(CLIENT_TIMEOUT)?;
        let limiter = &self.limiter;

        if sources.greenhouse.enabled {
            fetchers.push(Arc::new(GreenhouseConnector::new(
                sources.greenhouse.active_companies(),
                client.clone(),
                Arc::clone(limiter),
            )));
        }
        if sources.lever.enabled {
            fetchers.push(Arc::new(LeverConnector::new(
                sources.lever.active_companies(),
                client.clone(),
                Arc::clone(limiter),
            )));
        }
        if sources.workday.enabled {
            fetchers.push(Arc::new(WorkdayConnector::new(
                sources.workday.active_companies(),
                Arc::clone(limiter),
            )));
        }
        if sources.smartrecruiters.enabled {
            fetchers.push(Arc::new(SmartRecruitersConnector::new(
                sources.smartrecruiters.active_companies(),
                client,
                Arc::clone(limiter),
            )));
        }
        if self.config.email.enabled {
            fetchers.push(Arc::new(EmailFetcher::new(self.config.email.clone())));
        }
        Ok(fetchers)
    }

    /// Run one cycle over the configured sources.
    pub async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport> {
        let fetchers = self.build_fetchers()?;
        Ok(self.run_with_fetchers(fetchers, shutdown).await)
    }

    /// Run one cycle over `fetchers`.
    pub async fn run_with_fetchers(
        &self,
        fetchers: Vec<Arc<dyn Fetcher>>,
        shutdown: &CancellationToken,
    ) -> CycleReport {
        let request_id = uuid::Uuid::new_v4().to_string();
        let mut report = CycleReport {
            request_id: request_id.clone(),
            ..CycleReport::default()
        };
        if fetchers.is_empty() {
            tracing::info!("[cycle {}] no sources enabled", request_id);
            return report;
        }

        let started = Instant::now();
        let names: Vec<&str> = fetchers.iter().map(|f| f.name()).collect();
        tracing::info!("[cycle {}] starting sources: {}", request_id, names.join(", "));

        let outcomes = self.fetch_all(fetchers, shutdown).await;

        let insert_cancel = shutdown.child_token();
        let timer = {
            let token = insert_cancel.clone();
            let budget = self.insert_timeout;
            tokio::spawn(async move {
                tokio::time::sleep(budget).await;
                token.cancel();
            })
        };

        let mut finalizers: Vec<(String, Finalize)> = Vec::new();
        for outcome in outcomes {
            let source = outcome.source;
            match outcome.result {
                Ok(result) => {
                    let leads = result.leads.len();
                    let added = self.processor.process(&result.leads, &insert_cancel, &request_id).await;
                    tracing::info!(
                        "[{}] leads={} added={} in {:.1}s",
                        source,
                        leads,
                        added,
                        outcome.elapsed.as_secs_f64()
                    );
                    if let Some(finalize) = result.finalize {
                        if insert_cancel.is_cancelled() {
                            tracing::warn!("[{}] insert phase cut short; skipping finalize", source);
                        } else {
                            finalizers.push((source.clone(), finalize));
                        }
                    }
                    report.added += added;
                    report.sources.push(SourceReport {
                        source,
                        leads,
                        added,
                        error: None,
                    });
                }
                Err(e) => {
                    tracing::warn!(
                        "[{}] failed after {:.1}s: {}",
                        source,
                        outcome.elapsed.as_secs_f64(),
                        e
                    );
                    report.sources.push(SourceReport {
                        source,
                        leads: 0,
                        added: 0,
                        error: Some(e.to_string()),
                    });
                }
            }
        }
        timer.abort();

        for (source, finalize) in finalizers {
            if let Err(e) = finalize().await {
                tracing::warn!("[{}] finalize failed: {}", source, e);
            }
        }

        tracing::info!(
            "[cycle {}] done: added={} failed={:?} in {:.1}s",
            request_id,
            report.added,
            report.failed_sources(),
            started.elapsed().as_secs_f64()
        );
        report
    }

    /// Run every fetcher as its own task; collect results in completion order.
    async fn fetch_all(
        &self,
        fetchers: Vec<Arc<dyn Fetcher>>,
        shutdown: &CancellationToken,
    ) -> Vec<SourceOutcome> {
        let (tx, mut rx) = mpsc::channel(fetchers.len());

        for fetcher in fetchers {
            let tx = tx.clone();
            let deadline = self.timeout_for(fetcher.name());
            let token = shutdown.child_token();

            tokio::spawn(async move {
                let source = fetcher.name().to_string();
                let started = Instant::now();
                let result = run_with_deadline(fetcher.as_ref(), deadline, token).await;
                let outcome = SourceOutcome {
                    source,
                    elapsed: started.elapsed(),
                    result,
                };
                // Receiver only goes away if the cycle itself was dropped.
                let _ = tx.send(outcome).await;
            });
        }
        drop(tx);

        let mut outcomes = Vec::new();
        while let Some(outcome) = rx.recv().await {
            outcomes.push(outcome);
        }
        outcomes
    }
}

/// Run `fetcher` until it returns or `deadline` passes. At the deadline its
/// token is cancelled and it gets a short grace period to hand back
/// partial results.
async fn run_with_deadline(
    fetcher: &dyn Fetcher,
    deadline: Duration,
    token: CancellationToken,
) -> jobhunt_core::Result<ScrapeResult> {
    let fetch = fetcher.fetch(token.clone());
    tokio::pin!(fetch);

    tokio::select! {
        result = &mut fetch => result,
        () = tokio::time::sleep(deadline) => {
            tracing::warn!("[{}] deadline of {:?} reached", fetcher.name(), deadline);
            token.cancel();
            match tokio::time::timeout(CANCEL_GRACE, &mut fetch).await {
                Ok(result) => result,
                Err(_) => Err(JobhuntError::Cancelled(format!(
                    "{} ignored cancellation",
                    fetcher.name()
                ))),
            }
        }
    }
}
