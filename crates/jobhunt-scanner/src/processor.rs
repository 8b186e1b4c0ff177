//! Lead processor: filter, score, store, enrich, notify.
//!
//! Rows are inserted before any enrichment so a slow search or logo host
//! never delays persistence. Enrichment only runs for rows that were new.

use crate::enrichment::{EnrichmentCache, Enricher};
use crate::filter::should_keep_job;
use crate::scoring::score_lead;
use chrono::Utc;
use jobhunt_core::canonical::lead_source_id;
use jobhunt_core::events::JOB_CREATED;
use jobhunt_core::{AppConfig, Event, EventHub, JobLead};
use jobhunt_db::{jobs, logos, Database, NewJob};
use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Turns fetched leads into stored jobs.
#[derive(Debug, Clone)]
pub struct LeadProcessor {
    config: Arc<AppConfig>,
    db: Database,
    events: EventHub,
    enricher: Option<Enricher>,
}

impl LeadProcessor {
    /// Create a processor. Without an enricher, rows are stored without
    /// logo lookups.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, db: Database, events: EventHub, enricher: Option<Enricher>) -> Self {
        Self {
            config,
            db,
            events,
            enricher,
        }
    }

    /// Process one source's leads and return how many new rows were stored.
    ///
    /// Stops early, keeping what was stored, when `cancel` fires.
    pub async fn process(&self, leads: &[JobLead], cancel: &CancellationToken, request_id: &str) -> usize {
        let pool = self.db.pool();
        let mut cache = EnrichmentCache::new();
        let mut added = 0;

        for lead in leads {
            if cancel.is_cancelled() {
                tracing::warn!("[process] stopped early after {} new jobs", added);
                break;
            }

            if let Err(reason) = should_keep_job(&self.config, lead) {
                tracing::debug!(
                    "[{}] skipped ({}) title={:?} loc={:?} url={:?}",
                    lead.source,
                    reason,
                    lead.title,
                    lead.location,
                    lead.url
                );
                continue;
            }

            let job = self.job_from_lead(lead).await;
            match jobs::insert_job_if_new(pool, &job).await {
                Ok(true) => {}
                Ok(false) => continue,
                Err(e) => {
                    tracing::warn!(
                        "[process:{}] insert error: {} title={:?} url={:?} source_id={:?}",
                        lead.source,
                        e,
                        lead.title,
                        lead.url,
                        job.source_id
                    );
                    continue;
                }
            }

            if job.logo_key.is_empty() {
                self.enrich(&job, lead, &mut cache, cancel).await;
            }

            added += 1;
            self.notify(&job, request_id);
        }

        added
    }

    async fn job_from_lead(&self, lead: &JobLead) -> NewJob {
        let (score, tags) = score_lead(&self.config.scoring, lead);
        NewJob {
            company: lead.company.trim().to_string(),
            title: lead.title.trim().to_string(),
            location: lead.location.trim().to_string(),
            work_mode: lead.work_mode.as_str().to_string(),
            url: lead.url.trim().to_string(),
            score,
            tags,
            date: lead.posted_at.unwrap_or_else(Utc::now),
            source_id: lead_source_id(lead),
            seen_from_source: lead.source.trim().to_string(),
            logo_key: self.known_logo_key(lead).await,
        }
    }

    /// Key of the lead's own logo if it is already cached.
    async fn known_logo_key(&self, lead: &JobLead) -> String {
        let Some(url) = lead.logo_url.as_deref().map(str::trim).filter(|u| !u.is_empty()) else {
            return String::new();
        };
        let url = url.split_once('#').map_or(url, |(head, _)| head.trim());
        let key = logos::logo_key_for_url(url);
        match logos::logo_exists(self.db.pool(), &key).await {
            Ok(true) => key,
            Ok(false) => String::new(),
            Err(e) => {
                tracing::debug!("[logo] lookup {} failed: {}", key, e);
                String::new()
            }
        }
    }

    async fn enrich(&self, job: &NewJob, lead: &JobLead, cache: &mut EnrichmentCache, cancel: &CancellationToken) {
        let Some(enricher) = &self.enricher else {
            return;
        };
        let pool = self.db.pool();
        let Some(key) = enricher
            .logo_key(pool, cache, cancel, &job.company, lead.logo_url.as_deref())
            .await
        else {
            return;
        };

        match jobs::set_logo_key_if_missing(pool, &job.source_id, &key).await {
            Ok(true) => tracing::debug!(
                "[logo] updated company={:?} source_id={:?} key={}",
                job.company,
                job.source_id,
                key
            ),
            Ok(false) => {}
            Err(e) => tracing::warn!("[logo] update failed source_id={:?}: {}", job.source_id, e),
        }
    }

    fn notify(&self, job: &NewJob, request_id: &str) {
        let notify = job.score >= self.config.scoring.notify_min_score;
        let event = Event::new(
            JOB_CREATED,
            json!({
                "source_id": job.source_id,
                "source": job.seen_from_source,
                "company": job.company,
                "title": job.title,
                "url": job.url,
                "score": job.score,
                "notify": notify,
            }),
        )
        .with_request_id(request_id);
        self.events.publish(event);
    }
}
