//! SmartRecruiters public postings API.

use crate::connectors::pool::run_companies;
use crate::error::{Result, ScanError};
use crate::http;
use crate::limiter::HostLimiter;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jobhunt_core::text::{infer_work_mode, normalize_location};
use jobhunt_core::{CompanyEntry, Fetcher, JobLead, ScrapeResult, WorkMode};
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source tag.
pub const SOURCE: &str = "smartrecruiters";

const DEFAULT_BASE_URL: &str = "https://api.smartrecruiters.com";
const JOBS_BASE_URL: &str = "https://jobs.smartrecruiters.com";
const COMPANY_TIMEOUT: Duration = Duration::from_secs(20);
const PAGE_SIZE: usize = 100;
const MAX_OFFSET: usize = 5000;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct PostingsPage {
    content: Vec<Posting>,
    total_found: usize,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Posting {
    id: Option<String>,
    uuid: Option<String>,
    #[serde(rename = "ref")]
    reference: Option<String>,
    name: Option<String>,
    released_date: Option<String>,
    location: Option<PostingLocation>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct PostingLocation {
    city: Option<String>,
    region: Option<String>,
    country: Option<String>,
    remote: bool,
}

impl PostingLocation {
    fn joined(&self) -> String {
        [&self.city, &self.region, &self.country]
            .into_iter()
            .filter_map(|part| part.as_deref().map(str::trim))
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// SmartRecruiters connector.
#[derive(Debug, Clone)]
pub struct SmartRecruitersConnector {
    companies: Vec<CompanyEntry>,
    client: Client,
    limiter: Arc<HostLimiter>,
    base_url: String,
}

impl SmartRecruitersConnector {
    /// Create a connector for `companies` (slug = company identifier).
    #[must_use]
    pub fn new(companies: Vec<CompanyEntry>, client: Client, limiter: Arc<HostLimiter>) -> Self {
        Self {
            companies,
            client,
            limiter,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the connector at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_company(&self, company: CompanyEntry, cancel: CancellationToken) -> Result<Vec<JobLead>> {
        let mut leads = Vec::new();
        let mut offset = 0;

        while !cancel.is_cancelled() {
            let api_url = format!(
                "{}/v1/companies/{}/postings?limit={PAGE_SIZE}&offset={offset}",
                self.base_url, company.slug
            );
            let page = match self.fetch_page(&api_url, &cancel).await {
                Ok(page) => page,
                Err(ScanError::Cancelled) => break,
                Err(e) => return Err(e),
            };
            if page.content.is_empty() {
                break;
            }
            leads.extend(page.content.iter().filter_map(|p| lead_from_posting(&company, p)));

            offset += PAGE_SIZE;
            if (page.total_found > 0 && offset >= page.total_found) || offset > MAX_OFFSET {
                break;
            }
        }
        Ok(leads)
    }

    async fn fetch_page(&self, api_url: &str, cancel: &CancellationToken) -> Result<PostingsPage> {
        let response = http::send(&self.limiter, cancel, api_url, self.client.get(api_url)).await?;
        http::json(cancel, api_url, response).await
    }
}

#[async_trait]
impl Fetcher for SmartRecruitersConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, cancel: CancellationToken) -> jobhunt_core::Result<ScrapeResult> {
        let leads = run_companies(SOURCE, &self.companies, &cancel, Some(COMPANY_TIMEOUT), |company, token| {
            self.fetch_company(company, token)
        })
        .await;
        Ok(ScrapeResult::new(SOURCE, leads))
    }
}

fn lead_from_posting(company: &CompanyEntry, posting: &Posting) -> Option<JobLead> {
    fn pick(s: &Option<String>) -> Option<&str> {
        s.as_deref().map(str::trim).filter(|s| !s.is_empty())
    }

    let title = pick(&posting.name)?;
    let id = pick(&posting.id)
        .or_else(|| pick(&posting.uuid))
        .or_else(|| pick(&posting.reference))?;

    let location = normalize_location(
        &posting
            .location
            .as_ref()
            .map(PostingLocation::joined)
            .unwrap_or_default(),
    );
    let flagged_remote = posting.location.as_ref().is_some_and(|l| l.remote);
    let url = format!("{JOBS_BASE_URL}/{}/{id}", company.slug);

    let mut lead = JobLead::new(SOURCE, company.name.clone(), title, url);
    lead.work_mode = match infer_work_mode(&location, title, "") {
        WorkMode::Hybrid => WorkMode::Hybrid,
        _ if flagged_remote => WorkMode::Remote,
        inferred => inferred,
    };
    lead.location = location;
    lead.posted_at = pick(&posting.released_date)
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|t| t.with_timezone(&Utc));
    lead.source_job_id = Some(format!("smartrecruiters:{}:{id}", company.slug));
    Some(lead)
}
