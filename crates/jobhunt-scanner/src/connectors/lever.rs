//! Lever postings API.

use crate::connectors::pool::run_companies;
use crate::error::{Result, ScanError};
use crate::http;
use crate::limiter::HostLimiter;
use async_trait::async_trait;
use chrono::DateTime;
use jobhunt_core::text::{clean_text, infer_work_mode, normalize_location};
use jobhunt_core::{CompanyEntry, Fetcher, JobLead, ScrapeResult};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::Deserialize;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source tag.
pub const SOURCE: &str = "lever";

const DEFAULT_BASE_URL: &str = "https://api.lever.co";

const COMPANY_TIMEOUT: Duration = Duration::from_secs(10);

/// Tried in order when the API leaves the location blank.
const LOCATION_SELECTORS: [&str; 5] = [
    "[itemprop='jobLocation']",
    "[data-qa='location']",
    ".location",
    ".posting-categories .location",
    ".posting-categories li",
];

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Posting {
    id: String,
    text: String,
    hosted_url: String,
    created_at: i64,
    categories: Categories,
    description: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct Categories {
    location: Option<String>,
}

/// Lever connector.
#[derive(Debug, Clone)]
pub struct LeverConnector {
    companies: Vec<CompanyEntry>,
    client: Client,
    limiter: Arc<HostLimiter>,
    base_url: String,
    company_timeout: Duration,
}

impl LeverConnector {
    /// Create a connector for `companies` (slug = Lever account name).
    #[must_use]
    pub fn new(companies: Vec<CompanyEntry>, client: Client, limiter: Arc<HostLimiter>) -> Self {
        Self {
            companies,
            client,
            limiter,
            base_url: DEFAULT_BASE_URL.to_string(),
            company_timeout: COMPANY_TIMEOUT,
        }
    }

    /// Point the connector at a different API host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Override the per-company budget. Page hydration stops at the budget;
    /// postings not yet hydrated are kept as the API returned them.
    #[must_use]
    pub fn with_company_timeout(mut self, timeout: Duration) -> Self {
        self.company_timeout = timeout;
        self
    }

    async fn fetch_company(&self, company: CompanyEntry, cancel: CancellationToken) -> Result<Vec<JobLead>> {
        let api_url = format!("{}/v0/postings/{}?mode=json", self.base_url, company.slug);
        let response = http::send(&self.limiter, &cancel, &api_url, self.client.get(&api_url)).await?;
        let postings: Vec<Posting> = http::json(&cancel, &api_url, response).await?;

        let mut leads: Vec<JobLead> = postings
            .into_iter()
            .filter_map(|p| lead_from_posting(&company, p))
            .collect();

        for lead in &mut leads {
            if !lead.location.is_empty() && !lead.work_mode.is_unknown() {
                continue;
            }
            match self.hydrate(lead, &cancel).await {
                Ok(()) => {}
                Err(ScanError::Cancelled) => break,
                Err(e) => tracing::debug!("[lever] hydrate {} failed: {}", lead.url, e),
            }
        }
        Ok(leads)
    }

    async fn hydrate(&self, lead: &mut JobLead, cancel: &CancellationToken) -> Result<()> {
        let html = http::get_text(&self.client, &self.limiter, cancel, &lead.url).await?;
        let page = parse_posting_page(&html);

        if lead.title.is_empty() {
            if let Some(title) = page.title {
                lead.title = title;
            }
        }
        if lead.location.is_empty() {
            if let Some(location) = page.location {
                lead.location = normalize_location(&location);
            }
        }
        if lead.work_mode.is_unknown() {
            lead.work_mode = infer_work_mode(&lead.location, &lead.title, &lead.description);
        }
        Ok(())
    }
}

#[async_trait]
impl Fetcher for LeverConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, cancel: CancellationToken) -> jobhunt_core::Result<ScrapeResult> {
        let leads = run_companies(SOURCE, &self.companies, &cancel, Some(self.company_timeout), |company, token| {
            self.fetch_company(company, token)
        })
        .await;
        Ok(ScrapeResult::new(SOURCE, leads))
    }
}

fn lead_from_posting(company: &CompanyEntry, posting: Posting) -> Option<JobLead> {
    let title = posting.text.trim();
    if posting.id.is_empty() || posting.hosted_url.trim().is_empty() || title.is_empty() {
        return None;
    }

    let location = normalize_location(posting.categories.location.as_deref().unwrap_or_default());
    let mut lead = JobLead::new(SOURCE, company.name.clone(), title, posting.hosted_url.trim());
    lead.work_mode = infer_work_mode(&location, title, &posting.description);
    lead.location = location;
    lead.posted_at = (posting.created_at > 0)
        .then(|| DateTime::from_timestamp_millis(posting.created_at))
        .flatten();
    lead.source_job_id = Some(format!("lever:{}:{}", company.slug, posting.id));
    lead.description = posting.description;
    Some(lead)
}

struct PostingPage {
    title: Option<String>,
    location: Option<String>,
}

fn parse_posting_page(html: &str) -> PostingPage {
    static H1: OnceLock<Selector> = OnceLock::new();
    static LOCATIONS: OnceLock<Vec<Selector>> = OnceLock::new();

    let doc = Html::parse_document(html);
    let text_of = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
    };

    let h1 = H1.get_or_init(|| Selector::parse("h1").expect("valid selector"));
    let locations = LOCATIONS.get_or_init(|| {
        LOCATION_SELECTORS
            .iter()
            .map(|css| Selector::parse(css).expect("valid selector"))
            .collect()
    });

    PostingPage {
        title: text_of(h1),
        location: locations.iter().find_map(text_of),
    }
}
