//! Greenhouse hosted job boards (HTML).
//!
//! The board page lists postings as anchors to `/<slug>/jobs/<id>`; each
//! posting is then hydrated from its own page.

use crate::connectors::pool::run_companies;
use crate::error::{Result, ScanError};
use crate::http;
use crate::limiter::HostLimiter;
use async_trait::async_trait;
use jobhunt_core::text::{
    clean_text, extract_labeled_location, infer_work_mode, looks_like_junk_title,
    normalize_location,
};
use jobhunt_core::{CompanyEntry, Fetcher, JobLead, ScrapeResult};
use reqwest::Client;
use scraper::{Html, Selector};
use std::collections::HashSet;
use std::sync::{Arc, OnceLock};
use tokio_util::sync::CancellationToken;
use url::Url;

/// Source tag.
pub const SOURCE: &str = "greenhouse";

const DEFAULT_BASE_URL: &str = "https://boards.greenhouse.io";

/// Greenhouse connector.
#[derive(Debug, Clone)]
pub struct GreenhouseConnector {
    companies: Vec<CompanyEntry>,
    client: Client,
    limiter: Arc<HostLimiter>,
    base_url: String,
}

impl GreenhouseConnector {
    /// Create a connector for `companies` (slug = board token).
    #[must_use]
    pub fn new(companies: Vec<CompanyEntry>, client: Client, limiter: Arc<HostLimiter>) -> Self {
        Self {
            companies,
            client,
            limiter,
            base_url: DEFAULT_BASE_URL.to_string(),
        }
    }

    /// Point the connector at a different board host.
    #[must_use]
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    async fn fetch_company(&self, company: CompanyEntry, cancel: CancellationToken) -> Result<Vec<JobLead>> {
        let board_url = format!("{}/{}", self.base_url, company.slug);
        let board = Url::parse(&board_url).map_err(|e| ScanError::InvalidBoard {
            board: board_url.clone(),
            reason: e.to_string(),
        })?;

        let html = http::get_text(&self.client, &self.limiter, &cancel, &board_url).await?;
        let postings = parse_board(&html, &board, &company.slug);

        let mut leads = Vec::with_capacity(postings.len());
        for posting in postings {
            let mut lead = JobLead::new(SOURCE, company.name.clone(), posting.title, posting.url);
            lead.source_job_id = Some(posting.source_id);

            match self.hydrate(&mut lead, &cancel).await {
                Ok(()) => {}
                Err(ScanError::Cancelled) => {
                    leads.push(lead);
                    break;
                }
                Err(e) => tracing::debug!("[greenhouse] hydrate {} failed: {}", lead.url, e),
            }
            leads.push(lead);
        }
        Ok(leads)
    }

    async fn hydrate(&self, lead: &mut JobLead, cancel: &CancellationToken) -> Result<()> {
        let html = http::get_text(&self.client, &self.limiter, cancel, &lead.url).await?;
        let page = parse_job_page(&html);

        if lead.title.is_empty() {
            if let Some(title) = page.title {
                lead.title = title;
            }
        }
        if let Some(location) = page.location {
            lead.location = normalize_location(&location);
        }
        if let Some(description) = page.description {
            lead.description = description;
        }
        lead.work_mode = infer_work_mode(&lead.location, &lead.title, "");
        Ok(())
    }
}

#[async_trait]
impl Fetcher for GreenhouseConnector {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, cancel: CancellationToken) -> jobhunt_core::Result<ScrapeResult> {
        let leads = run_companies(SOURCE, &self.companies, &cancel, None, |company, token| {
            self.fetch_company(company, token)
        })
        .await;
        Ok(ScrapeResult::new(SOURCE, leads))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct BoardPosting {
    source_id: String,
    url: String,
    title: String,
}

#[derive(Debug, Default)]
struct JobPage {
    title: Option<String>,
    location: Option<String>,
    description: Option<String>,
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid selector"))
}

/// Digits immediately after the first `/jobs/`.
fn extract_job_id(url: &str) -> Option<String> {
    let (_, tail) = url.split_once("/jobs/")?;
    let id: String = tail.chars().take_while(char::is_ascii_digit).collect();
    (!id.is_empty()).then_some(id)
}

fn parse_board(html: &str, board: &Url, slug: &str) -> Vec<BoardPosting> {
    static ANCHOR: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for anchor in doc.select(selector(&ANCHOR, "a[href]")) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            continue;
        }
        let Ok(abs) = board.join(href) else {
            continue;
        };
        if abs.host_str() != board.host_str() || !abs.path().to_lowercase().contains("/jobs/") {
            continue;
        }
        let Some(id) = extract_job_id(abs.path()) else {
            continue;
        };

        let source_id = format!("greenhouse:{slug}:{id}");
        if !seen.insert(source_id.clone()) {
            continue;
        }

        let mut title = clean_text(&anchor.text().collect::<String>());
        if looks_like_junk_title(&title) {
            title.clear();
        }

        out.push(BoardPosting {
            source_id,
            url: abs.to_string(),
            title,
        });
    }
    out
}

fn parse_job_page(html: &str) -> JobPage {
    static H1: OnceLock<Selector> = OnceLock::new();
    static LOCATION: OnceLock<Selector> = OnceLock::new();
    static CONTENT: OnceLock<Selector> = OnceLock::new();
    static TEXT_BLOCKS: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let first_text = |sel: &Selector| {
        doc.select(sel)
            .next()
            .map(|el| clean_text(&el.text().collect::<Vec<_>>().join(" ")))
            .filter(|t| !t.is_empty())
    };

    let title = first_text(selector(&H1, "h1"));
    let location = first_text(selector(&LOCATION, ".location")).or_else(|| {
        doc.select(selector(&TEXT_BLOCKS, "p, li, dd, span, div"))
            .find_map(|el| extract_labeled_location(&el.text().collect::<Vec<_>>().join(" ")))
    });
    let description = doc
        .select(selector(&CONTENT, "#content"))
        .next()
        .map(|el| el.inner_html());

    JobPage {
        title,
        location,
        description,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_job_id() {
        assert_eq!(extract_job_id("/acme/jobs/4012345?gh_src=x").as_deref(), Some("4012345"));
        assert_eq!(extract_job_id("/acme/jobs/abc"), None);
        assert_eq!(extract_job_id("/acme/about"), None);
    }

    #[test]
    fn test_parse_board() {
        let html = r#"
            <a href="/acme/jobs/101">Senior Rust Engineer</a>
            <a href="/acme/jobs/101">View job</a>
            <a href="https://boards.greenhouse.io/acme/jobs/202?gh_jid=202">Apply now</a>
            <a href="https://other.example.com/jobs/303">Elsewhere</a>
            <a href="/acme/about">About</a>
        "#;
        let board = Url::parse("https://boards.greenhouse.io/acme").expect("url");
        let postings = parse_board(html, &board, "acme");

        assert_eq!(postings.len(), 2);
        assert_eq!(postings[0].source_id, "greenhouse:acme:101");
        assert_eq!(postings[0].url, "https://boards.greenhouse.io/acme/jobs/101");
        assert_eq!(postings[0].title, "Senior Rust Engineer");
        assert_eq!(postings[1].source_id, "greenhouse:acme:202");
        assert!(postings[1].title.is_empty());
    }

    #[test]
    fn test_parse_job_page_label_fallback() {
        let html = r#"
            <h1>Platform Engineer</h1>
            <p>Location: Denver, CO | Full time</p>
            <div id="content"><p>Build things.</p></div>
        "#;
        let page = parse_job_page(html);
        assert_eq!(page.title.as_deref(), Some("Platform Engineer"));
        assert_eq!(page.location.as_deref(), Some("Denver, CO"));
        assert_eq!(page.description.as_deref(), Some("<p>Build things.</p>"));
    }
}
