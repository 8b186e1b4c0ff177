//! Workday career sites (CXS JSON API).
//!
//! The company slug is the full board URL, for example
//! `https://acme.wd5.myworkdayjobs.com/en-US/External`. Each company gets its
//! own cookie jar: the board page sets `CALYPSO_CSRF_TOKEN`, which the jobs
//! endpoint expects back as a header.
//!
//! Hosts that answer with an anti-bot challenge are remembered and skipped
//! for the rest of the run.

use crate::connectors::pool::run_companies;
use crate::error::{Result, ScanError};
use crate::http::{self, BROWSER_USER_AGENT};
use crate::limiter::HostLimiter;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use jobhunt_core::canonical::url_source_id;
use jobhunt_core::text::{infer_work_mode, normalize_location};
use jobhunt_core::{CompanyEntry, Fetcher, JobLead, ScrapeResult};
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::HeaderMap;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Source tag.
pub const SOURCE: &str = "workday";

const COMPANY_TIMEOUT: Duration = Duration::from_secs(20);
const PAGE_SIZE: usize = 50;
const MAX_OFFSET: usize = 5000;
const CSRF_COOKIE: &str = "CALYPSO_CSRF_TOKEN";

/// A parsed Workday board URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Board {
    /// `http` or `https`
    pub scheme: String,
    /// Board host, port included when non-default
    pub host: String,
    /// First host label
    pub tenant: String,
    /// Last path segment
    pub site: String,
    /// `xx-XX` locale when the path starts with one
    pub locale: Option<String>,
}

impl Board {
    /// Parse a board URL. A missing scheme defaults to `https`.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        let invalid = |reason: &str| ScanError::InvalidBoard {
            board: raw.to_string(),
            reason: reason.to_string(),
        };
        if raw.is_empty() {
            return Err(invalid("empty board url"));
        }

        let url = match Url::parse(raw) {
            Ok(url) => url,
            Err(url::ParseError::RelativeUrlWithoutBase) => {
                Url::parse(&format!("https://{raw}")).map_err(|e| invalid(&e.to_string()))?
            }
            Err(e) => return Err(invalid(&e.to_string())),
        };

        let host_name = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let labels: Vec<&str> = host_name.split('.').collect();
        if labels.len() < 3 {
            return Err(invalid("host needs at least three labels"));
        }
        let tenant = labels[0].to_string();

        let mut segments: Vec<&str> = url
            .path_segments()
            .map(|s| s.filter(|seg| !seg.is_empty()).collect())
            .unwrap_or_default();
        if segments.is_empty() {
            return Err(invalid("missing site in path"));
        }

        let mut locale = None;
        if segments.len() >= 2 && looks_like_locale(segments[0]) {
            locale = Some(normalize_locale(segments[0]));
            segments.remove(0);
        }
        let site = segments
            .last()
            .map(ToString::to_string)
            .ok_or_else(|| invalid("missing site in path"))?;

        let host = match url.port() {
            Some(port) => format!("{host_name}:{port}"),
            None => host_name.to_string(),
        };

        Ok(Self {
            scheme: url.scheme().to_string(),
            host,
            tenant,
            site,
            locale,
        })
    }

    /// `{scheme}://{host}`
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}://{}", self.scheme, self.host)
    }

    /// CXS jobs endpoint, with `?locale=` when the board has one.
    #[must_use]
    pub fn jobs_endpoint(&self) -> String {
        let base = format!(
            "{}/wday/cxs/{}/{}/jobs",
            self.origin(),
            self.tenant,
            self.site
        );
        match &self.locale {
            Some(locale) => format!("{base}?locale={locale}"),
            None => base,
        }
    }

    fn absolute_job_url(&self, posting: &Posting) -> Option<String> {
        if let Some(url) = non_empty(posting.external_url.as_deref()) {
            return Some(url.to_string());
        }
        let path = non_empty(posting.external_path.as_deref())?;
        if path.starts_with("http://") || path.starts_with("https://") {
            return Some(path.to_string());
        }
        let sep = if path.starts_with('/') { "" } else { "/" };
        Some(format!("{}{sep}{path}", self.origin()))
    }
}

fn looks_like_locale(s: &str) -> bool {
    let b = s.as_bytes();
    b.len() == 5
        && b[2] == b'-'
        && b[..2].iter().all(u8::is_ascii_alphabetic)
        && b[3..].iter().all(u8::is_ascii_alphabetic)
}

fn normalize_locale(s: &str) -> String {
    format!("{}-{}", s[..2].to_ascii_lowercase(), s[3..].to_ascii_uppercase())
}

fn non_empty(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct JobsRequest {
    applied_facets: serde_json::Map<String, serde_json::Value>,
    limit: usize,
    offset: usize,
    search_text: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct JobsResponse {
    total: usize,
    job_postings: Vec<Posting>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct Posting {
    id: Option<String>,
    title: Option<String>,
    external_path: Option<String>,
    external_url: Option<String>,
    locations_text: Option<String>,
    location: Option<String>,
    posted_on_date: Option<String>,
    job_requisition_id: Option<String>,
    #[serde(rename = "jobRequisitionID")]
    job_requisition_id_upper: Option<String>,
}

/// Parse Workday's posted date: RFC 3339, `YYYY-MM-DD`, or epoch seconds/ms.
#[must_use]
pub fn parse_posted_at(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    if let Ok(t) = DateTime::parse_from_rfc3339(raw) {
        return Some(t.with_timezone(&Utc));
    }
    if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return d.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
    }
    let n: i64 = raw.parse().ok()?;
    if n >= 1_000_000_000_000 {
        DateTime::from_timestamp_millis(n)
    } else {
        DateTime::from_timestamp(n, 0)
    }
}

/// Anti-bot challenge signals on a response.
fn looks_like_challenge(status: StatusCode, headers: &HeaderMap, body: &str) -> bool {
    if status == StatusCode::FORBIDDEN || status == StatusCode::TOO_MANY_REQUESTS {
        return true;
    }
    let mitigated = headers
        .get("cf-mitigated")
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("challenge"));
    if mitigated {
        return true;
    }
    let low = body.to_lowercase();
    low.contains("attention required")
        || (low.contains("cloudflare") && low.contains("checking your browser"))
        || low.contains("/cdn-cgi/")
}

/// Workday connector.
#[derive(Debug)]
pub struct WorkdayConnector {
    companies: Vec<CompanyEntry>,
    limiter: Arc<HostLimiter>,
    blocked: Mutex<HashSet<String>>,
}

impl WorkdayConnector {
    /// Create a connector for `companies` (slug = full board URL).
    #[must_use]
    pub fn new(companies: Vec<CompanyEntry>, limiter: Arc<HostLimiter>) -> Self {
        Self {
            companies,
            limiter,
            blocked: Mutex::new(HashSet::new()),
        }
    }

    /// True when `host` tripped the challenge detector during this run.
    #[must_use]
    pub fn is_blocked(&self, host: &str) -> bool {
        self.blocked.lock().is_ok_and(|set| set.contains(host))
    }

    fn mark_blocked(&self, host: &str) {
        if let Ok(mut set) = self.blocked.lock() {
            if set.insert(host.to_string()) {
                tracing::warn!("[workday] host {} is challenging requests; skipping it for this run", host);
            }
        }
    }

    async fn fetch_company(&self, company: CompanyEntry, cancel: CancellationToken) -> Result<Vec<JobLead>> {
        let board = Board::parse(&company.slug)?;
        if self.is_blocked(&board.host) {
            return Err(ScanError::Blocked { host: board.host });
        }

        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .cookie_provider(Arc::clone(&jar))
            .user_agent(BROWSER_USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()?;
        let session = Session {
            client,
            jar,
            board_url: company.slug.trim().to_string(),
            board,
            limiter: &self.limiter,
            cancel: &cancel,
        };

        let endpoint = session.board.jobs_endpoint();
        tracing::debug!("[workday] company={:?} endpoint={}", company.name, endpoint);

        let mut csrf = match session.bootstrap().await {
            Ok(token) => Some(token),
            Err(ScanError::Blocked { host }) => {
                self.mark_blocked(&host);
                return Err(ScanError::Blocked { host });
            }
            Err(ScanError::Cancelled) => return Err(ScanError::Cancelled),
            Err(e) => {
                tracing::debug!("[workday] bootstrap for {} failed: {}", company.name, e);
                None
            }
        };

        let mut leads = Vec::new();
        let mut offset = 0;
        loop {
            if cancel.is_cancelled() {
                break;
            }
            let request = JobsRequest {
                applied_facets: serde_json::Map::new(),
                limit: PAGE_SIZE,
                offset,
                search_text: String::new(),
            };

            let (status, headers, body) = match session.post_jobs(&endpoint, &request, csrf.as_deref()).await {
                Ok(page) => page,
                Err(ScanError::Cancelled) => break,
                Err(e) => return Err(e),
            };
            let body = if status.as_u16() < 400 {
                body
            } else if looks_like_challenge(status, &headers, &body) {
                self.mark_blocked(&session.board.host);
                return Err(ScanError::Blocked {
                    host: session.board.host.clone(),
                });
            } else if csrf.is_some() {
                return Err(ScanError::Status {
                    status: status.as_u16(),
                    url: endpoint,
                });
            } else {
                // Not bootstrapped yet: bootstrap and retry exactly once.
                let token = session.bootstrap().await.map_err(|e| {
                    if let ScanError::Blocked { host } = &e {
                        self.mark_blocked(host);
                    }
                    e
                })?;
                csrf = Some(token);
                let (status, headers, retry_body) =
                    session.post_jobs(&endpoint, &request, csrf.as_deref()).await?;
                if status.as_u16() >= 400 {
                    if looks_like_challenge(status, &headers, &retry_body) {
                        self.mark_blocked(&session.board.host);
                    }
                    tracing::debug!("[workday] retry body: {}", http::preview(&retry_body, 240));
                    return Err(ScanError::Status {
                        status: status.as_u16(),
                        url: endpoint,
                    });
                }
                retry_body
            };

            let page: JobsResponse =
                serde_json::from_str(&body).map_err(|e| ScanError::decode(&endpoint, e))?;
            if page.job_postings.is_empty() {
                break;
            }
            leads.extend(
                page.job_postings
                    .iter()
                    .filter_map(|p| lead_from_posting(&company, &session.board, p)),
            );

            offset += PAGE_SIZE;
            if (page.total > 0 && offset >= page.total) || offset > MAX_OFFSET {
                break;
            }
        }
        Ok(leads)
    }
}

struct Session<'a> {
    client: Client,
    jar: Arc<Jar>,
    board_url: String,
    board: Board,
    limiter: &'a HostLimiter,
    cancel: &'a CancellationToken,
}

impl Session<'_> {
    /// GET the board page and read the CSRF cookie it sets.
    async fn bootstrap(&self) -> Result<String> {
        let request = self
            .client
            .get(&self.board_url)
            .header(
                "Accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8",
            )
            .header("Accept-Language", "en-US");
        let response = http::send_raw(self.limiter, self.cancel, &self.board_url, request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let body = http::text(self.cancel, response).await?;

        if let Some(token) = self.csrf_cookie() {
            return Ok(token);
        }
        let preview: String = body.chars().take(4096).collect();
        if looks_like_challenge(status, &headers, &preview) {
            return Err(ScanError::Blocked {
                host: self.board.host.clone(),
            });
        }
        Err(ScanError::Bootstrap(format!(
            "missing {CSRF_COOKIE} cookie (status {})",
            status.as_u16()
        )))
    }

    fn csrf_cookie(&self) -> Option<String> {
        let url = Url::parse(&self.board_url).ok()?;
        let header = self.jar.cookies(&url)?;
        let cookies = header.to_str().ok()?;
        cookies
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, value)| *name == CSRF_COOKIE && !value.is_empty())
            .map(|(_, value)| value.to_string())
    }

    async fn post_jobs(
        &self,
        endpoint: &str,
        body: &JobsRequest,
        csrf: Option<&str>,
    ) -> Result<(StatusCode, HeaderMap, String)> {
        let mut request = self
            .client
            .post(endpoint)
            .header("Accept", "application/json")
            .header("Origin", self.board.origin())
            .header("Referer", self.board_url.trim_end_matches('/'))
            .header("Accept-Language", self.board.locale.as_deref().unwrap_or("en-US"))
            .json(body);
        if let Some(token) = csrf {
            request = request.header("x-calypso-csrf-token", token);
        }

        let response = http::send_raw(self.limiter, self.cancel, endpoint, request).await?;
        let status = response.status();
        let headers = response.headers().clone();
        let text = http::text(self.cancel, response).await?;
        Ok((status, headers, text))
    }
}

fn lead_from_posting(company: &CompanyEntry, board: &Board, posting: &Posting) -> Option<JobLead> {
    let title = non_empty(posting.title.as_deref())?;
    let url = board.absolute_job_url(posting)?;

    let location = normalize_location(
        non_empty(posting.locations_text.as_deref())
            .or_else(|| non_empty(posting.location.as_deref()))
            .unwrap_or_default(),
    );
    let job_id = non_empty(posting.job_requisition_id.as_deref())
        .or_else(|| non_empty(posting.job_requisition_id_upper.as_deref()))
        .or_else(|| non_empty(posting.id.as_deref()))
        .map_or_else(|| url_source_id(&url), ToString::to_string);
    let req_id = non_empty(posting.job_requisition_id.as_deref())
        .or_else(|| non_empty(posting.job_requisition_id_upper.as_deref()))
        .map(ToString::to_string);

    let mut lead = JobLead::new(SOURCE, company.name.clone(), title, url);
    lead.work_mode = infer_work_mode(&location, title, "");
    lead.location = location;
    lead.posted_at = posting.posted_on_date.as_deref().and_then(parse_posted_at);
    lead.source_job_id = Some(format!("workday:{}:{}:{}", board.tenant, board.site, job_id));
    lead.req_id = req_id;
    Some(lead)
}

#[async_trait]
impl Fetcher for WorkdayConnector {
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

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Datelike;

    #[test]
    fn test_parse_board_with_locale() {
        let board = Board::parse("https://acme.wd5.myworkdayjobs.com/EN-us/External_Careers/").expect("board");
        assert_eq!(board.tenant, "acme");
        assert_eq!(board.site, "External_Careers");
        assert_eq!(board.locale.as_deref(), Some("en-US"));
        assert_eq!(
            board.jobs_endpoint(),
            "https://acme.wd5.myworkdayjobs.com/wday/cxs/acme/External_Careers/jobs?locale=en-US"
        );
    }

    #[test]
    fn test_parse_board_without_scheme_or_locale() {
        let board = Board::parse("globex.wd1.myworkdayjobs.com/Careers").expect("board");
        assert_eq!(board.scheme, "https");
        assert_eq!(board.site, "Careers");
        assert_eq!(board.locale, None);
        assert_eq!(
            board.jobs_endpoint(),
            "https://globex.wd1.myworkdayjobs.com/wday/cxs/globex/Careers/jobs"
        );
    }

    #[test]
    fn test_parse_board_rejects_short_host() {
        assert!(Board::parse("https://myworkdayjobs.com/Careers").is_err());
        assert!(Board::parse("https://acme.wd5.myworkdayjobs.com/").is_err());
        assert!(Board::parse("").is_err());
    }

    #[test]
    fn test_parse_posted_at() {
        assert_eq!(parse_posted_at("2026-03-01").map(|t| t.day()), Some(1));
        assert!(parse_posted_at("2026-03-01T10:00:00Z").is_some());
        assert_eq!(parse_posted_at("1760000000").map(|t| t.year()), Some(2025));
        assert_eq!(parse_posted_at("1760000000000").map(|t| t.year()), Some(2025));
        assert!(parse_posted_at("Posted Today").is_none());
    }

    #[test]
    fn test_id_precedence() {
        let board = Board::parse("https://acme.wd5.myworkdayjobs.com/External").expect("board");
        let company = CompanyEntry {
            slug: "https://acme.wd5.myworkdayjobs.com/External".to_string(),
            name: "Acme".to_string(),
        };
        let posting: Posting = serde_json::from_str(
            r#"{"title": "SRE", "externalPath": "/job/Denver/SRE_R-1", "id": "abc",
                "jobRequisitionId": "R-1", "locationsText": "Denver, CO"}"#,
        )
        .expect("decode");

        let lead = lead_from_posting(&company, &board, &posting).expect("lead");
        assert_eq!(lead.url, "https://acme.wd5.myworkdayjobs.com/job/Denver/SRE_R-1");
        assert_eq!(lead.source_job_id.as_deref(), Some("workday:acme:External:R-1"));
        assert_eq!(lead.req_id.as_deref(), Some("R-1"));

        let bare: Posting =
            serde_json::from_str(r#"{"title": "SRE", "externalPath": "job/x"}"#).expect("decode");
        let lead = lead_from_posting(&company, &board, &bare).expect("lead");
        let expected = format!(
            "workday:acme:External:{}",
            url_source_id("https://acme.wd5.myworkdayjobs.com/job/x")
        );
        assert_eq!(lead.source_job_id.as_deref(), Some(expected.as_str()));
    }

    #[test]
    fn test_challenge_detection() {
        let empty = HeaderMap::new();
        assert!(looks_like_challenge(StatusCode::FORBIDDEN, &empty, ""));
        assert!(looks_like_challenge(StatusCode::OK, &empty, "<title>Attention Required!</title>"));
        assert!(looks_like_challenge(StatusCode::OK, &empty, "<script src=\"/cdn-cgi/x.js\">"));
        assert!(!looks_like_challenge(StatusCode::BAD_REQUEST, &empty, "{\"error\":\"bad\"}"));

        let mut headers = HeaderMap::new();
        headers.insert("cf-mitigated", "challenge".parse().expect("header"));
        assert!(looks_like_challenge(StatusCode::OK, &headers, ""));
    }
}
