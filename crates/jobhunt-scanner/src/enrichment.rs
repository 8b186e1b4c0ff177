//! Best-effort company enrichment: official domain and logo.
//!
//! Domains come from the `company_domains` table or, on a miss, from the
//! first DuckDuckGo HTML result that is not a job board. Logos are fetched
//! from a small allow-list of image hosts and stored in the `logos` table
//! keyed by the SHA-256 of their URL.
//!
//! Nothing here ever blocks insertion: every failure resolves to "no
//! domain" or "no logo".

use crate::error::{Result, ScanError};
use crate::http::{self, BROWSER_USER_AGENT};
use crate::limiter::HostLimiter;
use jobhunt_db::{company_domains, logos};
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use scraper::{Html, Selector};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

const SEARCH_URL: &str = "https://duckduckgo.com/html/";
const FAVICON_URL: &str = "https://www.google.com/s2/favicons";

const SEARCH_TIMEOUT: Duration = Duration::from_secs(12);
const LOGO_TIMEOUT: Duration = Duration::from_secs(15);

/// Largest logo stored.
pub const MAX_LOGO_BYTES: usize = 512 * 1024;

/// Aggregators and ATS hosts that never count as a company's own domain.
const BLOCKED_DOMAINS: [&str; 20] = [
    "linkedin.com",
    "indeed.com",
    "glassdoor.com",
    "ziprecruiter.com",
    "monster.com",
    "careerbuilder.com",
    "simplyhired.com",
    "builtin.com",
    "levels.fyi",
    "crunchbase.com",
    "wikipedia.org",
    "greenhouse.io",
    "boards.greenhouse.io",
    "lever.co",
    "myworkdayjobs.com",
    "workday.com",
    "smartrecruiters.com",
    "icims.com",
    "jobvite.com",
    "applytojob.com",
];

/// Removed from company names before searching.
const NAME_NOISE: [&str; 10] = [
    ", Inc.",
    " Inc.",
    " Inc",
    ", LLC",
    " LLC",
    ", Ltd.",
    " Ltd.",
    " Ltd",
    " Recruiting",
    " Staffing",
];

/// Per-cycle lookup memo. Empty values record misses so a failing company
/// or domain is tried once per cycle.
#[derive(Debug, Default)]
pub struct EnrichmentCache {
    domains: HashMap<String, String>,
    logos: HashMap<String, String>,
}

impl EnrichmentCache {
    /// Empty cache.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Domain and logo resolver.
#[derive(Debug, Clone)]
pub struct Enricher {
    client: Client,
    limiter: Arc<HostLimiter>,
    search_url: String,
    favicon_url: String,
    extra_logo_hosts: Vec<String>,
}

impl Enricher {
    /// Create an enricher using the public search and favicon services.
    pub fn new(limiter: Arc<HostLimiter>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(BROWSER_USER_AGENT)
            .timeout(LOGO_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            limiter,
            search_url: SEARCH_URL.to_string(),
            favicon_url: FAVICON_URL.to_string(),
            extra_logo_hosts: Vec::new(),
        })
    }

    /// Use a different search endpoint.
    #[must_use]
    pub fn with_search_url(mut self, url: impl Into<String>) -> Self {
        self.search_url = url.into();
        self
    }

    /// Use a different favicon endpoint.
    #[must_use]
    pub fn with_favicon_url(mut self, url: impl Into<String>) -> Self {
        self.favicon_url = url.into();
        self
    }

    /// Also accept logos served from `host`.
    #[must_use]
    pub fn with_allowed_logo_host(mut self, host: impl Into<String>) -> Self {
        self.extra_logo_hosts.push(host.into().to_ascii_lowercase());
        self
    }

    /// Resolve a logo key for a freshly stored job.
    ///
    /// Tries the lead's own logo URL first, then the favicon of the
    /// company's domain. Returns `None` when neither yields an image.
    pub async fn logo_key(
        &self,
        pool: &Pool<Sqlite>,
        cache: &mut EnrichmentCache,
        cancel: &CancellationToken,
        company: &str,
        logo_url: Option<&str>,
    ) -> Option<String> {
        if let Some(url) = logo_url.map(str::trim).filter(|u| !u.is_empty()) {
            match self.cache_logo(pool, cancel, url).await {
                Ok(Some(key)) => return Some(key),
                Ok(None) => {}
                Err(e) => tracing::debug!("[logo] lead logo {} failed: {}", url, e),
            }
        }

        let domain = self.company_domain(pool, cache, cancel, company).await?;
        if let Some(key) = cache.logos.get(&domain) {
            return (!key.is_empty()).then(|| key.clone());
        }

        let key = match self.favicon_url_for(&domain) {
            Some(favicon) => match self.cache_logo(pool, cancel, &favicon).await {
                Ok(key) => key,
                Err(e) => {
                    tracing::debug!("[logo] favicon for {} failed: {}", domain, e);
                    None
                }
            },
            None => None,
        };
        cache.logos.insert(domain, key.clone().unwrap_or_default());
        key
    }

    /// Company domain from the cycle cache, the database, or a web search.
    pub async fn company_domain(
        &self,
        pool: &Pool<Sqlite>,
        cache: &mut EnrichmentCache,
        cancel: &CancellationToken,
        company: &str,
    ) -> Option<String> {
        let cache_key = company_domains::normalize_company_key(company);
        if cache_key.is_empty() {
            return None;
        }
        if let Some(domain) = cache.domains.get(&cache_key) {
            return (!domain.is_empty()).then(|| domain.clone());
        }

        let domain = match self.lookup_domain(pool, cancel, company).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!("[logo] domain lookup company={:?} failed: {}", company, e);
                None
            }
        };
        if domain.is_none() {
            tracing::debug!("[logo] no domain company={:?}", company);
        }
        cache.domains.insert(cache_key, domain.clone().unwrap_or_default());
        domain
    }

    async fn lookup_domain(
        &self,
        pool: &Pool<Sqlite>,
        cancel: &CancellationToken,
        company: &str,
    ) -> Result<Option<String>> {
        if let Some(domain) = company_domains::get_company_domain(pool, company).await? {
            if !domain.is_empty() {
                return Ok(Some(domain));
            }
        }

        let Some(domain) = self.search_domain(cancel, company).await? else {
            return Ok(None);
        };
        company_domains::upsert_company_domain(pool, company, &domain).await?;
        Ok(Some(domain))
    }

    async fn search_domain(&self, cancel: &CancellationToken, company: &str) -> Result<Option<String>> {
        let name = sanitize_company(company);
        if name.is_empty() {
            return Ok(None);
        }
        let query = format!("{name} official website");
        let url = Url::parse_with_params(&self.search_url, &[("q", query.as_str())])
            .map_err(|e| ScanError::decode(&self.search_url, e))?;

        let request = self.client.get(url.as_str()).timeout(SEARCH_TIMEOUT);
        let response = http::send(&self.limiter, cancel, url.as_str(), request).await?;
        let html = http::text(cancel, response).await?;
        Ok(first_result_domain(&html))
    }

    fn favicon_url_for(&self, domain: &str) -> Option<String> {
        let domain = domain.trim().to_ascii_lowercase();
        let domain = domain
            .trim_start_matches("http://")
            .trim_start_matches("https://")
            .trim_start_matches("www.")
            .trim_matches('/');
        if domain.is_empty() {
            return None;
        }
        Url::parse_with_params(&self.favicon_url, &[("domain", domain), ("sz", "64")])
            .ok()
            .map(String::from)
    }

    fn logo_host_allowed(&self, host: &str) -> bool {
        is_allowed_logo_host(host) || self.extra_logo_hosts.iter().any(|h| h == host)
    }

    /// Download and store the image at `raw_url`, returning its key.
    ///
    /// `Ok(None)` means the URL was not eligible or the response was not a
    /// usable image.
    pub async fn cache_logo(
        &self,
        pool: &Pool<Sqlite>,
        cancel: &CancellationToken,
        raw_url: &str,
    ) -> Result<Option<String>> {
        let raw = raw_url.trim();
        let raw = raw.split_once('#').map_or(raw, |(head, _)| head.trim());
        if raw.is_empty() || raw.contains("media.licdn.com") {
            return Ok(None);
        }
        let Ok(url) = Url::parse(raw) else {
            return Ok(None);
        };
        let Some(host) = url.host_str().map(str::to_ascii_lowercase) else {
            return Ok(None);
        };
        if !self.logo_host_allowed(&host) {
            return Ok(None);
        }

        let key = logos::logo_key_for_url(raw);
        if logos::logo_exists(pool, &key).await? {
            return Ok(Some(key));
        }

        let request = self
            .client
            .get(raw)
            .header("Accept", "image/avif,image/webp,image/apng,image/*,*/*;q=0.8")
            .header("Referer", "https://www.linkedin.com/")
            .header("Accept-Language", "en-US,en;q=0.9")
            .timeout(LOGO_TIMEOUT);
        let response = http::send(&self.limiter, cancel, raw, request).await?;

        if response
            .content_length()
            .is_some_and(|len| len > MAX_LOGO_BYTES as u64)
        {
            tracing::debug!("[logo] {} too large", raw);
            return Ok(None);
        }
        let header_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim().to_string())
            .unwrap_or_default();
        let Some(bytes) = read_capped(response, cancel, MAX_LOGO_BYTES).await? else {
            tracing::debug!("[logo] {} too large", raw);
            return Ok(None);
        };
        if bytes.is_empty() {
            return Ok(None);
        }

        let content_type = if header_type.starts_with("image/") {
            header_type
        } else if let Some(sniffed) = sniff_image_type(&bytes) {
            sniffed.to_string()
        } else {
            tracing::debug!("[logo] {} is not an image ({:?})", raw, header_type);
            return Ok(None);
        };

        logos::put_logo(pool, &key, &content_type, &bytes).await?;
        tracing::debug!("[logo] cached {} as {}", raw, key);
        Ok(Some(key))
    }
}

/// Read a body chunk by chunk, giving up with `None` once it exceeds `max`
/// bytes whatever the response headers claimed.
async fn read_capped(
    mut response: reqwest::Response,
    cancel: &CancellationToken,
    max: usize,
) -> Result<Option<Vec<u8>>> {
    let mut body = Vec::new();
    loop {
        let chunk = tokio::select! {
            chunk = response.chunk() => chunk?,
            () = cancel.cancelled() => return Err(ScanError::Cancelled),
        };
        let Some(chunk) = chunk else {
            return Ok(Some(body));
        };
        if body.len() + chunk.len() > max {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }
}

/// Google and LinkedIn image CDNs.
fn is_allowed_logo_host(host: &str) -> bool {
    host == "www.google.com"
        || host == "google.com"
        || host.ends_with("googleusercontent.com")
        || (host.starts_with("media-exp") && host.ends_with(".licdn.com"))
}

/// True if `host` is, or is a subdomain of, a blocked domain.
#[must_use]
pub fn is_blocked_domain(host: &str) -> bool {
    BLOCKED_DOMAINS
        .iter()
        .any(|b| host == *b || host.strip_suffix(b).is_some_and(|rest| rest.ends_with('.')))
}

/// Strip legal-form and agency suffixes and collapse whitespace.
#[must_use]
pub fn sanitize_company(name: &str) -> String {
    let mut out = name.trim().to_string();
    for noise in NAME_NOISE {
        out = out.replace(noise, "");
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Follow a DuckDuckGo `/l/?uddg=` redirect to its target.
fn decode_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{href}")
    } else {
        href.to_string()
    };
    let parsed = Url::parse(&absolute).or_else(|_| Url::parse("https://duckduckgo.com")?.join(href));
    parsed
        .ok()
        .and_then(|u| {
            u.query_pairs()
                .find(|(k, v)| k == "uddg" && !v.is_empty())
                .map(|(_, v)| v.into_owned())
        })
        .unwrap_or(absolute)
}

/// Host of the first non-blocked result link, without `www.`.
fn first_result_domain(html: &str) -> Option<String> {
    static RESULT: OnceLock<Selector> = OnceLock::new();
    let selector = RESULT.get_or_init(|| Selector::parse("a.result__a").expect("valid selector"));

    let doc = Html::parse_document(html);
    doc.select(selector)
        .filter_map(|a| a.value().attr("href").map(str::trim))
        .filter(|href| !href.is_empty())
        .filter_map(|href| {
            let target = decode_redirect(href);
            let url = Url::parse(&target).ok()?;
            let host = url.host_str()?.to_ascii_lowercase();
            let host = host.strip_prefix("www.").unwrap_or(&host).to_string();
            (!host.is_empty()).then_some(host)
        })
        .find(|host| !is_blocked_domain(host))
}

/// Content type from magic bytes, for servers that mislabel images.
fn sniff_image_type(bytes: &[u8]) -> Option<&'static str> {
    infer::get(bytes)
        .filter(|kind| kind.matcher_type() == infer::MatcherType::Image)
        .map(|kind| kind.mime_type())
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhunt_db::Database;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const PNG: &[u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";

    async fn db() -> Database {
        let db = Database::new(":memory:").await.expect("open db");
        db.run_migrations().await.expect("migrate");
        db
    }

    fn enricher(server: &MockServer) -> Enricher {
        Enricher::new(Arc::new(HostLimiter::new(100.0, 100)))
            .expect("enricher")
            .with_search_url(format!("{}/html/", server.uri()))
            .with_favicon_url(format!("{}/s2/favicons", server.uri()))
            .with_allowed_logo_host("127.0.0.1")
    }

    #[test]
    fn test_sanitize_company() {
        assert_eq!(sanitize_company("  Acme, Inc. "), "Acme");
        assert_eq!(sanitize_company("Initech  LLC"), "Initech");
        assert_eq!(sanitize_company("Hooli Staffing"), "Hooli");
    }

    #[test]
    fn test_blocked_domains() {
        assert!(is_blocked_domain("linkedin.com"));
        assert!(is_blocked_domain("uk.linkedin.com"));
        assert!(is_blocked_domain("acme.wd5.myworkdayjobs.com"));
        assert!(!is_blocked_domain("notlinkedin.com"));
        assert!(!is_blocked_domain("acme.com"));
    }

    #[test]
    fn test_first_result_skips_job_boards() {
        let html = r#"
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.linkedin.com%2Fcompany%2Facme&rut=x">LinkedIn</a>
            <a class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fwww.Acme.com%2F&rut=y">Acme</a>
            <a class="result__a" href="https://acme.org/">Other</a>
        "#;
        assert_eq!(first_result_domain(html).as_deref(), Some("acme.com"));
        assert_eq!(first_result_domain("<p>no results</p>"), None);
    }

    #[test]
    fn test_logo_host_allow_list() {
        assert!(is_allowed_logo_host("www.google.com"));
        assert!(is_allowed_logo_host("lh3.googleusercontent.com"));
        assert!(is_allowed_logo_host("media-exp1.licdn.com"));
        assert!(!is_allowed_logo_host("media.licdn.com"));
        assert!(!is_allowed_logo_host("evil.example.com"));
    }

    #[test]
    fn test_sniff_image_type() {
        assert_eq!(sniff_image_type(PNG), Some("image/png"));
        assert_eq!(sniff_image_type(b"<html>"), None);
        assert_eq!(sniff_image_type(b"GIF89a\x01\x00\x01\x00"), Some("image/gif"));
        // Recognized, but not an image.
        assert_eq!(sniff_image_type(b"%PDF-1.7\n"), None);
    }

    #[tokio::test]
    async fn test_cache_logo_stores_image_once() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/logo.png"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let db = db().await;
        let enricher = enricher(&server);
        let cancel = CancellationToken::new();
        let url = format!("{}/logo.png#frag", server.uri());

        let key = enricher.cache_logo(db.pool(), &cancel, &url).await.expect("cache");
        let key = key.expect("stored");
        assert_eq!(key, logos::logo_key_for_url(&format!("{}/logo.png", server.uri())));

        // Second call is served from the table; the mock expects one hit.
        let again = enricher.cache_logo(db.pool(), &cancel, &url).await.expect("cache");
        assert_eq!(again.as_deref(), Some(key.as_str()));

        let logo = logos::get_logo(db.pool(), &key).await.expect("get").expect("logo");
        assert_eq!(logo.content_type, "image/png");
    }

    /// Serve one chunked response of `total` bytes with no Content-Length.
    async fn chunked_image_server(total: usize) -> String {
        use tokio::io::{AsyncReadExt, AsyncWriteExt};

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
        let addr = listener.local_addr().expect("addr");
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.expect("accept");
            let mut request = [0u8; 4096];
            let _ = socket.read(&mut request).await;

            let mut response = b"HTTP/1.1 200 OK\r\nContent-Type: image/png\r\nTransfer-Encoding: chunked\r\nConnection: close\r\n\r\n".to_vec();
            let chunk = vec![0xabu8; 64 * 1024];
            let mut sent = 0;
            while sent < total {
                let n = chunk.len().min(total - sent);
                response.extend_from_slice(format!("{n:x}\r\n").as_bytes());
                response.extend_from_slice(&chunk[..n]);
                response.extend_from_slice(b"\r\n");
                sent += n;
            }
            response.extend_from_slice(b"0\r\n\r\n");
            // The client hangs up early on oversized bodies.
            let _ = socket.write_all(&response).await;
        });
        format!("http://{addr}")
    }

    fn local_enricher() -> Enricher {
        Enricher::new(Arc::new(HostLimiter::new(100.0, 100)))
            .expect("enricher")
            .with_allowed_logo_host("127.0.0.1")
    }

    #[tokio::test]
    async fn test_cache_logo_caps_chunked_body() {
        let db = db().await;
        let cancel = CancellationToken::new();

        let big = chunked_image_server(MAX_LOGO_BYTES + 64 * 1024).await;
        let url = format!("{big}/huge.png");
        let stored = local_enricher()
            .cache_logo(db.pool(), &cancel, &url)
            .await
            .expect("cache");
        assert_eq!(stored, None);
        assert!(!logos::logo_exists(db.pool(), &logos::logo_key_for_url(&url))
            .await
            .expect("exists"));

        let small = chunked_image_server(2048).await;
        let stored = local_enricher()
            .cache_logo(db.pool(), &cancel, &format!("{small}/small.png"))
            .await
            .expect("cache");
        let key = stored.expect("small logo stored");
        let logo = logos::get_logo(db.pool(), &key).await.expect("get").expect("logo");
        assert_eq!(logo.bytes.len(), 2048);
    }

    #[tokio::test]
    async fn test_cache_logo_rejects_non_images_and_foreign_hosts() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/page"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(b"<html></html>".to_vec(), "text/html"))
            .mount(&server)
            .await;

        let db = db().await;
        let cancel = CancellationToken::new();
        let enricher = enricher(&server);

        let page = enricher
            .cache_logo(db.pool(), &cancel, &format!("{}/page", server.uri()))
            .await
            .expect("cache");
        assert_eq!(page, None);

        let foreign = enricher
            .cache_logo(db.pool(), &cancel, "https://media.licdn.com/dms/image/x")
            .await
            .expect("cache");
        assert_eq!(foreign, None);
    }

    #[tokio::test]
    async fn test_logo_key_via_search_and_favicon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .and(query_param("q", "Acme official website"))
            .respond_with(ResponseTemplate::new(200).set_body_string(
                r#"<a class="result__a" href="/l/?uddg=https%3A%2F%2Fwww.acme.com%2F">Acme</a>"#,
            ))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/s2/favicons"))
            .and(query_param("domain", "acme.com"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(PNG.to_vec(), "image/png"))
            .expect(1)
            .mount(&server)
            .await;

        let db = db().await;
        let enricher = enricher(&server);
        let cancel = CancellationToken::new();
        let mut cache = EnrichmentCache::new();

        let first = enricher
            .logo_key(db.pool(), &mut cache, &cancel, "Acme, Inc.", None)
            .await;
        assert!(first.is_some());

        // Same cycle: both lookups are memoized.
        let second = enricher
            .logo_key(db.pool(), &mut cache, &cancel, "acme,  inc.", None)
            .await;
        assert_eq!(first, second);

        let stored = company_domains::get_company_domain(db.pool(), "Acme, Inc.")
            .await
            .expect("get");
        assert_eq!(stored.as_deref(), Some("acme.com"));
    }

    #[tokio::test]
    async fn test_failed_search_is_cached_for_the_cycle() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/html/"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1)
            .mount(&server)
            .await;

        let db = db().await;
        let enricher = enricher(&server);
        let cancel = CancellationToken::new();
        let mut cache = EnrichmentCache::new();

        for _ in 0..3 {
            let key = enricher
                .logo_key(db.pool(), &mut cache, &cancel, "Globex", None)
                .await;
            assert_eq!(key, None);
        }
    }
}
