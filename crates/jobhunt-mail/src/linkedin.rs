//! LinkedIn job-alert digest parser.
//!
//! A digest lists several jobs; each job usually has more than one anchor
//! (logo, title, "view job" button) pointing at the same posting. Anchors
//! are merged by job id so that whichever anchor carries the title wins,
//! regardless of document order.

use jobhunt_core::text::clean_text;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use std::collections::HashMap;
use std::sync::OnceLock;
use url::Url;

/// One job extracted from a digest.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkedInJob {
    /// Posting title
    pub title: String,
    /// Company name
    pub company: String,
    /// Location text
    pub location: String,
    /// Salary range text, if shown
    pub salary: String,
    /// Posting URL with redirect wrappers removed
    pub url: String,
    /// Company logo image URL
    pub logo_url: String,
    /// `linkedin:<id>` when the URL carries a job id
    pub source_id: Option<String>,
}

fn salary_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\$\s?\d[\d,]*(?:K|M)?\s*(?:-\s*\$\s?\d[\d,]*(?:K|M)?)?\s*/\s*year")
            .expect("valid regex")
    })
}

fn job_id_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"/jobs/view/(\d+)").expect("valid regex"))
}

fn selector(cell: &'static OnceLock<Selector>, css: &str) -> &'static Selector {
    cell.get_or_init(|| Selector::parse(css).expect("valid selector"))
}

/// True when a message is a LinkedIn job alert.
///
/// The subject must look like an alert and the body must actually link to
/// job postings.
#[must_use]
pub fn looks_like_job_alert(subject: &str, body: &str) -> bool {
    let subject = subject.to_lowercase();
    if !(subject.contains("job alert") || subject.contains("linkedin")) {
        return false;
    }
    let body = body.to_lowercase();
    body.contains("linkedin.com/comm/jobs/view") || body.contains("linkedin.com/jobs/view")
}

/// Extract jobs from a digest's HTML body.
///
/// Jobs without a URL or a title are dropped. Output follows the order in
/// which each job was first seen.
#[must_use]
pub fn parse_job_alert_html(html: &str) -> Vec<LinkedInJob> {
    static ANCHOR: OnceLock<Selector> = OnceLock::new();
    static PARA: OnceLock<Selector> = OnceLock::new();
    static IMG: OnceLock<Selector> = OnceLock::new();

    let doc = Html::parse_document(html);
    let mut jobs: Vec<LinkedInJob> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for anchor in doc.select(selector(&ANCHOR, "a[href]")) {
        let href = anchor.value().attr("href").unwrap_or_default().trim();
        if href.is_empty() {
            continue;
        }
        let lower = href.to_lowercase();
        if !lower.contains("linkedin.com") || !lower.contains("/jobs/view/") {
            continue;
        }

        let Some(job_url) = unwrap_redirect(href) else {
            continue;
        };
        let source_id = job_id_re()
            .captures(&job_url)
            .map(|caps| format!("linkedin:{}", &caps[1]));
        let key = source_id.clone().unwrap_or_else(|| job_url.clone());

        let slot = *index.entry(key).or_insert_with(|| {
            jobs.push(LinkedInJob {
                url: job_url.clone(),
                source_id: source_id.clone(),
                ..LinkedInJob::default()
            });
            jobs.len() - 1
        });
        let job = &mut jobs[slot];

        let candidate = strip_bad_title_suffixes(&element_text(&anchor));
        if better_title(&candidate, &job.title) {
            job.title = candidate;
        }

        let Some(card) = card_for(&anchor) else {
            continue;
        };

        for p in card.select(selector(&PARA, "p")) {
            let text = element_text(&p);
            if text.is_empty() {
                continue;
            }
            if job.company.is_empty() && job.location.is_empty() {
                if let Some((company, location)) = text.split_once(" · ") {
                    job.company = company.trim().to_string();
                    job.location = location.trim().to_string();
                }
            }
            let candidate = strip_bad_title_suffixes(&text);
            if !candidate.contains(" · ") && better_title(&candidate, &job.title) {
                job.title = candidate;
            }
        }

        if job.logo_url.is_empty() {
            if let Some(img) = card.select(selector(&IMG, "img")).next() {
                let src = ["src", "data-src"]
                    .iter()
                    .filter_map(|attr| img.value().attr(attr))
                    .map(str::trim)
                    .find(|s| !s.is_empty());
                if let Some(src) = src {
                    job.logo_url = src.to_string();
                }
            }
        }

        if job.salary.is_empty() {
            if let Some(m) = salary_re().find(&element_text(&card)) {
                job.salary = m.as_str().trim().to_string();
            }
        }
    }

    jobs.retain(|j| !j.url.trim().is_empty() && !j.title.trim().is_empty());
    jobs
}

fn element_text(el: &ElementRef<'_>) -> String {
    clean_text(&el.text().collect::<Vec<_>>().join(" "))
}

/// Closest `table`, else closest `tr`, else the parent element.
fn card_for<'a>(anchor: &ElementRef<'a>) -> Option<ElementRef<'a>> {
    let closest = |name: &str| {
        anchor
            .ancestors()
            .filter_map(ElementRef::wrap)
            .find(|e| e.value().name() == name)
    };
    closest("table")
        .or_else(|| closest("tr"))
        .or_else(|| anchor.parent().and_then(ElementRef::wrap))
}

/// Resolve `?url=` wrappers and Google `/url?q=` redirects.
///
/// Relative links are returned unchanged; unparseable ones yield `None`.
#[must_use]
pub fn unwrap_redirect(href: &str) -> Option<String> {
    let url = match Url::parse(href) {
        Ok(url) => url,
        Err(url::ParseError::RelativeUrlWithoutBase) => return Some(href.to_string()),
        Err(_) => return None,
    };

    let param = |name: &str| {
        url.query_pairs()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.into_owned())
            .filter(|v| !v.is_empty())
    };
    let absolute = |raw: String| Url::parse(&raw).ok().filter(Url::has_host).map(String::from);

    if let Some(inner) = param("url").and_then(absolute) {
        return Some(inner);
    }

    let google = url.host_str().is_some_and(|h| h.to_lowercase().contains("google."));
    if google && url.path().starts_with("/url") {
        if let Some(inner) = param("q").and_then(absolute) {
            return Some(inner);
        }
    }

    Some(url.to_string())
}

/// Remove promo badges and reject social-proof lines.
fn strip_bad_title_suffixes(s: &str) -> String {
    let mut s = s.trim().to_string();
    if s.is_empty() {
        return s;
    }
    for badge in ["Actively recruiting", "Easy Apply", "Promoted"] {
        s = s.replace(badge, "");
    }

    let lower = s.to_lowercase();
    let social = ["alumni", "connections", "applicants", "school"]
        .iter()
        .any(|w| lower.contains(w));
    if social || salary_re().is_match(&s) {
        return String::new();
    }
    clean_text(&s)
}

/// A candidate wins when it has a plausible length and the current title
/// is empty or longer.
fn better_title(candidate: &str, current: &str) -> bool {
    let candidate = candidate.trim();
    let len = candidate.len();
    if !(4..=120).contains(&len) {
        return false;
    }
    let current = current.trim();
    current.is_empty() || len < current.len()
}
