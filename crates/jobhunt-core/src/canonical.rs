//! URL canonicalization and stable lead identity.
//!
//! Two URLs that point at the same posting through different tracking
//! decorations or LinkedIn redirect shapes must canonicalize to the same
//! string, and canonicalizing twice must not change the result. The stable
//! `source_id` of a lead is derived from these canonical forms.

use crate::types::JobLead;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::sync::OnceLock;
use url::Url;

const TRACKING_PARAMS: &[&str] = &[
    "gclid", "fbclid", "msclkid", "mc_cid", "mc_eid", "mkt_tok", "trk", "trkinfo", "refid", "ref",
    "src", "source",
];

fn linkedin_job_view() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)/jobs/view/(\d+)").expect("valid regex"))
}

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || TRACKING_PARAMS.contains(&key.as_str())
}

fn is_linkedin_host(url: &Url) -> bool {
    url.host_str().is_some_and(|h| h.contains("linkedin.com"))
}

/// Canonicalize a posting URL.
///
/// Scheme and host are lower-cased, the fragment and tracking parameters are
/// dropped, the remaining parameters are sorted, and LinkedIn job links
/// collapse to `https://www.linkedin.com/jobs/view/<id>`. Input that does not
/// parse as an absolute URL is returned trimmed.
#[must_use]
pub fn canonicalize_url(raw: &str) -> String {
    let raw = raw.trim();
    if raw.is_empty() {
        return String::new();
    }
    let Ok(mut url) = Url::parse(raw) else {
        return raw.to_string();
    };

    url.set_fragment(None);

    let linkedin = is_linkedin_host(&url);
    let mut params: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !is_tracking_param(k))
        .filter(|(k, _)| !linkedin || k == "currentJobId")
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if linkedin {
        // Only the first currentJobId is meaningful.
        params.truncate(1);
    }
    params.sort();

    if params.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(params.iter());
    }

    canonicalize_linkedin(&url).unwrap_or_else(|| url.to_string())
}

fn canonicalize_linkedin(url: &Url) -> Option<String> {
    if !is_linkedin_host(url) {
        return None;
    }

    if let Some(caps) = linkedin_job_view().captures(url.path()) {
        return Some(format!("https://www.linkedin.com/jobs/view/{}", &caps[1]));
    }

    url.query_pairs()
        .find(|(k, _)| k == "currentJobId")
        .map(|(_, v)| v.into_owned())
        .filter(|id| !id.is_empty() && id.bytes().all(|b| b.is_ascii_digit()))
        .map(|id| format!("https://www.linkedin.com/jobs/view/{id}"))
}

/// True for LinkedIn search result pages, which never identify one posting.
#[must_use]
pub fn is_linkedin_search_url(canon: &str) -> bool {
    let Ok(url) = Url::parse(canon) else {
        return false;
    };
    if !is_linkedin_host(&url) {
        return false;
    }
    let path = url.path().to_lowercase();
    if path.contains("/jobs/view/") {
        return false;
    }
    path.contains("/jobs/search")
}

/// Hex-encoded SHA-256 of `s`.
#[must_use]
pub fn hash_string(s: &str) -> String {
    hex::encode(Sha256::digest(s.as_bytes()))
}

/// Identity of a lead that only has a URL.
#[must_use]
pub fn url_source_id(url: &str) -> String {
    hash_string(&format!("url:{}", url.trim()))
}

/// Identity of a lead found in a mail message.
///
/// Returns `None` for LinkedIn search pages.
#[must_use]
pub fn email_source_id(message_id: &str, url: &str, subject: &str, from: &str) -> Option<String> {
    let canon = canonicalize_url(url);
    if is_linkedin_search_url(&canon) {
        return None;
    }

    let base = if message_id.is_empty() {
        format!("from:{from}|sub:{subject}|url:{canon}")
    } else {
        format!("mid:{message_id}|url:{canon}")
    };
    Some(hash_string(&base))
}

/// Dedup key for a lead, in priority order: the connector's own id, the
/// mail-derived id, then a hash of the URL.
#[must_use]
pub fn lead_source_id(lead: &JobLead) -> String {
    if let Some(id) = lead.source_job_id.as_deref().map(str::trim) {
        if !id.is_empty() {
            return id.to_string();
        }
    }

    if let Some(origin) = &lead.email {
        if let Some(id) = email_source_id(&origin.message_id, &lead.url, &origin.subject, &origin.from)
        {
            return id;
        }
    }

    url_source_id(&lead.url)
}
