//! Lead admission rules.
//!
//! Two gates, in order: location (blocklist, remote policy, allow-list) and
//! relevance (at least one title or keyword rule term must match).

use jobhunt_core::config::ScoreRule;
use jobhunt_core::text::contains_any_fold;
use jobhunt_core::{AppConfig, FilterConfig, JobLead};
use std::fmt;

/// Why a lead was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Failed the location gate
    Location,
    /// Matched no title or keyword rule
    NoKeywordMatch,
}

impl SkipReason {
    /// Short label used in logs.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Location => "location",
            Self::NoKeywordMatch => "no_keyword_match",
        }
    }
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decide whether `lead` is worth storing.
pub fn should_keep_job(config: &AppConfig, lead: &JobLead) -> Result<(), SkipReason> {
    if !passes_location(&config.filters, lead) {
        return Err(SkipReason::Location);
    }
    let rules = config
        .scoring
        .title_rules
        .iter()
        .chain(&config.scoring.keyword_rules);
    if !matches_any_rule(rules, lead) {
        return Err(SkipReason::NoKeywordMatch);
    }
    Ok(())
}

fn passes_location(filters: &FilterConfig, lead: &JobLead) -> bool {
    let fields = [
        lead.location.as_str(),
        lead.title.as_str(),
        lead.description.as_str(),
    ];
    let any_field = |terms: &[String]| fields.iter().any(|f| contains_any_fold(f, terms));

    if any_field(&filters.locations_block) {
        return false;
    }

    let remote = ["remote"];
    if fields.iter().any(|f| contains_any_fold(f, &remote)) {
        return filters.remote_ok;
    }

    let allow_terms = filters
        .locations_allow
        .iter()
        .filter(|t| !t.trim().is_empty())
        .count();
    allow_terms == 0 || any_field(&filters.locations_allow)
}

fn matches_any_rule<'a>(mut rules: impl Iterator<Item = &'a ScoreRule>, lead: &JobLead) -> bool {
    let text = format!("{} {}", lead.title, lead.description);
    rules.any(|rule| contains_any_fold(&text, &rule.any))
}
