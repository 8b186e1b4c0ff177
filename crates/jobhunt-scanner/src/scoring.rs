//! Weighted tag scoring.

use jobhunt_core::config::{PenaltyRule, ScoreRule};
use jobhunt_core::text::contains_any_fold;
use jobhunt_core::{JobLead, ScoringConfig};

/// Score `lead` against title rules, keyword rules and penalties.
///
/// Each rule counts at most once. Tags are unique and keep first-seen order.
#[must_use]
pub fn score_lead(scoring: &ScoringConfig, lead: &JobLead) -> (i64, Vec<String>) {
    let text = format!("{} {}", lead.title, lead.description);
    let mut score = 0;
    let mut tags: Vec<String> = Vec::new();

    let rules = scoring.title_rules.iter().chain(&scoring.keyword_rules);
    for ScoreRule { tag, weight, any } in rules {
        if !contains_any_fold(&text, any) {
            continue;
        }
        score += weight;
        if !tag.is_empty() && !tags.contains(tag) {
            tags.push(tag.clone());
        }
    }

    for PenaltyRule { weight, any, .. } in &scoring.penalties {
        if contains_any_fold(&text, any) {
            score += weight;
        }
    }

    (score, tags)
}
