//! Bounded per-company worker pool shared by the ATS connectors.

use crate::error::{Result, ScanError};
use futures::stream::{FuturesUnordered, StreamExt};
use jobhunt_core::{CompanyEntry, JobLead};
use std::future::Future;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Companies fetched concurrently by one connector.
pub const WORKERS: usize = 8;

/// How long a company may keep running after its token was cancelled.
const COMPANY_GRACE: Duration = Duration::from_secs(2);

/// Run `fetch_company` for every company with at most [`WORKERS`] in flight.
///
/// When `per_company` is set and a company runs past it, the company's token
/// is cancelled and it gets a short grace period to return the leads it
/// already built. Failures are logged and dropped. Once `cancel` fires no
/// further companies are started and the leads gathered so far are returned.
pub async fn run_companies<F, Fut>(
    source: &str,
    companies: &[CompanyEntry],
    cancel: &CancellationToken,
    per_company: Option<Duration>,
    fetch_company: F,
) -> Vec<JobLead>
where
    F: Fn(CompanyEntry, CancellationToken) -> Fut,
    Fut: Future<Output = Result<Vec<JobLead>>>,
{
    let mut in_flight = FuturesUnordered::new();
    let mut leads = Vec::new();
    let mut pending = companies.iter().cloned();

    loop {
        while in_flight.len() < WORKERS && !cancel.is_cancelled() {
            let Some(company) = pending.next() else {
                break;
            };
            let slug = company.slug.clone();
            let name = company.name.clone();
            let token = cancel.child_token();
            let work = fetch_company(company, token.clone());
            in_flight.push(async move {
                let outcome = run_company(&slug, per_company, token, work).await;
                (slug, name, outcome)
            });
        }

        let Some((slug, name, outcome)) = in_flight.next().await else {
            break;
        };
        match outcome {
            Ok(batch) => {
                tracing::debug!("[{}] company={} jobs={}", source, slug, batch.len());
                leads.extend(batch);
            }
            Err(ScanError::Cancelled) => {
                tracing::debug!("[{}] company={} cancelled", source, slug);
            }
            Err(e) => {
                tracing::warn!("[{}] company={:?} slug={:?} error: {}", source, name, slug, e);
            }
        }
    }

    if cancel.is_cancelled() {
        tracing::warn!("[{}] deadline reached, returning {} partial leads", source, leads.len());
    } else {
        tracing::info!("[{}] processed {} leads", source, leads.len());
    }
    leads
}

/// Drive one company, cancelling its token at the budget and waiting
/// [`COMPANY_GRACE`] for its partial result.
async fn run_company<Fut>(
    slug: &str,
    per_company: Option<Duration>,
    token: CancellationToken,
    work: Fut,
) -> Result<Vec<JobLead>>
where
    Fut: Future<Output = Result<Vec<JobLead>>>,
{
    let Some(budget) = per_company else {
        return work.await;
    };
    tokio::pin!(work);

    tokio::select! {
        result = &mut work => result,
        () = tokio::time::sleep(budget) => {
            tracing::debug!("company={} over its {:?} budget, keeping partial results", slug, budget);
            token.cancel();
            match tokio::time::timeout(COMPANY_GRACE, &mut work).await {
                Ok(result) => result,
                Err(_) => Err(ScanError::CompanyTimeout {
                    company: slug.to_string(),
                }),
            }
        }
    }
}
