use async_trait::async_trait;
use futures::FutureExt;
use jobhunt_core::config::ScoreRule;
use jobhunt_core::events::JOB_CREATED;
use jobhunt_core::{AppConfig, EventHub, Fetcher, JobLead, JobhuntError, ScrapeResult, WorkMode};
use jobhunt_db::{jobs, Database};
use jobhunt_scanner::{HostLimiter, Orchestrator};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

enum Behavior {
    Return(Vec<JobLead>),
    Fail,
    /// Wait for cancellation, then return the leads gathered "so far".
    UntilCancelled(Vec<JobLead>),
    Finalize(Vec<JobLead>, Arc<AtomicBool>),
}

struct FakeFetcher {
    name: &'static str,
    behavior: Behavior,
}

#[async_trait]
impl Fetcher for FakeFetcher {
    fn name(&self) -> &str {
        self.name
    }

    async fn fetch(&self, cancel: CancellationToken) -> jobhunt_core::Result<ScrapeResult> {
        match &self.behavior {
            Behavior::Return(leads) => Ok(ScrapeResult::new(self.name, leads.clone())),
            Behavior::Fail => Err(JobhuntError::SourceUnavailable("board is down".to_string())),
            Behavior::UntilCancelled(leads) => {
                cancel.cancelled().await;
                Ok(ScrapeResult::new(self.name, leads.clone()))
            }
            Behavior::Finalize(leads, flag) => {
                let flag = Arc::clone(flag);
                Ok(ScrapeResult::new(self.name, leads.clone()).with_finalize(Box::new(move || {
                    async move {
                        flag.store(true, Ordering::SeqCst);
                        Ok::<(), JobhuntError>(())
                    }
                    .boxed()
                })))
            }
        }
    }
}

fn fetcher(name: &'static str, behavior: Behavior) -> Arc<dyn Fetcher> {
    Arc::new(FakeFetcher { name, behavior })
}

fn lead(source: &str, id: &str) -> JobLead {
    let mut lead = JobLead::new(source, "Acme", "Backend Engineer", format!("https://example.com/{source}/{id}"));
    lead.location = "Remote".to_string();
    lead.work_mode = WorkMode::Remote;
    lead.source_job_id = Some(format!("{source}:acme:{id}"));
    lead
}

async fn orchestrator(events: EventHub) -> (Orchestrator, Database) {
    let mut config = AppConfig::default();
    config.filters.remote_ok = true;
    config.scoring.title_rules = vec![ScoreRule {
        tag: "backend".to_string(),
        weight: 5,
        any: vec!["backend".to_string()],
    }];

    let db = Database::new(":memory:").await.expect("open db");
    db.run_migrations().await.expect("migrate");
    let limiter = Arc::new(HostLimiter::new(100.0, 100));
    let orchestrator = Orchestrator::with_parts(Arc::new(config), db.clone(), events, limiter, None);
    (orchestrator, db)
}

#[tokio::test]
async fn test_failed_source_does_not_affect_siblings() {
    let (orchestrator, db) = orchestrator(EventHub::default()).await;
    let fetchers = vec![
        fetcher("lever", Behavior::Return(vec![lead("lever", "1"), lead("lever", "2")])),
        fetcher("workday", Behavior::Fail),
        fetcher("greenhouse", Behavior::Return(vec![lead("greenhouse", "1")])),
    ];

    let report = orchestrator
        .run_with_fetchers(fetchers, &CancellationToken::new())
        .await;

    assert_eq!(report.added, 3);
    assert_eq!(report.failed_sources(), vec!["workday"]);
    assert_eq!(report.sources.len(), 3);
    assert_eq!(jobs::count_jobs(db.pool()).await.expect("count"), 3);
}

#[tokio::test]
async fn test_deadline_keeps_partial_results() {
    let (orchestrator, db) = orchestrator(EventHub::default()).await;
    let orchestrator = orchestrator.with_source_timeout("slow", Duration::from_millis(100));
    let fetchers = vec![fetcher("slow", Behavior::UntilCancelled(vec![lead("slow", "1")]))];

    let report = orchestrator
        .run_with_fetchers(fetchers, &CancellationToken::new())
        .await;

    assert_eq!(report.added, 1);
    assert!(report.failed_sources().is_empty());
    assert_eq!(jobs::count_jobs(db.pool()).await.expect("count"), 1);
}

#[tokio::test]
async fn test_finalize_runs_after_processing() {
    let events = EventHub::default();
    let mut rx = events.subscribe();
    let (orchestrator, db) = orchestrator(events).await;
    let marked = Arc::new(AtomicBool::new(false));
    let fetchers = vec![fetcher(
        "email",
        Behavior::Finalize(vec![lead("email", "1")], Arc::clone(&marked)),
    )];

    let report = orchestrator
        .run_with_fetchers(fetchers, &CancellationToken::new())
        .await;

    assert!(marked.load(Ordering::SeqCst));
    assert_eq!(report.added, 1);
    assert_eq!(jobs::count_jobs(db.pool()).await.expect("count"), 1);

    let event = rx.try_recv().expect("event");
    assert_eq!(event.kind, JOB_CREATED);
    assert_eq!(event.request_id.as_deref(), Some(report.request_id.as_str()));
    assert_eq!(event.data["source_id"], "email:acme:1");
}

#[tokio::test]
async fn test_redundant_sources_store_once() {
    let (orchestrator, db) = orchestrator(EventHub::default()).await;
    let shared = lead("lever", "7");
    let fetchers = vec![
        fetcher("lever", Behavior::Return(vec![shared.clone()])),
        fetcher("lever-mirror", Behavior::Return(vec![shared])),
    ];

    let report = orchestrator
        .run_with_fetchers(fetchers, &CancellationToken::new())
        .await;
    assert_eq!(report.added, 1);

    let again = orchestrator
        .run_with_fetchers(
            vec![fetcher("lever", Behavior::Return(vec![lead("lever", "7")]))],
            &CancellationToken::new(),
        )
        .await;
    assert_eq!(again.added, 0);
    assert_eq!(jobs::count_jobs(db.pool()).await.expect("count"), 1);
}

#[tokio::test]
async fn test_no_fetchers_is_an_empty_cycle() {
    let (orchestrator, _db) = orchestrator(EventHub::default()).await;
    let report = orchestrator
        .run_with_fetchers(Vec::new(), &CancellationToken::new())
        .await;
    assert_eq!(report.added, 0);
    assert!(report.sources.is_empty());
}
