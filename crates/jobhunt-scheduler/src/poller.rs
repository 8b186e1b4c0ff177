//! Fixed-interval polling loop.

use crate::status::StatusRegister;
use async_trait::async_trait;
use chrono::Utc;
use jobhunt_core::AppConfig;
use jobhunt_scanner::{CycleReport, Orchestrator};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

/// Something that can run one ingestion cycle.
#[async_trait]
pub trait CycleRunner: Send + Sync {
    /// Run a cycle; errors are reported as text for the status register.
    async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, String>;
}

#[async_trait]
impl CycleRunner for Orchestrator {
    async fn run_cycle(&self, shutdown: &CancellationToken) -> Result<CycleReport, String> {
        Orchestrator::run_cycle(self, shutdown)
            .await
            .map_err(|e| e.to_string())
    }
}

/// Why [`Poller::poll_once`] did not run a cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Skipped {
    /// No source is enabled
    NothingEnabled,
    /// The previous cycle has not finished
    AlreadyRunning,
}

/// Runs a cycle every `interval` until shut down.
pub struct Poller {
    config: Arc<AppConfig>,
    runner: Arc<dyn CycleRunner>,
    status: StatusRegister,
    interval: Duration,
}

impl Poller {
    /// Create a poller using `config.polling.interval_secs`.
    #[must_use]
    pub fn new(config: Arc<AppConfig>, runner: Arc<dyn CycleRunner>, status: StatusRegister) -> Self {
        let interval = Duration::from_secs(config.polling.interval_secs.max(1));
        Self {
            config,
            runner,
            status,
            interval,
        }
    }

    /// Override the tick interval.
    #[must_use]
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Status register updated by this poller.
    #[must_use]
    pub fn status(&self) -> &StatusRegister {
        &self.status
    }

    /// Tick until `shutdown` fires. The first cycle runs one interval after
    /// start.
    pub async fn run(&self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tracing::info!("[poll] every {:?}", self.interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                () = shutdown.cancelled() => break,
            }
            if let Err(reason) = self.poll_once(&shutdown).await {
                tracing::debug!("[poll] skipped: {:?}", reason);
            }
        }
        tracing::info!("[poll] stopped");
    }

    /// Run a single cycle now, updating the status register.
    pub async fn poll_once(&self, shutdown: &CancellationToken) -> Result<CycleReport, Skipped> {
        if !self.config.any_source_enabled() {
            return Err(Skipped::NothingEnabled);
        }
        if !self.status.try_begin(Utc::now()) {
            tracing::info!("[poll] previous cycle still running");
            return Err(Skipped::AlreadyRunning);
        }

        let outcome = self.runner.run_cycle(shutdown).await;
        match &outcome {
            Ok(report) => {
                tracing::info!("[poll] ok added={}", report.added);
                self.status.finish(Utc::now(), Ok(report.added));
            }
            Err(e) => {
                tracing::error!("[poll] error: {}", e);
                self.status.finish(Utc::now(), Err(e.clone()));
            }
        }
        // A failed cycle is still a cycle that ran.
        Ok(outcome.unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingRunner {
        calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl CycleRunner for CountingRunner {
        async fn run_cycle(&self, _shutdown: &CancellationToken) -> Result<CycleReport, String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err("sources unreachable".to_string());
            }
            Ok(CycleReport {
                added: 2,
                ..CycleReport::default()
            })
        }
    }

    fn enabled_config() -> Arc<AppConfig> {
        let mut config = AppConfig::default();
        config.sources.lever.enabled = true;
        Arc::new(config)
    }

    fn runner(fail: bool) -> Arc<CountingRunner> {
        Arc::new(CountingRunner {
            calls: AtomicUsize::new(0),
            fail,
        })
    }

    #[tokio::test]
    async fn test_nothing_enabled_skips() {
        let runner = runner(false);
        let poller = Poller::new(Arc::new(AppConfig::default()), runner.clone(), StatusRegister::new());

        let outcome = poller.poll_once(&CancellationToken::new()).await;
        assert_eq!(outcome.err(), Some(Skipped::NothingEnabled));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
        assert!(poller.status().snapshot().last_run_at.is_none());
    }

    #[tokio::test]
    async fn test_overlap_is_refused() {
        let runner = runner(false);
        let status = StatusRegister::new();
        assert!(status.try_begin(Utc::now()));

        let poller = Poller::new(enabled_config(), runner.clone(), status);
        let outcome = poller.poll_once(&CancellationToken::new()).await;
        assert_eq!(outcome.err(), Some(Skipped::AlreadyRunning));
        assert_eq!(runner.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_status_updated_after_cycle() {
        let ok = Poller::new(enabled_config(), runner(false), StatusRegister::new());
        let report = ok.poll_once(&CancellationToken::new()).await.expect("cycle ran");
        assert_eq!(report.added, 2);
        let status = ok.status().snapshot();
        assert!(!status.running);
        assert_eq!(status.last_added, 2);
        assert!(status.last_ok_at.is_some());

        let failing = Poller::new(enabled_config(), runner(true), StatusRegister::new());
        failing.poll_once(&CancellationToken::new()).await.expect("cycle ran");
        let status = failing.status().snapshot();
        assert_eq!(status.last_error.as_deref(), Some("sources unreachable"));
        assert!(status.last_ok_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_ticks_until_shutdown() {
        let runner = runner(false);
        let poller = Poller::new(enabled_config(), runner.clone(), StatusRegister::new())
            .with_interval(Duration::from_secs(30));
        let shutdown = CancellationToken::new();

        let handle = {
            let shutdown = shutdown.clone();
            tokio::spawn(async move { poller.run(shutdown).await })
        };

        tokio::time::sleep(Duration::from_secs(95)).await;
        shutdown.cancel();
        handle.await.expect("poller task");

        assert_eq!(runner.calls.load(Ordering::SeqCst), 3);
    }
}
