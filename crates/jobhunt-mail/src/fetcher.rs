//! The mailbox as a job source.

use crate::error::{MailError, Result};
use crate::imap::{self as session, ImapSettings, Interrupt, RawMessage};
use crate::linkedin::{looks_like_job_alert, parse_job_alert_html};
use crate::mime::parse_message;
use async_trait::async_trait;
use futures::FutureExt;
use jobhunt_core::canonical::canonicalize_url;
use jobhunt_core::text::{contains_any_fold, infer_work_mode};
use jobhunt_core::{EmailConfig, EmailOrigin, Fetcher, JobLead, ScrapeResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Source tag for mailbox leads.
pub const SOURCE: &str = "email";

/// How long to wait for the blocking worker after its socket was closed.
const WORKER_GRACE: Duration = Duration::from_secs(2);

/// Reads unseen job-alert digests from an IMAP mailbox.
///
/// Messages are fetched without being marked read; the UIDs of every
/// message looked at are flagged `\Seen` by the result's finalize callback.
#[derive(Debug, Clone)]
pub struct EmailFetcher {
    config: EmailConfig,
}

impl EmailFetcher {
    /// Create a fetcher for the configured mailbox.
    #[must_use]
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn settings(&self) -> Result<ImapSettings> {
        let host = self.config.imap_host.trim();
        let username = self.config.username.trim();
        if host.is_empty() || username.is_empty() {
            return Err(MailError::Config(
                "email enabled but imap_host or username is empty".to_string(),
            ));
        }

        let password = std::env::var(&self.config.password_env).unwrap_or_default();
        if password.is_empty() {
            return Err(MailError::Config(format!(
                "IMAP password not set (expected in ${})",
                self.config.password_env
            )));
        }

        let mailbox = match self.config.mailbox.trim() {
            "" => "INBOX".to_string(),
            m => m.to_string(),
        };

        Ok(ImapSettings {
            host: host.to_string(),
            port: self.config.imap_port,
            username: username.to_string(),
            password,
            mailbox,
        })
    }
}

#[async_trait]
impl Fetcher for EmailFetcher {
    fn name(&self) -> &str {
        SOURCE
    }

    async fn fetch(&self, cancel: CancellationToken) -> jobhunt_core::Result<ScrapeResult> {
        let settings = self.settings()?;
        let max = self.config.max_messages;

        // The imap client is blocking; cancellation closes its socket so a
        // command waiting on the server fails at once.
        let interrupt = Interrupt::new();
        let mut worker = {
            let settings = settings.clone();
            let interrupt = interrupt.clone();
            tokio::task::spawn_blocking(move || session::fetch_unseen(&settings, max, &interrupt))
        };

        let messages = tokio::select! {
            joined = &mut worker => joined.map_err(|e| MailError::Worker(e.to_string()))??,
            () = cancel.cancelled() => {
                tracing::warn!("Mailbox fetch cancelled, closing the IMAP connection");
                interrupt.trigger();
                if tokio::time::timeout(WORKER_GRACE, worker).await.is_err() {
                    tracing::warn!("IMAP worker still running {:?} after its socket was closed", WORKER_GRACE);
                }
                return Err(MailError::Cancelled.into());
            }
        };

        let (leads, processed) = leads_from_messages(&messages, &self.config.search_subject_any);
        tracing::info!(
            "Email: {} messages read, {} leads extracted",
            processed.len(),
            leads.len()
        );

        let mut result = ScrapeResult::new(SOURCE, leads);
        if !processed.is_empty() {
            result = result.with_finalize(Box::new(move || {
                async move {
                    let count = processed.len();
                    tokio::task::spawn_blocking(move || session::mark_seen(&settings, &processed))
                        .await
                        .map_err(|e| MailError::Worker(e.to_string()))??;
                    tracing::debug!("Marked {} messages as seen", count);
                    Ok::<(), jobhunt_core::JobhuntError>(())
                }
                .boxed()
            }));
        }
        Ok(result)
    }
}

/// Turn fetched messages into leads.
///
/// Returns the leads together with the UID of every message examined,
/// including skipped ones, so they can all be marked read.
#[must_use]
pub fn leads_from_messages(messages: &[RawMessage], subject_any: &[String]) -> (Vec<JobLead>, Vec<u32>) {
    let mut leads = Vec::new();
    let mut processed = Vec::with_capacity(messages.len());

    for raw in messages {
        processed.push(raw.uid);
        let msg = parse_message(&raw.body);

        if !subject_any.is_empty() && !contains_any_fold(&msg.subject, subject_any) {
            continue;
        }

        let detect_body = if msg.plain.trim().is_empty() {
            &msg.html
        } else {
            &msg.plain
        };
        if !looks_like_job_alert(&msg.subject, detect_body) {
            continue;
        }
        tracing::debug!("Job alert digest: {}", msg.subject);

        let posted_at = raw.internal_date.or(msg.date);
        for job in parse_job_alert_html(&msg.html) {
            let company_line = format!("{} · {}", job.company, job.location);
            let description = [
                msg.subject.as_str(),
                msg.from.as_str(),
                company_line.as_str(),
                job.salary.as_str(),
                job.url.as_str(),
            ]
            .join("\n");

            let mut lead = JobLead::new(SOURCE, job.company, job.title, canonicalize_url(&job.url));
            lead.work_mode = infer_work_mode(&job.location, &msg.subject, "");
            lead.location = job.location;
            lead.description = description;
            lead.posted_at = posted_at;
            lead.source_job_id = job.source_id;
            lead.logo_url = Some(job.logo_url).filter(|u| !u.is_empty());
            lead.email = Some(EmailOrigin {
                message_id: msg.message_id.clone(),
                from: msg.from.clone(),
                subject: msg.subject.clone(),
            });
            leads.push(lead);
        }
    }

    (leads, processed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use jobhunt_core::WorkMode;

    fn digest(uid: u32, subject: &str) -> RawMessage {
        let body = format!(
            "Message-ID: <alert-{uid}@linkedin.com>\r\n\
             From: LinkedIn Job Alerts <jobalerts-noreply@linkedin.com>\r\n\
             Subject: {subject}\r\n\
             Date: Wed, 14 Oct 2026 08:00:00 +0000\r\n\
             Content-Type: text/html; charset=utf-8\r\n\
             \r\n\
             <html><body><table><tr><td>\
             <a href=\"https://www.linkedin.com/comm/jobs/view/4242/?trk=eml\">Rust Engineer</a>\
             <p>Initech · Remote</p>\
             </td></tr></table></body></html>\r\n"
        );
        RawMessage {
            uid,
            internal_date: None,
            body: body.into_bytes(),
        }
    }

    #[test]
    fn test_digest_becomes_lead() {
        let (leads, processed) = leads_from_messages(&[digest(9, "Your job alert for rust")], &[]);
        assert_eq!(processed, vec![9]);
        assert_eq!(leads.len(), 1);

        let lead = &leads[0];
        assert_eq!(lead.source, "email");
        assert_eq!(lead.title, "Rust Engineer");
        assert_eq!(lead.company, "Initech");
        assert_eq!(lead.url, "https://www.linkedin.com/jobs/view/4242");
        assert_eq!(lead.source_job_id.as_deref(), Some("linkedin:4242"));
        assert_eq!(lead.work_mode, WorkMode::Remote);
        assert!(lead.posted_at.is_some());
        let origin = lead.email.as_ref().expect("email origin");
        assert_eq!(origin.message_id, "<alert-9@linkedin.com>");
        assert!(lead.description.starts_with("Your job alert for rust\n"));
    }

    #[test]
    fn test_subject_filter_still_marks_processed() {
        let allow = vec!["staff".to_string()];
        let (leads, processed) =
            leads_from_messages(&[digest(3, "Your job alert for rust"), digest(2, "Staff job alert")], &allow);
        assert_eq!(processed, vec![3, 2]);
        assert_eq!(leads.len(), 1);
    }

    #[test]
    fn test_non_digest_ignored() {
        let raw = RawMessage {
            uid: 5,
            internal_date: None,
            body: b"Subject: Lunch?\r\n\r\nhttps://www.linkedin.com/jobs/view/1\r\n".to_vec(),
        };
        let (leads, processed) = leads_from_messages(&[raw], &[]);
        assert!(leads.is_empty());
        assert_eq!(processed, vec![5]);
    }

    #[tokio::test]
    async fn test_missing_password_is_config_error() {
        let fetcher = EmailFetcher::new(EmailConfig {
            enabled: true,
            imap_host: "imap.example.com".to_string(),
            username: "me@example.com".to_string(),
            password_env: "JOBHUNT_TEST_UNSET_PASSWORD_VAR".to_string(),
            ..EmailConfig::default()
        });
        let err = fetcher
            .fetch(CancellationToken::new())
            .await
            .expect_err("should fail");
        assert!(matches!(err, jobhunt_core::JobhuntError::Validation(_)));
    }

    #[tokio::test]
    async fn test_cancel_closes_stalled_connection() {
        use std::io::Read;

        // Accepts the connection and never answers.
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("bind");
        let port = listener.local_addr().expect("addr").port();
        let server = std::thread::spawn(move || {
            let (mut socket, _) = listener.accept().expect("accept");
            socket
                .set_read_timeout(Some(Duration::from_secs(20)))
                .expect("timeout");
            let mut buf = [0u8; 4096];
            loop {
                match socket.read(&mut buf) {
                    Ok(0) => return true,
                    Ok(_) => {}
                    Err(_) => return false,
                }
            }
        });

        std::env::set_var("JOBHUNT_TEST_STALLED_IMAP_PASSWORD", "secret");
        let fetcher = EmailFetcher::new(EmailConfig {
            enabled: true,
            imap_host: "127.0.0.1".to_string(),
            imap_port: port,
            username: "me@example.com".to_string(),
            password_env: "JOBHUNT_TEST_STALLED_IMAP_PASSWORD".to_string(),
            ..EmailConfig::default()
        });

        let cancel = CancellationToken::new();
        let deadline = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            deadline.cancel();
        });

        let started = std::time::Instant::now();
        let err = fetcher.fetch(cancel).await.expect_err("should be cancelled");
        assert!(matches!(err, jobhunt_core::JobhuntError::Cancelled(_)));
        assert!(started.elapsed() < Duration::from_secs(5));

        // The server saw the connection closed rather than abandoned.
        let closed = tokio::task::spawn_blocking(move || server.join().expect("server thread"))
            .await
            .expect("join");
        assert!(closed);
    }
}
