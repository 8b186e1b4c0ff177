//! Mail error types.

use jobhunt_core::JobhuntError;
use thiserror::Error;

/// Mailbox feed errors.
#[derive(Debug, Error)]
pub enum MailError {
    /// Email is enabled but a required setting is blank.
    #[error("email misconfigured: {0}")]
    Config(String),

    /// TLS connect failed.
    #[error("IMAP connect error: {0}")]
    Connect(String),

    /// TLS setup failed before the IMAP greeting.
    #[error("IMAP TLS error: {0}")]
    Tls(String),

    /// Server rejected the credentials.
    #[error("IMAP login error: {0}")]
    Login(String),

    /// A command after login failed.
    #[error("IMAP {command} error: {source}")]
    Command {
        /// Command that failed (select, search, fetch, store)
        command: &'static str,
        /// Underlying protocol error
        #[source]
        source: imap::Error,
    },

    /// The fetch deadline passed before the session finished.
    #[error("mailbox session cancelled")]
    Cancelled,

    /// The blocking IMAP task panicked or was aborted.
    #[error("IMAP worker failed: {0}")]
    Worker(String),
}

impl MailError {
    pub(crate) fn command(command: &'static str) -> impl FnOnce(imap::Error) -> Self {
        move |source| Self::Command { command, source }
    }
}

impl From<MailError> for JobhuntError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Cancelled => Self::Cancelled("mailbox session cancelled".to_string()),
            MailError::Config(msg) => Self::Validation(msg),
            other => Self::Mail(other.to_string()),
        }
    }
}

/// Result type alias for mail operations.
pub type Result<T> = std::result::Result<T, MailError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: JobhuntError = MailError::Cancelled.into();
        assert!(matches!(err, JobhuntError::Cancelled(_)));

        let err: JobhuntError = MailError::Login("bad password".to_string()).into();
        assert_eq!(err.to_string(), "mail error: IMAP login error: bad password");
    }
}
