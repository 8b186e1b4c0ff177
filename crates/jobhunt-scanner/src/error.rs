//! Scanner error types.

use jobhunt_core::JobhuntError;
use jobhunt_db::DatabaseError;
use thiserror::Error;

/// Errors raised while fetching from a job source or processing its leads.
#[derive(Debug, Error)]
pub enum ScanError {
    /// Transport-level HTTP failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Upstream answered with an error status.
    #[error("{url} returned HTTP {status}")]
    Status {
        /// Response status code
        status: u16,
        /// Requested URL
        url: String,
    },

    /// Response body did not have the expected shape.
    #[error("could not decode response from {url}: {reason}")]
    Decode {
        /// Requested URL
        url: String,
        /// Decoder message
        reason: String,
    },

    /// A configured board URL or slug cannot be used.
    #[error("invalid board '{board}': {reason}")]
    InvalidBoard {
        /// Board as configured
        board: String,
        /// Why it was rejected
        reason: String,
    },

    /// Session bootstrap did not yield the expected tokens.
    #[error("session bootstrap failed: {0}")]
    Bootstrap(String),

    /// Host is serving an anti-bot challenge.
    #[error("host {host} is blocked by an anti-bot challenge")]
    Blocked {
        /// Blocked host name
        host: String,
    },

    /// A single company exceeded its time budget.
    #[error("company '{company}' timed out")]
    CompanyTimeout {
        /// Company slug
        company: String,
    },

    /// The fetch deadline passed or the run is shutting down.
    #[error("cancelled")]
    Cancelled,

    /// Storage failure.
    #[error("database error: {0}")]
    Database(#[from] DatabaseError),
}

impl ScanError {
    /// Build a [`ScanError::Decode`] from any displayable error.
    pub(crate) fn decode(url: &str, err: impl std::fmt::Display) -> Self {
        Self::Decode {
            url: url.to_string(),
            reason: err.to_string(),
        }
    }
}

impl From<ScanError> for JobhuntError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Cancelled => Self::Cancelled("source fetch cancelled".to_string()),
            ScanError::Database(e) => e.into(),
            ScanError::InvalidBoard { .. } => Self::Validation(err.to_string()),
            ScanError::Http(_) => Self::Network(err.to_string()),
            other => Self::SourceUnavailable(other.to_string()),
        }
    }
}

/// Result type alias for scanner operations.
pub type Result<T> = std::result::Result<T, ScanError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_into_core_error() {
        let err: JobhuntError = ScanError::Blocked {
            host: "acme.wd5.myworkdayjobs.com".to_string(),
        }
        .into();
        assert!(matches!(err, JobhuntError::SourceUnavailable(_)));

        let err: JobhuntError = ScanError::Cancelled.into();
        assert!(matches!(err, JobhuntError::Cancelled(_)));
    }

    #[test]
    fn test_status_message() {
        let err = ScanError::Status {
            status: 503,
            url: "https://api.lever.co/v0/postings/acme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "https://api.lever.co/v0/postings/acme returned HTTP 503"
        );
    }
}
