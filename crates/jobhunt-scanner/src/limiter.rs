//! Per-host request budget shared by every network connector.
//!
//! One token bucket per hostname, created on first use. All buckets share
//! the same rate and burst.

use crate::error::{Result, ScanError};
use governor::{DefaultKeyedRateLimiter, Quota, RateLimiter};
use jobhunt_core::RateLimitConfig;
use std::num::NonZeroU32;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Bucket key for URLs without a usable host.
const FALLBACK_KEY: &str = "_";

/// Keyed token-bucket limiter.
pub struct HostLimiter {
    limiter: DefaultKeyedRateLimiter<String>,
}

impl std::fmt::Debug for HostLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostLimiter").finish_non_exhaustive()
    }
}

impl HostLimiter {
    /// Create a limiter allowing `requests_per_second` per host with the
    /// given burst. Non-positive rates fall back to one request per second
    /// and a zero burst to one.
    #[must_use]
    pub fn new(requests_per_second: f64, burst: u32) -> Self {
        let rate = if requests_per_second.is_finite() && requests_per_second > 0.0 {
            requests_per_second
        } else {
            1.0
        };
        let burst = NonZeroU32::new(burst).unwrap_or(NonZeroU32::MIN);
        let quota = Quota::with_period(Duration::from_secs_f64(1.0 / rate))
            .unwrap_or_else(|| Quota::per_second(NonZeroU32::MIN))
            .allow_burst(burst);

        Self {
            limiter: RateLimiter::keyed(quota),
        }
    }

    /// Create a limiter from the `rate_limit` config section.
    #[must_use]
    pub fn from_config(config: &RateLimitConfig) -> Self {
        Self::new(config.requests_per_second, config.burst)
    }

    /// Wait until a request to `url`'s host may be sent.
    ///
    /// Returns [`ScanError::Cancelled`] if `cancel` fires first.
    pub async fn wait(&self, cancel: &CancellationToken, url: &str) -> Result<()> {
        let key = host_key(url);
        tokio::select! {
            () = self.limiter.until_key_ready(&key) => Ok(()),
            () = cancel.cancelled() => Err(ScanError::Cancelled),
        }
    }
}

/// Lower-cased host of `url`, or the shared fallback key.
fn host_key(url: &str) -> String {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| FALLBACK_KEY.to_string())
}
