//! Shared HTTP plumbing for connectors.
//!
//! Every request goes through the host limiter first and every await on the
//! network races the caller's cancellation token.

use crate::error::{Result, ScanError};
use crate::limiter::HostLimiter;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// User agent for API and board requests.
pub const USER_AGENT: &str = "JobHunt/1.0 (+local)";

/// User agent for endpoints that reject obvious bots.
pub const BROWSER_USER_AGENT: &str = "Mozilla/5.0";

/// Build the shared client used by API connectors.
pub fn build_client(timeout: Duration) -> Result<Client> {
    Ok(Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()?)
}

/// Wait for the limiter, then send `request` to `url`.
///
/// Statuses of 400 and above become [`ScanError::Status`].
pub async fn send(
    limiter: &HostLimiter,
    cancel: &CancellationToken,
    url: &str,
    request: RequestBuilder,
) -> Result<Response> {
    let response = send_raw(limiter, cancel, url, request).await?;
    let status = response.status();
    if status.is_client_error() || status.is_server_error() {
        return Err(ScanError::Status {
            status: status.as_u16(),
            url: url.to_string(),
        });
    }
    Ok(response)
}

/// Like [`send`] but hands back error responses unchanged.
pub async fn send_raw(
    limiter: &HostLimiter,
    cancel: &CancellationToken,
    url: &str,
    request: RequestBuilder,
) -> Result<Response> {
    limiter.wait(cancel, url).await?;
    tokio::select! {
        res = request.send() => Ok(res?),
        () = cancel.cancelled() => Err(ScanError::Cancelled),
    }
}

/// Read a response body as text.
pub async fn text(cancel: &CancellationToken, response: Response) -> Result<String> {
    tokio::select! {
        body = response.text() => Ok(body?),
        () = cancel.cancelled() => Err(ScanError::Cancelled),
    }
}

/// Read and decode a JSON response body.
pub async fn json<T: DeserializeOwned>(
    cancel: &CancellationToken,
    url: &str,
    response: Response,
) -> Result<T> {
    let body = text(cancel, response).await?;
    serde_json::from_str(&body).map_err(|e| ScanError::decode(url, e))
}

/// GET `url` and return its body.
pub async fn get_text(
    client: &Client,
    limiter: &HostLimiter,
    cancel: &CancellationToken,
    url: &str,
) -> Result<String> {
    let response = send(limiter, cancel, url, client.get(url)).await?;
    text(cancel, response).await
}

/// Collapse whitespace and cut `s` to at most `max` bytes for log output.
#[must_use]
pub fn preview(s: &str, max: usize) -> String {
    let flat = s.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= max {
        return flat;
    }
    let mut end = max;
    while !flat.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &flat[..end])
}
