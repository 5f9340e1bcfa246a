//! Shared HTTP plumbing: client construction, URL building and response decoding.

use std::time::Duration;

use log::{debug, error, warn};
use reqwest::header::RETRY_AFTER;
use reqwest_middleware::{ClientWithMiddleware, RequestBuilder};
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};
use reqwest_retry_after::RetryAfterMiddleware;
use serde::de::DeserializeOwned;
use sift_common::Settings;
use url::Url;

use crate::error::ClientError;

const USER_AGENT: &str = concat!("sift/", env!("CARGO_PKG_VERSION"));

/// Builds the HTTP client shared by every domain.
///
/// Requests time out after `settings.timeout_seconds` and transient failures
/// are retried with exponential backoff up to `settings.max_retries` times.
///
/// # Errors
///
/// Returns an error if the underlying `reqwest` client cannot be built.
pub fn build_http_client(settings: &Settings) -> Result<ClientWithMiddleware, ClientError> {
    let retry_policy = ExponentialBackoff::builder()
        .retry_bounds(Duration::from_millis(500), Duration::from_secs(30))
        .build_with_max_retries(settings.max_retries);

    let reqwest_client = reqwest::Client::builder()
        .timeout(Duration::from_secs(settings.timeout_seconds))
        .user_agent(USER_AGENT)
        .build()?;

    // RetryAfterMiddleware goes first so Retry-After is honoured before backoff
    Ok(reqwest_middleware::ClientBuilder::new(reqwest_client)
        .with(RetryAfterMiddleware::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build())
}

/// Appends percent-encoded path segments to a base URL.
pub(crate) fn endpoint_url(base: &str, segments: &[&str]) -> Result<Url, ClientError> {
    let mut url = Url::parse(base)
        .map_err(|e| ClientError::ConfigurationError(format!("Invalid URL '{base}': {e}")))?;

    url.path_segments_mut()
        .map_err(|()| ClientError::ConfigurationError(format!("URL '{base}' cannot be a base")))?
        .pop_if_empty()
        .extend(segments);

    Ok(url)
}

/// Sends a request and decodes a JSON body, mapping non-success statuses to
/// [`ClientError`].
///
/// An empty success body decodes as JSON `null`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: RequestBuilder,
    operation: &str,
) -> Result<T, ClientError> {
    let response = request.send().await?;
    let status = response.status();

    if !status.is_success() {
        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map(Duration::from_secs);

        let body = response.text().await.map_err(|e| {
            warn!("Failed to read error response body: {e}");
            ClientError::NetworkError(e)
        })?;

        let err = ClientError::from_status(status.as_u16(), &body, retry_after);
        error!("{operation} failed with status {}: {err}", status.as_u16());
        return Err(err);
    }

    let text = response.text().await?;
    debug!("{operation} succeeded ({} bytes)", text.len());

    let body = if text.trim().is_empty() { "null" } else { &text };
    Ok(serde_json::from_str(body)?)
}
