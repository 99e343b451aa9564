//! Activity sources (Jira, GitHub).
//!
//! Each source turns one provider's REST responses into [`ActivityItem`]s for
//! a window. The pipeline only sees the [`ActivitySource`] trait.

pub mod github;
pub mod jira;

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HeaderMap;
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;

use crate::error::SourceError;
use crate::models::{ActivityItem, Source, Window};
use crate::registry::TeamConfig;

pub use github::GithubSource;
pub use jira::JiraSource;

const USER_AGENT: &str = concat!("team-activity/", env!("CARGO_PKG_VERSION"));

/// A provider that produces activity items for a window.
#[async_trait]
pub trait ActivitySource: Send + Sync {
    /// Which provider this is.
    fn source(&self) -> Source;

    /// Fetch every item for the team's identifiers on this provider.
    ///
    /// An empty result means no activity, never a failure.
    async fn fetch(
        &self,
        team: &TeamConfig,
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError>;
}

/// Build a client scoped to one fetch.
pub(crate) fn http_client(
    provider: Source,
    timeout: Duration,
    headers: HeaderMap,
) -> Result<reqwest::Client, SourceError> {
    reqwest::Client::builder()
        .default_headers(headers)
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .build()
        .map_err(|e| SourceError::unavailable(provider, format!("failed to build HTTP client: {e}")))
}

/// Map a transport-level failure.
pub(crate) fn transport_error(provider: Source, err: &reqwest::Error) -> SourceError {
    if err.is_timeout() {
        SourceError::unavailable(provider, format!("request timed out: {err}"))
    } else if err.is_decode() {
        SourceError::response(provider, format!("failed to read response body: {err}"))
    } else {
        SourceError::unavailable(provider, format!("request failed: {err}"))
    }
}

/// Auth failures, throttling and server errors mean the provider cannot be reached.
pub(crate) fn is_unavailable_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::TOO_MANY_REQUESTS
    ) || status.is_server_error()
}

/// Reject non-success responses with the matching error kind.
pub(crate) async fn check_status(
    provider: Source,
    response: Response,
    what: &str,
) -> Result<Response, SourceError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let message = format!("{what}: HTTP {status}: {}", truncate(&body, 200));
    if is_unavailable_status(status) {
        Err(SourceError::unavailable(provider, message))
    } else {
        Err(SourceError::response(provider, message))
    }
}

/// Read a body and deserialize it into the provider's raw shape.
pub(crate) async fn read_json<T: DeserializeOwned>(
    provider: Source,
    response: Response,
    what: &str,
) -> Result<T, SourceError> {
    let body = response
        .text()
        .await
        .map_err(|e| transport_error(provider, &e))?;
    serde_json::from_str(&body)
        .map_err(|e| SourceError::response(provider, format!("failed to parse {what}: {e}")))
}

fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
