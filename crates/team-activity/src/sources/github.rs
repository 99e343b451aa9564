//! GitHub activity source backed by the repository events API.
//!
//! Reads `GET /repos/{owner}/{repo}/events` newest-first, following
//! `Link: rel="next"` until the pages run out or fall behind the window.
//! Pushed commits, opened and merged pull requests, reviews and comments are
//! reported; other event types are skipped.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, LINK};
use serde::Deserialize;
use tracing::{debug, info, instrument, warn};

use super::{check_status, http_client, read_json, transport_error, ActivitySource};
use crate::config::GithubConfig;
use crate::error::SourceError;
use crate::models::{ActivityItem, ItemType, Source, Window};
use crate::registry::TeamConfig;

const GITHUB_WEB_URL: &str = "https://github.com";
const PAGE_SIZE: u32 = 100;

/// Upper bound on pages read per repository.
const MAX_PAGES: usize = 100;

/// The events API serves at most this many events per repository.
const EVENTS_API_LIMIT: usize = 300;

// =============================================================================
// Raw API shapes
// =============================================================================

#[derive(Debug, Deserialize)]
pub(crate) struct RawEvent {
    id: String,
    #[serde(rename = "type")]
    kind: String,
    actor: RawActor,
    repo: RawRepo,
    #[serde(default)]
    payload: RawPayload,
    created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
struct RawActor {
    login: String,
}

#[derive(Debug, Deserialize)]
struct RawRepo {
    name: String,
}

/// Union of the payload fields used by the reported event types.
#[derive(Debug, Default, Deserialize)]
struct RawPayload {
    #[serde(default)]
    action: Option<String>,
    #[serde(default, rename = "ref")]
    git_ref: Option<String>,
    #[serde(default)]
    head: Option<String>,
    #[serde(default)]
    push_id: Option<u64>,
    #[serde(default)]
    commits: Option<Vec<RawCommit>>,
    #[serde(default)]
    number: Option<u64>,
    #[serde(default)]
    pull_request: Option<RawPullRequest>,
    #[serde(default)]
    review: Option<RawReview>,
    #[serde(default)]
    comment: Option<RawComment>,
    #[serde(default)]
    issue: Option<RawIssue>,
}

#[derive(Debug, Deserialize)]
struct RawCommit {
    sha: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct RawPullRequest {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: Option<String>,
    #[serde(default)]
    merged: Option<bool>,
    #[serde(default)]
    merged_at: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawReview {
    id: u64,
    #[serde(default)]
    state: Option<String>,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: u64,
    #[serde(default)]
    html_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawIssue {
    number: u64,
    #[serde(default)]
    title: String,
    #[serde(default)]
    html_url: Option<String>,
}

// =============================================================================
// Source
// =============================================================================

/// GitHub REST client producing activity items.
#[derive(Clone)]
pub struct GithubSource {
    api_url: String,
    token: String,
    timeout: Duration,
}

impl GithubSource {
    #[must_use]
    pub fn new(config: &GithubConfig, timeout: Duration) -> Self {
        Self {
            api_url: config.api_url.trim_end_matches('/').to_string(),
            token: config.token.clone(),
            timeout,
        }
    }

    fn headers(&self) -> Result<HeaderMap, SourceError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            ACCEPT,
            HeaderValue::from_static("application/vnd.github+json"),
        );
        headers.insert(
            "X-GitHub-Api-Version",
            HeaderValue::from_static("2022-11-28"),
        );
        let mut auth = HeaderValue::from_str(&format!("Bearer {}", self.token))
            .map_err(|_| SourceError::unavailable(Source::Github, "GITHUB_TOKEN is not a valid header value"))?;
        auth.set_sensitive(true);
        headers.insert(AUTHORIZATION, auth);
        Ok(headers)
    }

    /// Fetch activity for the given `owner/name` repositories, in order.
    #[instrument(skip_all, fields(repos = ?repos))]
    pub async fn fetch_repos(
        &self,
        repos: &[String],
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError> {
        if repos.is_empty() {
            debug!("No GitHub repositories configured, skipping");
            return Ok(Vec::new());
        }

        let client = http_client(Source::Github, self.timeout, self.headers()?)?;
        let mut items = Vec::new();

        for repo in repos {
            let repo_items = self.fetch_repo(&client, repo, window).await?;
            debug!(repo = %repo, items = repo_items.len(), "Fetched GitHub repository events");
            items.extend(repo_items);
        }

        info!(repos = repos.len(), items = items.len(), "Collected GitHub activity");
        Ok(items)
    }

    async fn fetch_repo(
        &self,
        client: &reqwest::Client,
        repo: &str,
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError> {
        let what = format!("GitHub events for {repo}");
        let mut url = format!("{}/repos/{repo}/events?per_page={PAGE_SIZE}", self.api_url);
        let mut visited = HashSet::from([url.clone()]);
        let mut items = Vec::new();
        let mut events_seen = 0_usize;

        loop {
            let response = client
                .get(&url)
                .send()
                .await
                .map_err(|e| transport_error(Source::Github, &e))?;
            let response = check_status(Source::Github, response, &what).await?;
            let next = next_link(response.headers());
            let events: Vec<RawEvent> = read_json(Source::Github, response, &what).await?;

            events_seen += events.len();
            let reached_start = events.iter().any(|e| e.created_at < window.since);
            for event in &events {
                if window.contains(event.created_at) {
                    items.extend(map_event(event));
                }
            }

            match next {
                Some(_) if reached_start || events.is_empty() => break,
                Some(next) => {
                    if !visited.insert(next.clone()) {
                        return Err(SourceError::response(
                            Source::Github,
                            format!("{what}: pagination link revisits {next}"),
                        ));
                    }
                    if visited.len() > MAX_PAGES {
                        return Err(SourceError::response(
                            Source::Github,
                            format!("{what}: more than {MAX_PAGES} pages"),
                        ));
                    }
                    url = next;
                }
                None => {
                    if history_truncated(events_seen, reached_start) {
                        warn!(
                            repo = %repo,
                            events = events_seen,
                            since = %window.since,
                            "GitHub event history ended before the window start; older activity is missing"
                        );
                    }
                    break;
                }
            }
        }

        Ok(items)
    }
}

#[async_trait]
impl ActivitySource for GithubSource {
    fn source(&self) -> Source {
        Source::Github
    }

    async fn fetch(
        &self,
        team: &TeamConfig,
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError> {
        self.fetch_repos(&team.github_repos, window).await
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// Extract the `rel="next"` target from a `Link` header.
pub(crate) fn next_link(headers: &HeaderMap) -> Option<String> {
    let link = headers.get(LINK)?.to_str().ok()?;
    link.split(',').find_map(|part| {
        let (target, params) = part.split_once(';')?;
        params
            .split(';')
            .any(|p| p.trim() == r#"rel="next""#)
            .then(|| {
                target
                    .trim()
                    .trim_start_matches('<')
                    .trim_end_matches('>')
                    .to_string()
            })
    })
}

/// Whether the feed ran out at the API's event cap without reaching `since`.
pub(crate) fn history_truncated(events_seen: usize, reached_start: bool) -> bool {
    !reached_start && events_seen >= EVENTS_API_LIMIT
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

/// Map one event into zero or more activity items.
pub(crate) fn map_event(event: &RawEvent) -> Vec<ActivityItem> {
    let repo = event.repo.name.as_str();
    let payload = &event.payload;
    let item = |item_type, id: String, title: String, url: String| ActivityItem {
        source: Source::Github,
        item_type,
        id,
        actor: event.actor.login.clone(),
        title,
        url,
        timestamp: event.created_at,
        detail: None,
    };

    match event.kind.as_str() {
        "PushEvent" => match payload.commits.as_deref() {
            Some(commits) if !commits.is_empty() => commits
                .iter()
                .map(|c| {
                    item(
                        ItemType::Commit,
                        c.sha.clone(),
                        format!("[{repo}] {}", first_line(&c.message)),
                        format!("{GITHUB_WEB_URL}/{repo}/commit/{}", c.sha),
                    )
                })
                .collect(),
            _ => {
                let branch = payload
                    .git_ref
                    .as_deref()
                    .map_or("", |r| r.trim_start_matches("refs/heads/"));
                let url = payload.head.as_deref().map_or_else(
                    || format!("{GITHUB_WEB_URL}/{repo}"),
                    |sha| format!("{GITHUB_WEB_URL}/{repo}/commit/{sha}"),
                );
                let id = payload
                    .push_id
                    .map_or_else(|| format!("push:{}", event.id), |p| format!("push:{p}"));
                vec![item(
                    ItemType::Push,
                    id,
                    format!("[{repo}] pushed to {branch}"),
                    url,
                )]
            }
        },

        "PullRequestEvent" => {
            let Some(pr) = payload.pull_request.as_ref() else {
                return Vec::new();
            };
            let number = payload.number.unwrap_or(pr.number);
            let merged = pr.merged.unwrap_or(false) || pr.merged_at.is_some();
            let (item_type, action) = match payload.action.as_deref() {
                Some("opened") => (ItemType::PullRequest, "opened"),
                Some("closed") if merged => (ItemType::PullRequestMerged, "merged"),
                _ => return Vec::new(),
            };
            vec![item(
                item_type,
                format!("{repo}#{number}:{action}"),
                format!("[{repo}] PR #{number}: {}", pr.title),
                pr.html_url
                    .clone()
                    .unwrap_or_else(|| format!("{GITHUB_WEB_URL}/{repo}/pull/{number}")),
            )]
        }

        "PullRequestReviewEvent" => {
            let (Some(review), Some(pr)) = (payload.review.as_ref(), payload.pull_request.as_ref())
            else {
                return Vec::new();
            };
            let state = review.state.as_deref().unwrap_or("submitted").to_lowercase();
            vec![item(
                ItemType::Review,
                format!("review:{}", review.id),
                format!("[{repo}] Review ({state}) on PR #{}: {}", pr.number, pr.title),
                review
                    .html_url
                    .clone()
                    .unwrap_or_else(|| format!("{GITHUB_WEB_URL}/{repo}/pull/{}", pr.number)),
            )]
        }

        "PullRequestReviewCommentEvent" | "IssueCommentEvent" => {
            if payload.action.as_deref().is_some_and(|a| a != "created") {
                return Vec::new();
            }
            let Some(comment) = payload.comment.as_ref() else {
                return Vec::new();
            };
            let (number, title, fallback_url) = match (&payload.pull_request, &payload.issue) {
                (Some(pr), _) => (pr.number, pr.title.as_str(), pr.html_url.clone()),
                (None, Some(issue)) => (issue.number, issue.title.as_str(), issue.html_url.clone()),
                (None, None) => return Vec::new(),
            };
            vec![item(
                ItemType::Comment,
                format!("comment:{}", comment.id),
                format!("[{repo}] Comment on #{number}: {title}"),
                comment
                    .html_url
                    .clone()
                    .or(fallback_url)
                    .unwrap_or_else(|| format!("{GITHUB_WEB_URL}/{repo}")),
            )]
        }

        other => {
            debug!(event_type = other, event_id = %event.id, "Skipping GitHub event");
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(value: serde_json::Value) -> RawEvent {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_push_event_yields_one_item_per_commit() {
        let items = map_event(&event(json!({
            "id": "1",
            "type": "PushEvent",
            "actor": { "login": "bob" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T10:00:00Z",
            "payload": {
                "push_id": 77,
                "ref": "refs/heads/main",
                "commits": [
                    { "sha": "abc123", "message": "Fix login\n\nLonger body" },
                    { "sha": "def456", "message": "Add tests" }
                ]
            }
        })));

        assert_eq!(items.len(), 2);
        assert_eq!(items[0].item_type, ItemType::Commit);
        assert_eq!(items[0].id, "abc123");
        assert_eq!(items[0].title, "[org/api-service] Fix login");
        assert_eq!(items[0].url, "https://github.com/org/api-service/commit/abc123");
        assert_eq!(items[1].actor, "bob");
    }

    #[test]
    fn test_push_event_without_commit_list() {
        let items = map_event(&event(json!({
            "id": "2",
            "type": "PushEvent",
            "actor": { "login": "bob" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T10:00:00Z",
            "payload": { "push_id": 78, "ref": "refs/heads/feature/x", "head": "fff000" }
        })));

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].item_type, ItemType::Push);
        assert_eq!(items[0].id, "push:78");
        assert_eq!(items[0].title, "[org/api-service] pushed to feature/x");
    }

    #[test]
    fn test_pull_request_opened_and_merged() {
        let opened = map_event(&event(json!({
            "id": "3",
            "type": "PullRequestEvent",
            "actor": { "login": "alice" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T10:00:00Z",
            "payload": {
                "action": "opened",
                "number": 42,
                "pull_request": {
                    "number": 42,
                    "title": "Add endpoint",
                    "html_url": "https://github.com/org/api-service/pull/42"
                }
            }
        })));
        assert_eq!(opened.len(), 1);
        assert_eq!(opened[0].item_type, ItemType::PullRequest);
        assert_eq!(opened[0].id, "org/api-service#42:opened");
        assert_eq!(opened[0].title, "[org/api-service] PR #42: Add endpoint");

        let merged = map_event(&event(json!({
            "id": "4",
            "type": "PullRequestEvent",
            "actor": { "login": "alice" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T11:00:00Z",
            "payload": {
                "action": "closed",
                "number": 42,
                "pull_request": { "number": 42, "title": "Add endpoint", "merged": true }
            }
        })));
        assert_eq!(merged[0].item_type, ItemType::PullRequestMerged);
        assert_eq!(merged[0].id, "org/api-service#42:merged");
        assert_eq!(merged[0].url, "https://github.com/org/api-service/pull/42");

        let closed = map_event(&event(json!({
            "id": "5",
            "type": "PullRequestEvent",
            "actor": { "login": "alice" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T11:00:00Z",
            "payload": {
                "action": "closed",
                "number": 43,
                "pull_request": { "number": 43, "title": "Abandoned", "merged": false }
            }
        })));
        assert!(closed.is_empty());
    }

    #[test]
    fn test_review_and_comments() {
        let review = map_event(&event(json!({
            "id": "6",
            "type": "PullRequestReviewEvent",
            "actor": { "login": "carol" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T12:00:00Z",
            "payload": {
                "action": "created",
                "review": { "id": 900, "state": "APPROVED" },
                "pull_request": { "number": 42, "title": "Add endpoint" }
            }
        })));
        assert_eq!(review[0].item_type, ItemType::Review);
        assert_eq!(review[0].title, "[org/api-service] Review (approved) on PR #42: Add endpoint");

        let comment = map_event(&event(json!({
            "id": "7",
            "type": "IssueCommentEvent",
            "actor": { "login": "carol" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T12:30:00Z",
            "payload": {
                "action": "created",
                "issue": { "number": 12, "title": "Flaky CI" },
                "comment": { "id": 555, "html_url": "https://github.com/org/api-service/issues/12#issuecomment-555" }
            }
        })));
        assert_eq!(comment[0].item_type, ItemType::Comment);
        assert_eq!(comment[0].id, "comment:555");
        assert_eq!(comment[0].title, "[org/api-service] Comment on #12: Flaky CI");
    }

    #[test]
    fn test_unreported_event_types_are_skipped() {
        let items = map_event(&event(json!({
            "id": "8",
            "type": "WatchEvent",
            "actor": { "login": "dave" },
            "repo": { "name": "org/api-service" },
            "created_at": "2026-10-18T12:30:00Z",
            "payload": { "action": "started" }
        })));
        assert!(items.is_empty());
    }

    #[test]
    fn test_next_link() {
        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static(
                "<https://api.github.com/repositories/1/events?page=2>; rel=\"next\", \
                 <https://api.github.com/repositories/1/events?page=3>; rel=\"last\"",
            ),
        );
        assert_eq!(
            next_link(&headers).as_deref(),
            Some("https://api.github.com/repositories/1/events?page=2")
        );

        let mut headers = HeaderMap::new();
        headers.insert(
            LINK,
            HeaderValue::from_static("<https://api.github.com/repositories/1/events?page=1>; rel=\"first\""),
        );
        assert_eq!(next_link(&headers), None);
    }

    #[test]
    fn test_history_truncated_only_at_event_cap() {
        assert!(history_truncated(EVENTS_API_LIMIT, false));
        assert!(!history_truncated(EVENTS_API_LIMIT, true));
        // A quiet repository simply has no older events
        assert!(!history_truncated(12, false));
    }
}
