//! Jira Cloud activity source.
//!
//! Searches issues updated in the window with JQL and expands their
//! changelogs. Each issue yields:
//!
//! - `issue_created` when the issue itself was created inside the window
//! - `issue_updated` for every changelog entry with a reportable field change
//! - `comment` for every comment posted inside the window
//!
//! Search results embed at most a page of changelog and comments per issue;
//! when Jira reports a larger `total` the rest is read from the issue's
//! `changelog` and `comment` endpoints.
//!
//! # Configuration
//!
//! - `JIRA_BASE_URL`: Jira instance URL (e.g., `https://your-domain.atlassian.net`)
//! - `JIRA_USERNAME`: User email for basic authentication
//! - `JIRA_API_TOKEN`: Jira API token

use std::collections::{BTreeSet, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, info, instrument};

use super::{check_status, http_client, read_json, transport_error, ActivitySource};
use crate::config::JiraConfig;
use crate::error::SourceError;
use crate::models::{ActivityItem, ItemType, Source, Window};
use crate::registry::TeamConfig;

const SEARCH_PATH: &str = "/rest/api/3/search/jql";
const SEARCH_FIELDS: &str = "summary,status,created,creator,reporter,comment";
const PAGE_SIZE: u32 = 100;

/// Upper bound on pages read from any one paginated resource.
const MAX_PAGES: usize = 1000;

/// Field changes that are noise in an activity report.
const IGNORED_FIELDS: &[&str] = &["description", "Bug Template"];

// =============================================================================
// Raw API shapes
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RawSearchPage {
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    next_page_token: Option<String>,
    #[serde(default)]
    is_last: Option<bool>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct RawIssue {
    key: String,
    fields: RawFields,
    #[serde(default)]
    changelog: Option<RawChangelog>,
}

#[derive(Debug, Deserialize)]
struct RawFields {
    #[serde(default)]
    summary: String,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    creator: Option<RawUser>,
    #[serde(default)]
    reporter: Option<RawUser>,
    #[serde(default)]
    comment: Option<RawCommentPage>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawUser {
    #[serde(default)]
    email_address: Option<String>,
    #[serde(default)]
    display_name: Option<String>,
    #[serde(default)]
    account_id: Option<String>,
}

/// Changelog embedded by `expand=changelog`; `total` exceeds `histories`
/// when Jira truncated it.
#[derive(Debug, Deserialize)]
struct RawChangelog {
    #[serde(default)]
    histories: Vec<RawHistory>,
    #[serde(default)]
    total: Option<usize>,
}

/// One page of `GET /rest/api/3/issue/{key}/changelog`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawChangelogPage {
    #[serde(default)]
    values: Vec<RawHistory>,
    #[serde(default)]
    total: Option<usize>,
    #[serde(default)]
    is_last: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawHistory {
    id: String,
    #[serde(default)]
    author: Option<RawUser>,
    created: String,
    #[serde(default)]
    items: Vec<RawChangeItem>,
}

#[derive(Debug, Deserialize)]
struct RawChangeItem {
    field: String,
    #[serde(default, rename = "fromString")]
    from_value: Option<String>,
    #[serde(default, rename = "toString")]
    to_value: Option<String>,
}

/// Comment page, both embedded in the issue fields and from
/// `GET /rest/api/3/issue/{key}/comment`.
#[derive(Debug, Deserialize)]
struct RawCommentPage {
    #[serde(default)]
    comments: Vec<RawComment>,
    #[serde(default)]
    total: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: String,
    #[serde(default)]
    author: Option<RawUser>,
    created: String,
}

// =============================================================================
// Source
// =============================================================================

/// Jira REST client producing activity items.
#[derive(Clone)]
pub struct JiraSource {
    base_url: String,
    username: String,
    api_token: String,
    timeout: Duration,
}

impl JiraSource {
    #[must_use]
    pub fn new(config: &JiraConfig, timeout: Duration) -> Self {
        Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            username: config.username.clone(),
            api_token: config.api_token.clone(),
            timeout,
        }
    }

    /// Fetch activity for the given projects, following pagination to the end.
    #[instrument(skip_all, fields(projects = ?project_keys))]
    pub async fn fetch_projects(
        &self,
        project_keys: &BTreeSet<String>,
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError> {
        if project_keys.is_empty() {
            debug!("No Jira projects configured, skipping");
            return Ok(Vec::new());
        }

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let client = http_client(Source::Jira, self.timeout, headers)?;

        let url = format!("{}{SEARCH_PATH}", self.base_url);
        let jql = build_jql(project_keys, window);
        debug!(jql = %jql, "Searching Jira issues");

        let mut items = Vec::new();
        let mut next_page_token: Option<String> = None;
        let mut seen_tokens = HashSet::new();
        let mut pages = 0_usize;
        let mut issues = 0_usize;

        loop {
            let mut query = vec![
                ("jql", jql.clone()),
                ("fields", SEARCH_FIELDS.to_string()),
                ("expand", "changelog".to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            if let Some(token) = &next_page_token {
                query.push(("nextPageToken", token.clone()));
            }

            let response = client
                .get(&url)
                .basic_auth(&self.username, Some(&self.api_token))
                .query(&query)
                .send()
                .await
                .map_err(|e| transport_error(Source::Jira, &e))?;
            let response = check_status(Source::Jira, response, "Jira search").await?;
            let page: RawSearchPage = read_json(Source::Jira, response, "Jira search page").await?;

            pages += 1;
            issues += page.issues.len();
            debug!(page = pages, issues = page.issues.len(), "Fetched Jira page");

            let is_last = page.is_last.unwrap_or(false);
            for mut issue in page.issues {
                self.complete_issue(&client, &mut issue).await?;
                items.extend(map_issue(&issue, &self.base_url, window)?);
            }

            match page.next_page_token {
                Some(token) if !is_last => {
                    if !seen_tokens.insert(token.clone()) {
                        return Err(SourceError::response(
                            Source::Jira,
                            format!("search pagination repeated page token '{token}'"),
                        ));
                    }
                    if pages >= MAX_PAGES {
                        return Err(SourceError::response(
                            Source::Jira,
                            format!("search returned more than {MAX_PAGES} pages"),
                        ));
                    }
                    next_page_token = Some(token);
                }
                _ => break,
            }
        }

        info!(pages, issues, items = items.len(), "Collected Jira activity");
        Ok(items)
    }

    /// Replace a truncated embedded changelog or comment list with the full one.
    async fn complete_issue(
        &self,
        client: &reqwest::Client,
        issue: &mut RawIssue,
    ) -> Result<(), SourceError> {
        if let Some(changelog) = issue.changelog.as_mut() {
            if changelog.total.is_some_and(|total| total > changelog.histories.len()) {
                debug!(issue = %issue.key, total = ?changelog.total, "Fetching full Jira changelog");
                let url = format!("{}/rest/api/3/issue/{}/changelog", self.base_url, issue.key);
                changelog.histories = self
                    .fetch_offset_pages(
                        client,
                        &url,
                        &format!("Jira changelog for {}", issue.key),
                        |page: RawChangelogPage| {
                            (page.values, page.total, page.is_last.unwrap_or(false))
                        },
                    )
                    .await?;
            }
        }

        if let Some(comment) = issue.fields.comment.as_mut() {
            if comment.total.is_some_and(|total| total > comment.comments.len()) {
                debug!(issue = %issue.key, total = ?comment.total, "Fetching all Jira comments");
                let url = format!("{}/rest/api/3/issue/{}/comment", self.base_url, issue.key);
                comment.comments = self
                    .fetch_offset_pages(
                        client,
                        &url,
                        &format!("Jira comments for {}", issue.key),
                        |page: RawCommentPage| (page.comments, page.total, false),
                    )
                    .await?;
            }
        }

        Ok(())
    }

    /// Read every entry of a `startAt`/`maxResults` paginated resource.
    ///
    /// `split` yields a page's entries, its reported total and whether it is
    /// the last page.
    async fn fetch_offset_pages<P, T, F>(
        &self,
        client: &reqwest::Client,
        url: &str,
        what: &str,
        split: F,
    ) -> Result<Vec<T>, SourceError>
    where
        P: DeserializeOwned,
        F: Fn(P) -> (Vec<T>, Option<usize>, bool),
    {
        let mut entries = Vec::new();

        for _ in 0..MAX_PAGES {
            let query = [
                ("startAt", entries.len().to_string()),
                ("maxResults", PAGE_SIZE.to_string()),
            ];
            let response = client
                .get(url)
                .basic_auth(&self.username, Some(&self.api_token))
                .query(&query)
                .send()
                .await
                .map_err(|e| transport_error(Source::Jira, &e))?;
            let response = check_status(Source::Jira, response, what).await?;
            let page: P = read_json(Source::Jira, response, what).await?;

            let (values, total, is_last) = split(page);
            let fetched = values.len();
            entries.extend(values);

            let complete = total.map_or(true, |total| entries.len() >= total);
            if fetched == 0 || is_last || complete {
                return Ok(entries);
            }
        }

        Err(SourceError::response(
            Source::Jira,
            format!("{what}: more than {MAX_PAGES} pages"),
        ))
    }
}

#[async_trait]
impl ActivitySource for JiraSource {
    fn source(&self) -> Source {
        Source::Jira
    }

    async fn fetch(
        &self,
        team: &TeamConfig,
        window: &Window,
    ) -> Result<Vec<ActivityItem>, SourceError> {
        self.fetch_projects(&team.jira_project_keys, window).await
    }
}

// =============================================================================
// Mapping
// =============================================================================

/// JQL for issues in `project_keys` updated around the window.
///
/// JQL dates are read in the Jira user's time zone, so both bounds are widened
/// by a day; exact filtering happens on the mapped timestamps.
pub(crate) fn build_jql(project_keys: &BTreeSet<String>, window: &Window) -> String {
    let projects = project_keys
        .iter()
        .map(|k| format!("\"{}\"", k.replace('\\', "\\\\").replace('"', "\\\"")))
        .collect::<Vec<_>>()
        .join(", ");
    let day = ChronoDuration::days(1);
    let since = window
        .since
        .checked_sub_signed(day)
        .unwrap_or(window.since)
        .format("%Y-%m-%d %H:%M");
    let until = window
        .until
        .checked_add_signed(day)
        .unwrap_or(window.until)
        .format("%Y-%m-%d %H:%M");

    format!(
        "project in ({projects}) AND updated >= \"{since}\" AND updated <= \"{until}\" ORDER BY updated DESC"
    )
}

/// Parse Jira's `2024-01-15T10:30:00.000+0000` timestamps.
pub(crate) fn parse_jira_time(value: &str) -> Result<DateTime<Utc>, SourceError> {
    DateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S%.f%z")
        .or_else(|_| DateTime::parse_from_rfc3339(value))
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| SourceError::response(Source::Jira, format!("invalid timestamp '{value}': {e}")))
}

fn actor_name(user: Option<&RawUser>) -> String {
    user.and_then(|u| {
        u.email_address
            .clone()
            .or_else(|| u.display_name.clone())
            .or_else(|| u.account_id.clone())
    })
    .unwrap_or_else(|| "unknown".to_string())
}

fn describe_changes(items: &[RawChangeItem]) -> Option<String> {
    let changes: Vec<String> = items
        .iter()
        .filter(|item| !IGNORED_FIELDS.contains(&item.field.as_str()))
        .map(|item| {
            format!(
                "{}: {} → {}",
                item.field,
                item.from_value.as_deref().unwrap_or("None"),
                item.to_value.as_deref().unwrap_or("None")
            )
        })
        .collect();

    if changes.is_empty() {
        None
    } else {
        Some(changes.join("; "))
    }
}

/// Map one issue into its in-window activity items.
pub(crate) fn map_issue(
    issue: &RawIssue,
    base_url: &str,
    window: &Window,
) -> Result<Vec<ActivityItem>, SourceError> {
    let title = format!("{}: {}", issue.key, issue.fields.summary);
    let url = format!("{base_url}/browse/{}", issue.key);
    let item = |item_type, id: String, actor, timestamp, detail| ActivityItem {
        source: Source::Jira,
        item_type,
        id,
        actor,
        title: title.clone(),
        url: url.clone(),
        timestamp,
        detail,
    };

    let mut items = Vec::new();

    if let Some(created) = issue.fields.created.as_deref() {
        let created = parse_jira_time(created)?;
        if window.contains(created) {
            let creator = issue.fields.creator.as_ref().or(issue.fields.reporter.as_ref());
            items.push(item(
                ItemType::IssueCreated,
                format!("{}:created", issue.key),
                actor_name(creator),
                created,
                None,
            ));
        }
    }

    let histories = issue.changelog.as_ref().map_or(&[][..], |c| &c.histories[..]);
    for history in histories {
        let timestamp = parse_jira_time(&history.created)?;
        if !window.contains(timestamp) {
            continue;
        }
        let Some(detail) = describe_changes(&history.items) else {
            continue;
        };
        items.push(item(
            ItemType::IssueUpdated,
            format!("{}:history:{}", issue.key, history.id),
            actor_name(history.author.as_ref()),
            timestamp,
            Some(detail),
        ));
    }

    let comments = issue.fields.comment.as_ref().map_or(&[][..], |c| &c.comments[..]);
    for comment in comments {
        let timestamp = parse_jira_time(&comment.created)?;
        if !window.contains(timestamp) {
            continue;
        }
        items.push(item(
            ItemType::Comment,
            format!("{}:comment:{}", issue.key, comment.id),
            actor_name(comment.author.as_ref()),
            timestamp,
            None,
        ));
    }

    Ok(items)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn window() -> Window {
        Window {
            since: Utc.with_ymd_and_hms(2026, 10, 12, 12, 0, 0).unwrap(),
            until: Utc.with_ymd_and_hms(2026, 10, 19, 12, 0, 0).unwrap(),
        }
    }

    fn issue() -> RawIssue {
        serde_json::from_value(json!({
            "key": "API-7",
            "fields": {
                "summary": "Rate limit login endpoint",
                "created": "2026-10-14T09:00:00.000+0000",
                "creator": { "emailAddress": "alice@example.com", "displayName": "Alice" },
                "comment": {
                    "comments": [
                        {
                            "id": "501",
                            "author": { "displayName": "Bob" },
                            "created": "2026-10-15T10:00:00.000+0000"
                        },
                        {
                            "id": "400",
                            "author": { "displayName": "Bob" },
                            "created": "2026-09-01T10:00:00.000+0000"
                        }
                    ]
                }
            },
            "changelog": {
                "histories": [
                    {
                        "id": "9001",
                        "author": { "emailAddress": "alice@example.com" },
                        "created": "2026-10-16T08:30:00.000+0200",
                        "items": [
                            { "field": "status", "fromString": "To Do", "toString": "In Progress" },
                            { "field": "description", "fromString": "a", "toString": "b" }
                        ]
                    },
                    {
                        "id": "9002",
                        "author": { "emailAddress": "alice@example.com" },
                        "created": "2026-10-17T08:30:00.000+0000",
                        "items": [
                            { "field": "description", "fromString": "b", "toString": "c" }
                        ]
                    },
                    {
                        "id": "8000",
                        "author": { "accountId": "abc123" },
                        "created": "2026-10-01T08:30:00.000+0000",
                        "items": [
                            { "field": "status", "fromString": "Backlog", "toString": "To Do" }
                        ]
                    }
                ]
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_parse_jira_time_offsets() {
        let t = parse_jira_time("2026-10-16T08:30:00.000+0200").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 10, 16, 6, 30, 0).unwrap());

        let t = parse_jira_time("2026-10-16T08:30:00Z").unwrap();
        assert_eq!(t, Utc.with_ymd_and_hms(2026, 10, 16, 8, 30, 0).unwrap());

        let err = parse_jira_time("yesterday").unwrap_err();
        assert!(matches!(err, SourceError::Response { provider: Source::Jira, .. }));
    }

    #[test]
    fn test_map_issue_creation_history_and_comments() {
        let items = map_issue(&issue(), "https://example.atlassian.net", &window()).unwrap();

        let ids: Vec<&str> = items.iter().map(|i| i.id.as_str()).collect();
        assert_eq!(ids, vec!["API-7:created", "API-7:history:9001", "API-7:comment:501"]);

        let created = &items[0];
        assert_eq!(created.item_type, ItemType::IssueCreated);
        assert_eq!(created.actor, "alice@example.com");
        assert_eq!(created.title, "API-7: Rate limit login endpoint");
        assert_eq!(created.url, "https://example.atlassian.net/browse/API-7");

        let updated = &items[1];
        assert_eq!(updated.item_type, ItemType::IssueUpdated);
        assert_eq!(updated.detail.as_deref(), Some("status: To Do → In Progress"));

        let comment = &items[2];
        assert_eq!(comment.item_type, ItemType::Comment);
        assert_eq!(comment.actor, "Bob");
    }

    #[test]
    fn test_map_issue_without_changelog() {
        let issue: RawIssue = serde_json::from_value(json!({
            "key": "API-8",
            "fields": { "summary": "Old issue", "created": "2025-01-01T00:00:00.000+0000" }
        }))
        .unwrap();

        let items = map_issue(&issue, "https://example.atlassian.net", &window()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn test_actor_falls_back_to_account_id() {
        let user = RawUser {
            email_address: None,
            display_name: None,
            account_id: Some("abc123".to_string()),
        };
        assert_eq!(actor_name(Some(&user)), "abc123");
        assert_eq!(actor_name(None), "unknown");
    }

    #[test]
    fn test_build_jql_widens_bounds() {
        let keys: BTreeSet<String> = ["WEB", "API"].iter().map(|s| (*s).to_string()).collect();
        let jql = build_jql(&keys, &window());
        assert_eq!(
            jql,
            "project in (\"API\", \"WEB\") AND updated >= \"2026-10-11 12:00\" \
             AND updated <= \"2026-10-20 12:00\" ORDER BY updated DESC"
        );
    }

    #[test]
    fn test_build_jql_at_calendar_limits() {
        let keys: BTreeSet<String> = std::iter::once("API".to_string()).collect();
        let window = Window {
            since: DateTime::<Utc>::MIN_UTC,
            until: DateTime::<Utc>::MAX_UTC,
        };
        let jql = build_jql(&keys, &window);
        assert!(jql.starts_with("project in (\"API\") AND updated >= "));
    }

    #[test]
    fn test_embedded_totals_are_read() {
        let issue: RawIssue = serde_json::from_value(json!({
            "key": "API-9",
            "fields": {
                "summary": "Busy issue",
                "comment": { "startAt": 0, "maxResults": 1, "total": 3, "comments": [] }
            },
            "changelog": { "startAt": 0, "maxResults": 1, "total": 4, "histories": [] }
        }))
        .unwrap();

        assert_eq!(issue.changelog.and_then(|c| c.total), Some(4));
        assert_eq!(issue.fields.comment.and_then(|c| c.total), Some(3));
    }
}
