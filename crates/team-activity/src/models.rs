//! Shared activity types produced by sources and consumed by the report.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ActivityError;
use crate::registry::TeamConfig;

/// External system an activity item came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Jira,
    Github,
}

impl Source {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Jira => "jira",
            Self::Github => "github",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Kind of activity. New kinds may be added as sources learn more event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ItemType {
    IssueCreated,
    IssueUpdated,
    PullRequest,
    PullRequestMerged,
    Review,
    Commit,
    Push,
    Comment,
}

impl ItemType {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::IssueCreated => "issue_created",
            Self::IssueUpdated => "issue_updated",
            Self::PullRequest => "pull_request",
            Self::PullRequestMerged => "pull_request_merged",
            Self::Review => "review",
            Self::Commit => "commit",
            Self::Push => "push",
            Self::Comment => "comment",
        }
    }
}

impl fmt::Display for ItemType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One timestamped action by one person in Jira or GitHub.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActivityItem {
    pub source: Source,
    pub item_type: ItemType,
    /// Unique within `source`
    pub id: String,
    pub actor: String,
    pub title: String,
    pub url: String,
    pub timestamp: DateTime<Utc>,
    /// Extra context such as Jira field changes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

/// Inclusive `[since, until]` range activity is filtered against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Window {
    pub since: DateTime<Utc>,
    pub until: DateTime<Utc>,
}

impl Window {
    /// Window covering the `days` days before `until`.
    ///
    /// Fails when `days` is zero, larger than `max_days`, or reaches past the
    /// earliest representable instant.
    pub fn ending_at(
        until: DateTime<Utc>,
        days: u32,
        max_days: u32,
    ) -> Result<Self, ActivityError> {
        if days == 0 {
            return Err(ActivityError::Config(
                "lookback must be at least one day".to_string(),
            ));
        }
        if days > max_days {
            return Err(ActivityError::WindowTooLarge { days, max_days });
        }

        let since = Duration::try_days(i64::from(days))
            .and_then(|span| until.checked_sub_signed(span))
            .ok_or(ActivityError::WindowTooLarge { days, max_days })?;

        Ok(Self { since, until })
    }

    #[must_use]
    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        self.since <= timestamp && timestamp <= self.until
    }
}

/// Aggregated activity for one team over one window.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityReport {
    team: TeamConfig,
    window: Window,
    by_actor: BTreeMap<String, Vec<ActivityItem>>,
}

impl ActivityReport {
    pub(crate) fn new(
        team: TeamConfig,
        window: Window,
        by_actor: BTreeMap<String, Vec<ActivityItem>>,
    ) -> Self {
        Self {
            team,
            window,
            by_actor,
        }
    }

    #[must_use]
    pub const fn team(&self) -> &TeamConfig {
        &self.team
    }

    #[must_use]
    pub const fn window(&self) -> &Window {
        &self.window
    }

    /// Items per actor, newest first.
    #[must_use]
    pub const fn by_actor(&self) -> &BTreeMap<String, Vec<ActivityItem>> {
        &self.by_actor
    }

    #[must_use]
    pub fn item_count(&self) -> usize {
        self.by_actor.values().map(Vec::len).sum()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    /// Actors ordered by item count descending, then name ascending.
    #[must_use]
    pub fn actors_by_activity(&self) -> Vec<(&str, &[ActivityItem])> {
        let mut actors: Vec<(&str, &[ActivityItem])> = self
            .by_actor
            .iter()
            .map(|(actor, items)| (actor.as_str(), items.as_slice()))
            .collect();
        actors.sort_by(|a, b| b.1.len().cmp(&a.1.len()).then_with(|| a.0.cmp(b.0)));
        actors
    }
}
