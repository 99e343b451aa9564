//! Runtime configuration, read once from the environment.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{anyhow, Result};

/// Default GitHub REST endpoint.
pub const GITHUB_API_URL: &str = "https://api.github.com";

/// Default per-request timeout.
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;

/// Team table used when `TEAM_ACTIVITY_TEAMS_FILE` is unset.
pub const DEFAULT_TEAMS_FILE: &str = "teams.toml";

/// GitHub's events API only retains the last 90 days.
pub const DEFAULT_MAX_DAYS: u32 = 90;

/// Jira Cloud credentials.
#[derive(Clone)]
pub struct JiraConfig {
    /// Instance URL, e.g. `https://your-domain.atlassian.net`
    pub base_url: String,
    pub username: String,
    pub api_token: String,
}

impl std::fmt::Debug for JiraConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JiraConfig")
            .field("base_url", &self.base_url)
            .field("username", &self.username)
            .field("api_token", &"<redacted>")
            .finish()
    }
}

/// GitHub credentials and endpoint.
#[derive(Clone)]
pub struct GithubConfig {
    pub api_url: String,
    pub token: String,
}

impl std::fmt::Debug for GithubConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GithubConfig")
            .field("api_url", &self.api_url)
            .field("token", &"<redacted>")
            .finish()
    }
}

/// Everything the report run needs besides CLI flags.
#[derive(Debug, Clone)]
pub struct Config {
    pub jira: JiraConfig,
    pub github: GithubConfig,
    /// Timeout applied to every outbound request.
    pub http_timeout: Duration,
    /// Largest accepted lookback in days.
    pub max_days: u32,
}

impl Config {
    /// Build the configuration from environment variables.
    ///
    /// Required: `JIRA_BASE_URL`, `JIRA_USERNAME`, `JIRA_API_TOKEN`, `GITHUB_TOKEN`.
    ///
    /// Optional: `GITHUB_API_URL`, `TEAM_ACTIVITY_HTTP_TIMEOUT_SECS`,
    /// `TEAM_ACTIVITY_MAX_DAYS`.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Team table path from `TEAM_ACTIVITY_TEAMS_FILE`.
    ///
    /// Read separately from the credentials so a team can be resolved
    /// before any source is configured.
    #[must_use]
    pub fn teams_file_from_env() -> PathBuf {
        Self::teams_file_from_lookup(|key| env::var(key).ok())
    }

    pub fn teams_file_from_lookup<F>(lookup: F) -> PathBuf
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup("TEAM_ACTIVITY_TEAMS_FILE")
            .filter(|v| !v.trim().is_empty())
            .map_or_else(|| PathBuf::from(DEFAULT_TEAMS_FILE), PathBuf::from)
    }

    /// Build the configuration from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let required = |key: &str| var(key).ok_or_else(|| anyhow!("{key} is not set"));

        let jira = JiraConfig {
            base_url: required("JIRA_BASE_URL")?.trim_end_matches('/').to_string(),
            username: required("JIRA_USERNAME")?,
            api_token: required("JIRA_API_TOKEN")?,
        };

        let github = GithubConfig {
            api_url: var("GITHUB_API_URL")
                .map_or_else(|| GITHUB_API_URL.to_string(), |u| u.trim_end_matches('/').to_string()),
            token: required("GITHUB_TOKEN")?,
        };

        let http_timeout_secs = match var("TEAM_ACTIVITY_HTTP_TIMEOUT_SECS") {
            Some(v) => v
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or_else(|| anyhow!("TEAM_ACTIVITY_HTTP_TIMEOUT_SECS must be a positive integer, got '{v}'"))?,
            None => DEFAULT_HTTP_TIMEOUT_SECS,
        };

        let max_days = match var("TEAM_ACTIVITY_MAX_DAYS") {
            Some(v) => v
                .parse::<u32>()
                .ok()
                .filter(|days| *days > 0)
                .ok_or_else(|| anyhow!("TEAM_ACTIVITY_MAX_DAYS must be a positive integer, got '{v}'"))?,
            None => DEFAULT_MAX_DAYS,
        };

        Ok(Self {
            jira,
            github,
            http_timeout: Duration::from_secs(http_timeout_secs),
            max_days,
        })
    }
}
