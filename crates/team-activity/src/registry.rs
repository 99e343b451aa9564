//! Team registry: resolves a team slug to its Jira projects and GitHub repos.
//!
//! Teams are declared in a TOML file:
//!
//! ```toml
//! [[teams]]
//! slug = "api"
//! name = "API Platform"
//! jira_project_keys = ["API"]
//! github_repos = ["org/api-service"]
//!
//! [[teams.members]]
//! name = "alice"
//! email = "alice@example.com"
//! github_user = "alice-gh"
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::ActivityError;

/// A person on a team and the identities they appear under in each source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamMember {
    /// Display name, used as the actor in reports
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    /// Jira display name, when it differs from `name`
    #[serde(default)]
    pub jira_name: Option<String>,
    #[serde(default)]
    pub github_user: Option<String>,
}

impl TeamMember {
    fn identities(&self) -> impl Iterator<Item = &str> {
        std::iter::once(self.name.as_str())
            .chain(self.email.as_deref())
            .chain(self.jira_name.as_deref())
            .chain(self.github_user.as_deref())
    }
}

/// Configuration of one team.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TeamConfig {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub jira_project_keys: BTreeSet<String>,
    /// `owner/name` identifiers
    #[serde(default)]
    pub github_repos: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<TeamMember>,
}

impl TeamConfig {
    /// Team without member identity mapping.
    pub fn new<K, R>(slug: impl Into<String>, jira_project_keys: K, github_repos: R) -> Self
    where
        K: IntoIterator,
        K::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        let slug = slug.into();
        Self {
            name: slug.clone(),
            slug,
            jira_project_keys: jira_project_keys.into_iter().map(Into::into).collect(),
            github_repos: github_repos.into_iter().map(Into::into).collect(),
            members: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_members(mut self, members: Vec<TeamMember>) -> Self {
        self.members = members;
        self
    }

    /// Map a source-specific identity to the member's display name.
    ///
    /// Unknown identities are returned unchanged.
    #[must_use]
    pub fn canonical_actor(&self, raw: &str) -> String {
        self.members
            .iter()
            .find(|m| m.identities().any(|id| id.eq_ignore_ascii_case(raw)))
            .map_or_else(|| raw.to_string(), |m| m.name.clone())
    }
}

#[derive(Debug, Deserialize)]
struct TeamsFile {
    #[serde(default)]
    teams: Vec<TeamConfig>,
}

/// Static table of teams, loaded once at startup.
#[derive(Debug, Clone, Default)]
pub struct TeamRegistry {
    teams: BTreeMap<String, TeamConfig>,
}

impl TeamRegistry {
    /// Load the team table from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read team table {}", path.display()))?;
        Self::from_toml_str(&contents)
            .with_context(|| format!("Invalid team table {}", path.display()))
    }

    /// Parse and validate a TOML team table.
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let file: TeamsFile = toml::from_str(contents).context("Failed to parse team table")?;
        Self::from_teams(file.teams)
    }

    /// Build a registry from already-constructed team configs.
    pub fn from_teams(teams: Vec<TeamConfig>) -> Result<Self> {
        let mut registry = BTreeMap::new();

        for mut team in teams {
            if team.slug.trim().is_empty() {
                bail!("team slug must not be empty");
            }
            if let Some(repo) = team.github_repos.iter().find(|r| !is_repo_identifier(r)) {
                bail!(
                    "team '{}': repository '{repo}' is not in owner/name form",
                    team.slug
                );
            }
            if team.name.is_empty() {
                team.name.clone_from(&team.slug);
            }

            let slug = team.slug.clone();
            if registry.insert(slug.clone(), team).is_some() {
                bail!("duplicate team slug '{slug}'");
            }
        }

        debug!(teams = registry.len(), "Loaded team registry");
        Ok(Self { teams: registry })
    }

    /// Look up a team by slug.
    pub fn resolve(&self, slug: &str) -> Result<&TeamConfig, ActivityError> {
        self.teams
            .get(slug)
            .ok_or_else(|| ActivityError::UnknownTeam(slug.to_string()))
    }

    /// Known slugs, sorted.
    pub fn slugs(&self) -> impl Iterator<Item = &str> {
        self.teams.keys().map(String::as_str)
    }
}

fn is_repo_identifier(repo: &str) -> bool {
    matches!(
        repo.split_once('/'),
        Some((owner, name)) if !owner.is_empty() && !name.is_empty() && !name.contains('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TEAMS: &str = r#"
        [[teams]]
        slug = "api"
        name = "API Platform"
        jira_project_keys = ["API", "PLAT"]
        github_repos = ["org/api-service", "org/gateway"]

        [[teams.members]]
        name = "alice"
        email = "alice@example.com"
        github_user = "alice-gh"

        [[teams]]
        slug = "web"
        jira_project_keys = ["WEB"]
    "#;

    #[test]
    fn test_resolve_known_team() {
        let registry = TeamRegistry::from_toml_str(TEAMS).unwrap();
        let team = registry.resolve("api").unwrap();

        assert_eq!(team.name, "API Platform");
        assert!(team.jira_project_keys.contains("PLAT"));
        assert_eq!(team.github_repos, vec!["org/api-service", "org/gateway"]);
        assert_eq!(team.members.len(), 1);
    }

    #[test]
    fn test_name_defaults_to_slug() {
        let registry = TeamRegistry::from_toml_str(TEAMS).unwrap();
        let team = registry.resolve("web").unwrap();
        assert_eq!(team.name, "web");
        assert!(team.github_repos.is_empty());
    }

    #[test]
    fn test_unknown_team() {
        let registry = TeamRegistry::from_toml_str(TEAMS).unwrap();
        let err = registry.resolve("mobile").unwrap_err();
        assert!(matches!(err, ActivityError::UnknownTeam(ref slug) if slug == "mobile"));
    }

    #[test]
    fn test_duplicate_slug_rejected() {
        let teams = vec![
            TeamConfig::new("api", ["API"], Vec::<String>::new()),
            TeamConfig::new("api", ["OTHER"], Vec::<String>::new()),
        ];
        let err = TeamRegistry::from_teams(teams).unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_malformed_repo_rejected() {
        let teams = vec![TeamConfig::new("api", ["API"], ["api-service"])];
        assert!(TeamRegistry::from_teams(teams).is_err());

        let teams = vec![TeamConfig::new("api", ["API"], ["org/api/extra"])];
        assert!(TeamRegistry::from_teams(teams).is_err());
    }

    #[test]
    fn test_canonical_actor_folds_identities() {
        let registry = TeamRegistry::from_toml_str(TEAMS).unwrap();
        let team = registry.resolve("api").unwrap();

        assert_eq!(team.canonical_actor("alice-gh"), "alice");
        assert_eq!(team.canonical_actor("Alice@Example.com"), "alice");
        assert_eq!(team.canonical_actor("bob"), "bob");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("teams.toml");
        std::fs::write(&path, TEAMS).unwrap();

        let registry = TeamRegistry::load(&path).unwrap();
        assert_eq!(registry.slugs().collect::<Vec<_>>(), vec!["api", "web"]);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = TeamRegistry::load(&dir.path().join("absent.toml")).unwrap_err();
        assert!(err.to_string().contains("Failed to read team table"));
    }
}
