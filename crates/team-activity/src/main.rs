//! team-activity - report a team's recent Jira and GitHub activity.
//!
//! # Environment Variables
//!
//! - `JIRA_BASE_URL`, `JIRA_USERNAME`, `JIRA_API_TOKEN` - Jira credentials (required)
//! - `GITHUB_TOKEN` - GitHub token (required)
//! - `TEAM_ACTIVITY_TEAMS_FILE` - team table path (default: `teams.toml`)
//!
//! A `.env` file in the working directory is loaded first when present.
//!
//! # Examples
//!
//! ```bash
//! team-activity --team api
//! team-activity --team api --days 7 --only-title
//! team-activity --team api --days 7 --format json
//! ```

// CLI binaries legitimately need println! for user output
#![allow(clippy::disallowed_macros)]

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tracing::{debug, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use team_activity::{
    aggregate, render_json, render_with, ActivityError, ActivitySource, Config, GithubSource,
    JiraSource, RenderOptions, TeamRegistry, Window,
};

/// Report a team's recent Jira and GitHub activity.
#[derive(Debug, Parser)]
#[command(name = "team-activity")]
#[command(about = "Fetch team activities from Jira and GitHub")]
#[command(version)]
struct Cli {
    /// Team slug (e.g., api)
    #[arg(long)]
    team: String,

    /// Number of days to look back
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..))]
    days: u32,

    /// Enable verbose debug output on stderr
    #[arg(short, long)]
    verbose: bool,

    /// Show only item titles without change details
    #[arg(long)]
    only_title: bool,

    /// Output format: text, json
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Team table path (overrides `TEAM_ACTIVITY_TEAMS_FILE`)
    #[arg(long)]
    teams_file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[tokio::main]
async fn main() -> ExitCode {
    let dotenv = dotenvy::dotenv();
    let cli = Cli::parse();

    // Logs go to stderr so the report on stdout stays clean
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("warn,team_activity=debug")
        } else {
            EnvFilter::new("warn")
        }
    });
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .init();

    if let Ok(path) = &dotenv {
        debug!(path = %path.display(), "Loaded environment file");
    }
    if let Some(e) = dotenv_failure(&dotenv) {
        warn!(error = %e, "Ignoring unreadable .env file");
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// A `.env` load failure worth reporting; a missing file is not one.
fn dotenv_failure(result: &dotenvy::Result<PathBuf>) -> Option<&dotenvy::Error> {
    result.as_ref().err().filter(|e| !e.not_found())
}

async fn run(cli: Cli) -> Result<()> {
    let teams_file = cli.teams_file.unwrap_or_else(Config::teams_file_from_env);

    debug!(team = %cli.team, teams_file = %teams_file.display(), "Looking up team");
    let registry = TeamRegistry::load(&teams_file)?;
    let team = registry.resolve(&cli.team).inspect_err(|_| {
        debug!(known = ?registry.slugs().collect::<Vec<_>>(), "Team not found");
    })?;
    debug!(
        team = %team.name,
        projects = team.jira_project_keys.len(),
        repos = team.github_repos.len(),
        members = team.members.len(),
        "Found team"
    );

    let config = Config::from_env().context("Failed to load configuration")?;

    let window = Window::ending_at(Utc::now(), cli.days, config.max_days)?;

    let sources: Vec<Arc<dyn ActivitySource>> = vec![
        Arc::new(JiraSource::new(&config.jira, config.http_timeout)),
        Arc::new(GithubSource::new(&config.github, config.http_timeout)),
    ];
    let report = aggregate(team, &window, &sources).await?;

    match cli.format {
        OutputFormat::Text => {
            let options = RenderOptions {
                only_title: cli.only_title,
            };
            print!("{}", render_with(&report, options));
        }
        OutputFormat::Json => {
            println!("{}", render_json(&report).context("Failed to serialize report")?);
        }
    }

    Ok(())
}

/// Exit code for a failed run; configuration and I/O failures map to 1.
fn exit_code(err: &anyhow::Error) -> u8 {
    err.downcast_ref::<ActivityError>()
        .map_or(1, ActivityError::exit_code)
}
