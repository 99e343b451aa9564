//! Team activity reports across Jira and GitHub.
//!
//! This crate provides:
//! - A team registry mapping a slug to Jira projects and GitHub repositories
//! - Jira and GitHub activity sources behind one [`ActivitySource`] trait
//! - An aggregation pipeline that merges, deduplicates and windows activity
//! - Text and JSON report rendering
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use team_activity::{aggregate, render, ActivitySource, Config, GithubSource, JiraSource, TeamRegistry, Window};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let registry = TeamRegistry::load(&Config::teams_file_from_env())?;
//! let team = registry.resolve("api")?;
//! let config = Config::from_env()?;
//! let window = Window::ending_at(chrono::Utc::now(), 7, config.max_days)?;
//!
//! let sources: Vec<Arc<dyn ActivitySource>> = vec![
//!     Arc::new(JiraSource::new(&config.jira, config.http_timeout)),
//!     Arc::new(GithubSource::new(&config.github, config.http_timeout)),
//! ];
//! let report = aggregate(team, &window, &sources).await?;
//! println!("{}", render(&report));
//! # Ok(())
//! # }
//! ```

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod error;
pub mod models;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod sources;

pub use config::Config;
pub use error::{ActivityError, SourceError};
pub use models::{ActivityItem, ActivityReport, ItemType, Source, Window};
pub use pipeline::{aggregate, build_report};
pub use registry::{TeamConfig, TeamMember, TeamRegistry};
pub use render::{render, render_json, render_with, RenderOptions};
pub use sources::{ActivitySource, GithubSource, JiraSource};
