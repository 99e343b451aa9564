//! Text and JSON rendering of an activity report.

use std::fmt::Write;

use crate::models::{ActivityItem, ActivityReport};

const RULE_WIDTH: usize = 80;
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M UTC";

/// Message printed when the window holds no activity at all.
pub const NO_ACTIVITY: &str = "No activity in window.";

/// Rendering switches.
#[derive(Debug, Clone, Copy, Default)]
pub struct RenderOptions {
    /// Omit item details such as Jira field changes
    pub only_title: bool,
}

/// Render with default options.
#[must_use]
pub fn render(report: &ActivityReport) -> String {
    render_with(report, RenderOptions::default())
}

/// Render the report as human-readable text.
///
/// Actors with more items come first; ties are alphabetical.
#[must_use]
pub fn render_with(report: &ActivityReport, options: RenderOptions) -> String {
    let mut out = String::new();
    let team = report.team();
    let window = report.window();

    let _ = writeln!(
        out,
        "Activity for team '{}' ({}) from {} to {}",
        team.name,
        team.slug,
        window.since.format(TIME_FORMAT),
        window.until.format(TIME_FORMAT)
    );
    let _ = writeln!(out, "{}", "-".repeat(RULE_WIDTH));

    if report.is_empty() {
        let _ = writeln!(out, "{NO_ACTIVITY}");
        return out;
    }

    for (actor, items) in report.actors_by_activity() {
        let noun = if items.len() == 1 { "item" } else { "items" };
        let _ = writeln!(out, "\n{actor} ({} {noun})", items.len());
        for item in items {
            render_item(&mut out, item, options);
        }
    }

    out
}

fn render_item(out: &mut String, item: &ActivityItem, options: RenderOptions) {
    let _ = writeln!(
        out,
        "  {}  {:<19}  {}",
        item.timestamp.format(TIME_FORMAT),
        item.item_type.as_str(),
        item.title
    );
    let _ = writeln!(out, "      {}", item.url);
    if !options.only_title {
        if let Some(detail) = &item.detail {
            let _ = writeln!(out, "      └─ {detail}");
        }
    }
}

/// Render the report as pretty-printed JSON.
pub fn render_json(report: &ActivityReport) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(report)
}
