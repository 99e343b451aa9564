//! Aggregation pipeline: runs every source and merges their items into a report.

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::error::{ActivityError, SourceError};
use crate::models::{ActivityItem, ActivityReport, Source, Window};
use crate::registry::TeamConfig;
use crate::sources::ActivitySource;

/// Collect a team's activity from every source.
///
/// Sources run concurrently but their results are merged in the order given,
/// so the report does not depend on which source answers first. Any source
/// failure fails the whole run.
pub async fn aggregate(
    team: &TeamConfig,
    window: &Window,
    sources: &[Arc<dyn ActivitySource>],
) -> Result<ActivityReport, ActivityError> {
    info!(
        team = %team.slug,
        since = %window.since,
        until = %window.until,
        sources = sources.len(),
        "Collecting team activity"
    );

    let results = join_all(sources.iter().map(|source| async move {
        let provider = source.source();
        debug!(source = %provider, "Fetching activity");
        (provider, source.fetch(team, window).await)
    }))
    .await;

    let mut batches = Vec::with_capacity(results.len());
    let mut failures: Vec<SourceError> = Vec::new();

    for (provider, result) in results {
        match result {
            Ok(items) => {
                debug!(source = %provider, items = items.len(), "Source returned activity");
                batches.push(items);
            }
            Err(e) => {
                warn!(source = %provider, error = %e, "Source failed");
                failures.push(e);
            }
        }
    }

    if let Some(cause) = failures.into_iter().next() {
        if batches.is_empty() {
            return Err(ActivityError::Source(cause));
        }
        return Err(ActivityError::PartialSourceFailure {
            provider: cause.provider(),
            cause,
        });
    }

    let report = build_report(team.clone(), *window, batches);
    info!(
        actors = report.by_actor().len(),
        items = report.item_count(),
        "Aggregated team activity"
    );
    Ok(report)
}

/// Merge per-source batches, given in invocation order, into a report.
///
/// Keeps the first item seen for each `(source, id)`, drops items outside the
/// window, groups by canonical actor and sorts each group newest first.
#[must_use]
pub fn build_report(
    team: TeamConfig,
    window: Window,
    batches: Vec<Vec<ActivityItem>>,
) -> ActivityReport {
    let mut seen: HashSet<(Source, String)> = HashSet::new();
    let mut by_actor: BTreeMap<String, Vec<ActivityItem>> = BTreeMap::new();
    let mut duplicates = 0_usize;
    let mut outside = 0_usize;

    for mut item in batches.into_iter().flatten() {
        if !seen.insert((item.source, item.id.clone())) {
            duplicates += 1;
            continue;
        }
        if !window.contains(item.timestamp) {
            outside += 1;
            continue;
        }

        let actor = team.canonical_actor(&item.actor);
        if actor != item.actor {
            item.actor.clone_from(&actor);
        }
        by_actor.entry(actor).or_default().push(item);
    }

    for items in by_actor.values_mut() {
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
    }

    debug!(duplicates, outside, "Filtered activity");
    ActivityReport::new(team, window, by_actor)
}
