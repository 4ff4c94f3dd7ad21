//! Summary statistics over the live and historical sets.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::models::DisasterEvent;

/// How far back "recent activity" reaches.
const RECENT_DAYS: i64 = 7;

/// An event dated within the recent window.
#[derive(Debug, Clone, Serialize)]
pub struct RecentEvent {
    pub days_ago: i64,
    #[serde(flatten)]
    pub event: DisasterEvent,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct Stats {
    pub total_live: usize,
    pub total_historical: usize,
    pub by_type: BTreeMap<String, usize>,
    pub by_country: BTreeMap<String, usize>,
    /// Severities other than "Unknown"
    pub by_severity: BTreeMap<String, usize>,
    /// Most recent first
    pub recent: Vec<RecentEvent>,
}

impl Stats {
    /// Countries with the most events, largest first.
    #[must_use]
    pub fn top_countries(&self, n: usize) -> Vec<(&str, usize)> {
        let mut counts: Vec<(&str, usize)> = self
            .by_country
            .iter()
            .map(|(country, count)| (country.as_str(), *count))
            .collect();
        counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));
        counts.truncate(n);
        counts
    }
}

/// Summarize both event sets as of `now`.
#[must_use]
pub fn summarize(live: &[DisasterEvent], historical: &[DisasterEvent], now: DateTime<Utc>) -> Stats {
    let mut stats = Stats {
        total_live: live.len(),
        total_historical: historical.len(),
        ..Stats::default()
    };
    let week_ago = now - Duration::days(RECENT_DAYS);

    for event in live.iter().chain(historical) {
        *stats.by_type.entry(event.event_type.code().to_string()).or_default() += 1;
        *stats.by_country.entry(event.country.clone()).or_default() += 1;
        if event.severity != "Unknown" {
            *stats.by_severity.entry(event.severity.clone()).or_default() += 1;
        }

        if let Some(start) = event.start_time() {
            if start >= week_ago {
                stats.recent.push(RecentEvent {
                    days_ago: now.signed_duration_since(start).num_days(),
                    event: event.clone(),
                });
            }
        }
    }

    stats.recent.sort_by_key(|r| r.days_ago);
    stats
}
