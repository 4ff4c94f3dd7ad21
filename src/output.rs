//! Output formatters for events and alert state.
//!
//! Supports human-readable (with colors), JSON, and NDJSON formats.

use std::io::{self, Write};

use serde::Serialize;

use crate::coordinator::AlertPhase;
use crate::errors::Notice;
use crate::models::{AlertState, DisasterEvent, UserLocationContext};
use crate::proximity::ProximityPolicy;
use crate::stats::Stats;

// ANSI color codes
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";

// GDACS alert level colors
const ALERT_GREEN: &str = "\x1b[42;30m";
const ALERT_ORANGE: &str = "\x1b[48;5;208;30m";
const ALERT_RED: &str = "\x1b[41;97m";

const ICON_ALERT: &str = "⚠️";
const ICON_CLEAR: &str = "✅";
const ICON_PIN: &str = "📍";
const ICON_HISTORY: &str = "📚";

/// Output format selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Human-readable terminal output (default)
    #[default]
    Human,
    /// JSON array
    Json,
    /// Newline-delimited JSON (one object per line)
    Ndjson,
}

impl std::str::FromStr for Format {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "human" => Ok(Self::Human),
            "json" => Ok(Self::Json),
            "ndjson" => Ok(Self::Ndjson),
            _ => Err(format!("unknown format: {s} (expected: human, json, ndjson)")),
        }
    }
}

/// Format alert level with color.
fn format_alert_level(level: &str) -> String {
    match level.to_lowercase().as_str() {
        "red" => format!(" {ALERT_RED} RED {RESET}"),
        "orange" => format!(" {ALERT_ORANGE} ORANGE {RESET}"),
        "green" => format!(" {ALERT_GREEN} GREEN {RESET}"),
        _ => String::new(),
    }
}

fn format_when(event: &DisasterEvent) -> String {
    event
        .start_time()
        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "unknown".into())
}

/// Write one line per event.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_human<W: Write>(writer: &mut W, events: &[DisasterEvent]) -> io::Result<()> {
    for event in events {
        let region = match &event.state {
            Some(state) => format!("{state}, {}", event.country),
            None => event.country.clone(),
        };
        let history = if event.is_historical {
            format!(" {DIM}{ICON_HISTORY}{RESET}")
        } else {
            String::new()
        };

        writeln!(
            writer,
            "{} {BOLD}{:12}{RESET} │ {} UTC │ {DIM}{:>10}{RESET} │ {} {DIM}({}){RESET}{}{history}",
            event.event_type.icon(),
            event.event_type.label(),
            format_when(event),
            event.duration_label(),
            event.name,
            region,
            format_alert_level(&event.alert_level),
        )?;
    }
    Ok(())
}

/// Write items as a JSON array.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_json<W: Write, T: Serialize>(writer: &mut W, items: &T) -> io::Result<()> {
    let json = serde_json::to_string_pretty(items)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    writeln!(writer, "{json}")
}

/// Write items as newline-delimited JSON.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_ndjson<W: Write, T: Serialize>(writer: &mut W, items: &[T]) -> io::Result<()> {
    for item in items {
        let json =
            serde_json::to_string(item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        writeln!(writer, "{json}")?;
    }
    Ok(())
}

/// Write events in the specified format.
///
/// # Errors
///
/// Returns an error if writing fails.
pub fn write_events<W: Write>(writer: &mut W, events: &[DisasterEvent], format: Format) -> io::Result<()> {
    match format {
        Format::Human => write_human(writer, events),
        Format::Json => write_json(writer, &events),
        Format::Ndjson => write_ndjson(writer, events),
    }
}

/// Everything `check` reports.
#[derive(Debug, Serialize)]
pub struct AlertReport<'a> {
    pub phase: AlertPhase,
    pub policy: ProximityPolicy,
    pub user: Option<&'a UserLocationContext>,
    pub alert: &'a AlertState,
    pub notices: &'a [Notice],
}

/// Write an alert report.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_report<W: Write>(writer: &mut W, report: &AlertReport<'_>, format: Format) -> io::Result<()> {
    match format {
        Format::Json => write_json(writer, report),
        Format::Ndjson => write_ndjson(writer, std::slice::from_ref(report)),
        Format::Human => write_report_human(writer, report),
    }
}

fn write_report_human<W: Write>(writer: &mut W, report: &AlertReport<'_>) -> io::Result<()> {
    if let Some(user) = report.user {
        match &user.detailed_address {
            Some(place) => writeln!(
                writer,
                "{ICON_PIN} {BOLD}{}, {}, {}{RESET} {DIM}({:.4}, {:.4}){RESET}",
                place.city, place.state, place.country, user.lat, user.lng
            )?,
            None => writeln!(
                writer,
                "{ICON_PIN} {DIM}({:.4}, {:.4}), address unknown{RESET}",
                user.lat, user.lng
            )?,
        }
    }

    let mode = match report.policy {
        ProximityPolicy::Nearby { radius_km } => format!("NEARBY {radius_km:.0} km"),
        other => other.as_str().to_uppercase(),
    };

    match report.phase {
        AlertPhase::NoLocation => {
            writeln!(writer, "{DIM}No alerts: location or live events unavailable{RESET}")?;
        }
        AlertPhase::Idle => {
            writeln!(
                writer,
                "{ICON_CLEAR} No environmental dangers detected nearby currently. {DIM}[{mode}]{RESET}"
            )?;
        }
        AlertPhase::Alerting => {
            let count = report.alert.matched_events.len();
            let plural = if count > 1 { format!("s ({count})") } else { String::new() };
            writeln!(writer, "{ICON_ALERT} {BOLD}Disaster Alert{plural}{RESET} {DIM}[{mode}]{RESET}")?;
            if !report.alert.nearest_address.is_empty() {
                writeln!(writer, "{ICON_PIN} {}", report.alert.nearest_address)?;
            }
            write_human(writer, &report.alert.matched_events)?;
        }
    }

    for notice in report.notices {
        let hint = if notice.is_retryable() { " (retry with --lat/--lon)" } else { "" };
        writeln!(writer, "{DIM}! {notice}{hint}{RESET}")?;
    }
    Ok(())
}

/// The alert address, when it labels an event in `batch`.
///
/// The address belongs to the first matched event only.
#[must_use]
pub fn fresh_address<'a>(alert: &'a AlertState, batch: &[DisasterEvent]) -> Option<&'a str> {
    let first = alert.matched_events.first()?;
    if alert.nearest_address.is_empty() || !batch.iter().any(|e| e.id == first.id) {
        return None;
    }
    Some(&alert.nearest_address)
}

/// Write the statistics summary.
///
/// # Errors
///
/// Returns an error if serialization or writing fails.
pub fn write_stats<W: Write>(writer: &mut W, stats: &Stats, format: Format) -> io::Result<()> {
    match format {
        Format::Json => return write_json(writer, stats),
        Format::Ndjson => return write_ndjson(writer, std::slice::from_ref(stats)),
        Format::Human => {}
    }

    writeln!(
        writer,
        "{BOLD}Live:{RESET} {}  {BOLD}Historical:{RESET} {}",
        stats.total_live, stats.total_historical
    )?;
    writeln!(writer, "{BOLD}By type{RESET}")?;
    for (code, count) in &stats.by_type {
        writeln!(writer, "  {code:4} {count}")?;
    }
    writeln!(writer, "{BOLD}Top countries{RESET}")?;
    for (country, count) in stats.top_countries(5) {
        writeln!(writer, "  {country:24} {count}")?;
    }
    if !stats.by_severity.is_empty() {
        writeln!(writer, "{BOLD}By severity{RESET}")?;
        for (severity, count) in &stats.by_severity {
            writeln!(writer, "  {severity:24} {count}")?;
        }
    }
    writeln!(writer, "{BOLD}Last 7 days{RESET}: {} event(s)", stats.recent.len())?;
    for recent in &stats.recent {
        writeln!(
            writer,
            "  {DIM}{}d ago{RESET} {} {}",
            recent.days_ago,
            recent.event.event_type.icon(),
            recent.event.name
        )?;
    }
    Ok(())
}
