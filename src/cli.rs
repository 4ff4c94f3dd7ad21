//! Command-line interface definitions.
//!
//! Uses clap derive API for argument parsing.

use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::client::GDACS_FEED_URL;
use crate::engine::EngineConfig;
use crate::geocode::NOMINATIM_URL;
use crate::history;
use crate::models::DisasterType;
use crate::output::Format;
use crate::proximity::{DEFAULT_RADIUS_KM, ProximityPolicy};

/// Live natural-disaster feed with proximity alerts.
#[derive(Parser, Debug)]
#[command(name = "hazardtail")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Command to run
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose debug logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(long, global = true)]
    pub quiet: bool,
}

/// Available commands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Evaluate alerts for your position once and exit
    Check(CheckArgs),

    /// List current (and optionally historical) events
    Events(EventsArgs),

    /// Poll the feed and report new alerts as they appear
    Watch(WatchArgs),

    /// Summarize events by type, country and severity
    Stats(StatsArgs),

    /// Serve events and alert state over HTTP
    Serve(ServeArgs),
}

/// Settings shared by every command.
#[derive(Args, Debug, Clone)]
pub struct EngineArgs {
    /// Your latitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lat: Option<f64>,

    /// Your longitude in degrees
    #[arg(long, allow_negative_numbers = true)]
    pub lon: Option<f64>,

    /// Proximity mode: nearby, state, or country
    #[arg(long, default_value = "nearby")]
    pub proximity: String,

    /// Radius in km for the nearby mode
    #[arg(long, default_value_t = DEFAULT_RADIUS_KM)]
    pub radius_km: f64,

    /// Only list events of this type (EQ, FL, TC, VO, TS, DR, WF, EH, CW, LS or ALL)
    #[arg(long = "type", default_value = "ALL")]
    pub event_type: String,

    /// Include the historical window of this many days (7, 30, 90, 180, 365)
    #[arg(long, value_parser = parse_window)]
    pub history_days: Option<u32>,

    /// Event feed endpoint
    #[arg(long, env = "HAZARDTAIL_FEED_URL", default_value = GDACS_FEED_URL)]
    pub feed_url: String,

    /// Reverse geocoding endpoint
    #[arg(long, env = "HAZARDTAIL_GEOCODE_URL", default_value = NOMINATIM_URL)]
    pub geocode_url: String,

    /// Seconds to wait for a position before giving up
    #[arg(long, default_value = "10")]
    pub location_timeout: u64,
}

impl EngineArgs {
    /// Build the engine configuration.
    ///
    /// # Errors
    ///
    /// Returns an error for an unknown proximity mode or invalid radius.
    pub fn engine_config(&self) -> Result<EngineConfig, String> {
        let policy = ProximityPolicy::from_mode(&self.proximity, Some(self.radius_km))
            .map_err(|e| e.to_string())?;

        Ok(EngineConfig {
            feed_url: self.feed_url.clone(),
            geocode_url: self.geocode_url.clone(),
            location_timeout: Duration::from_secs(self.location_timeout.max(1)),
            policy,
            type_filter: parse_type_filter(&self.event_type),
            history_days: self.history_days,
        })
    }
}

/// Arguments for the `check` command.
#[derive(Args, Debug)]
pub struct CheckArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `events` command.
#[derive(Args, Debug)]
pub struct EventsArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Maximum number of events to show
    #[arg(long, short = 'n', default_value = "50")]
    pub limit: usize,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `watch` command.
#[derive(Args, Debug)]
pub struct WatchArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Poll interval in seconds (minimum 30)
    #[arg(long, default_value = "300")]
    pub poll_interval: u64,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `stats` command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Output format
    #[arg(long, short = 'f', default_value = "human", value_parser = parse_format)]
    pub format: Format,
}

/// Arguments for the `serve` command.
#[derive(Args, Debug)]
pub struct ServeArgs {
    #[command(flatten)]
    pub engine: EngineArgs,

    /// Port to listen on
    #[arg(long, short = 'p', default_value = "8080")]
    pub port: u16,

    /// Host to bind to
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// Live feed refresh interval in seconds (minimum 30)
    #[arg(long, default_value = "300")]
    pub poll_interval: u64,
}

/// `ALL` (or empty) means no filter.
#[must_use]
pub fn parse_type_filter(s: &str) -> Option<DisasterType> {
    let s = s.trim();
    if s.is_empty() || s.eq_ignore_ascii_case("all") {
        None
    } else {
        Some(DisasterType::from_code(s))
    }
}

/// Parse an output format from string.
fn parse_format(s: &str) -> Result<Format, String> {
    s.parse()
}

/// Parse a history window size.
fn parse_window(s: &str) -> Result<u32, String> {
    let days: u32 = s.parse().map_err(|e| format!("invalid number of days: {e}"))?;
    history::validate_window(days).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_args() {
        let cli = Cli::try_parse_from([
            "hazardtail",
            "check",
            "--lat",
            "12.97",
            "--lon",
            "77.59",
            "--proximity",
            "state",
            "--history-days",
            "90",
        ])
        .unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        let config = args.engine.engine_config().unwrap();
        assert_eq!(config.policy, ProximityPolicy::State);
        assert_eq!(config.history_days, Some(90));
        assert_eq!(config.type_filter, None);
    }

    #[test]
    fn test_negative_coordinates() {
        let cli = Cli::try_parse_from([
            "hazardtail", "events", "--lat", "-33.86", "--lon", "-70.65", "--type", "eq",
        ])
        .unwrap();
        let Command::Events(args) = cli.command else {
            panic!("expected events");
        };
        assert_eq!(args.engine.lat, Some(-33.86));
        let config = args.engine.engine_config().unwrap();
        assert_eq!(config.type_filter, Some(DisasterType::Earthquake));
    }

    #[test]
    fn test_rejects_unsupported_window() {
        assert!(Cli::try_parse_from(["hazardtail", "events", "--history-days", "45"]).is_err());
    }

    #[test]
    fn test_rejects_bad_radius() {
        let cli = Cli::try_parse_from(["hazardtail", "check", "--radius-km", "0"]).unwrap();
        let Command::Check(args) = cli.command else {
            panic!("expected check");
        };
        assert!(args.engine.engine_config().is_err());
    }
}
