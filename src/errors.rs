//! Error types for hazardtail.
//!
//! Uses `thiserror` for library-style error definitions. Fetch and geocode
//! failures never leave the engine as errors; they are downgraded into
//! [`Notice`] values and kept on a side channel.

use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

/// Errors that can occur in hazardtail operations.
#[derive(Error, Debug)]
pub enum HazardError {
    /// HTTP request failed
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON parsing failed
    #[error("Failed to parse JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// Upstream returned an error status
    #[error("upstream error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    /// Invalid response structure
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// History window outside the supported set
    #[error("invalid history window: {0} days (expected one of 7, 30, 90, 180, 365)")]
    InvalidWindow(u32),

    /// Proximity policy could not be built
    #[error("invalid proximity policy: {0}")]
    InvalidPolicy(String),

    /// Position could not be acquired
    #[error("location unavailable: {0}")]
    LocationDenied(String),

    /// Position acquisition exceeded the bounded wait
    #[error("location request timed out after {}s", .0.as_secs())]
    LocationTimeout(Duration),
}

/// Which feed a notice refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FeedKind {
    Live,
    Historical,
}

impl FeedKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Live => "live",
            Self::Historical => "historical",
        }
    }
}

/// A non-fatal condition surfaced beside the degraded value it produced.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// Event feed could not be fetched or parsed
    FeedUnavailable { feed: FeedKind, message: String },
    /// Reverse geocoding failed
    GeocodeUnavailable { message: String },
    /// Position acquisition was refused or impossible
    LocationDenied { message: String },
    /// Position acquisition timed out
    LocationTimeout { secs: u64 },
    /// Feed records dropped for missing geometry
    MalformedRecords { feed: FeedKind, count: usize },
}

impl Notice {
    /// Build the notice for a failed position acquisition.
    #[must_use]
    pub fn from_location_error(err: &HazardError) -> Self {
        match err {
            HazardError::LocationTimeout(wait) => Self::LocationTimeout {
                secs: wait.as_secs(),
            },
            other => Self::LocationDenied {
                message: other.to_string(),
            },
        }
    }

    /// Whether the operator can clear this by retrying manually.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LocationDenied { .. } | Self::LocationTimeout { .. })
    }
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::FeedUnavailable { feed, message } => {
                write!(f, "{} feed unavailable: {message}", feed.as_str())
            }
            Self::GeocodeUnavailable { message } => write!(f, "geocoding unavailable: {message}"),
            Self::LocationDenied { message } => write!(f, "location denied: {message}"),
            Self::LocationTimeout { secs } => write!(f, "location timed out after {secs}s"),
            Self::MalformedRecords { feed, count } => {
                write!(f, "dropped {count} malformed {} records", feed.as_str())
            }
        }
    }
}
