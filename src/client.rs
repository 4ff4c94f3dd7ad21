//! GDACS event feed client.
//!
//! Provides async HTTP access to the GDACS GeoJSON event list, either the
//! current live window or a bounded historical date range.
//! Uses reqwest with rustls for TLS.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use reqwest::Client;
use tracing::{debug, instrument};

use crate::errors::HazardError;
use crate::models::{Feature, FeatureCollection};

/// Default request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 10;

/// User agent string for API requests.
pub const USER_AGENT: &str = concat!("hazardtail/", env!("CARGO_PKG_VERSION"));

/// GDACS event list endpoint.
pub const GDACS_FEED_URL: &str = "https://www.gdacs.org/gdacsapi/api/events/geteventlist/MAP";

/// Which slice of the feed to request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedWindow {
    /// Current events, no date bounds
    Live,
    /// Inclusive `[from, to]` date range
    Historical { from: NaiveDate, to: NaiveDate },
}

impl FeedWindow {
    /// The window covering the last `days` days up to and including `today`.
    #[must_use]
    pub fn historical(days: u32, today: NaiveDate) -> Self {
        let from = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self::Historical { from, to: today }
    }

    /// Extra query parameters for this window.
    #[must_use]
    pub fn query(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("format", "geojson".to_string())];
        if let Self::Historical { from, to } = self {
            params.push(("fromdate", from.format("%Y-%m-%d").to_string()));
            params.push(("todate", to.format("%Y-%m-%d").to_string()));
        }
        params
    }
}

/// Anything that can produce raw feed records for a window.
#[async_trait]
pub trait FeedSource: Send + Sync {
    /// Fetch the raw, unvalidated feature list.
    async fn fetch(&self, window: FeedWindow) -> Result<Vec<Feature>, HazardError>;
}

/// Client for the GDACS event feed.
pub struct GdacsClient {
    client: Client,
    base_url: String,
}

impl GdacsClient {
    /// Create a new GDACS client against `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be initialized.
    pub fn new(base_url: impl Into<String>) -> Result<Self, HazardError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .user_agent(USER_AGENT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Fetch the GeoJSON collection for a window.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or response cannot be parsed.
    #[instrument(skip(self))]
    pub async fn fetch_collection(&self, window: FeedWindow) -> Result<FeatureCollection, HazardError> {
        debug!("fetching feed from {}", self.base_url);

        let response = self
            .client
            .get(&self.base_url)
            .query(&window.query())
            .send()
            .await?;

        // Check status before parsing
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(HazardError::Api {
                status: status.as_u16(),
                message: body,
            });
        }

        let body = response.text().await?;
        let feed: FeatureCollection = serde_json::from_str(&body)?;
        feed.validate()?;

        debug!(
            "fetched {} features",
            feed.features.as_ref().map_or(0, Vec::len)
        );
        Ok(feed)
    }
}

#[async_trait]
impl FeedSource for GdacsClient {
    async fn fetch(&self, window: FeedWindow) -> Result<Vec<Feature>, HazardError> {
        Ok(self.fetch_collection(window).await?.into_features())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    #[test]
    fn test_live_window_has_no_bounds() {
        let query = FeedWindow::Live.query();
        assert_eq!(query, vec![("format", "geojson".to_string())]);
    }

    #[test]
    fn test_historical_window_range() {
        let window = FeedWindow::historical(30, date(2024, 3, 15));
        assert_eq!(
            window,
            FeedWindow::Historical {
                from: date(2024, 2, 14),
                to: date(2024, 3, 15),
            }
        );

        let query = window.query();
        assert!(query.contains(&("fromdate", "2024-02-14".to_string())));
        assert!(query.contains(&("todate", "2024-03-15".to_string())));
    }

    #[test]
    fn test_historical_window_crosses_year() {
        let window = FeedWindow::historical(7, date(2024, 1, 3));
        assert_eq!(
            window,
            FeedWindow::Historical {
                from: date(2023, 12, 27),
                to: date(2024, 1, 3),
            }
        );
    }

    #[test]
    fn test_client_builds() {
        assert!(GdacsClient::new(GDACS_FEED_URL).is_ok());
    }
}
