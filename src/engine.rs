//! Async orchestration around [`AlertCoordinator`].
//!
//! The engine owns the coordinator behind a mutex and drives the fetch,
//! normalize, recompute and enrich chain. The lock is never held across a
//! network call: fetches and geocodes run unlocked and their results are
//! committed atomically, with generation checks deciding whether a late
//! result still applies.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tracing::{debug, info};

use crate::client::{FeedSource, FeedWindow, GDACS_FEED_URL, GdacsClient};
use crate::coordinator::{AddressRequest, AlertCoordinator, AlertPhase};
use crate::errors::{FeedKind, HazardError, Notice};
use crate::geocode::{self, Geocoder, NOMINATIM_URL, NominatimClient};
use crate::location::{self, DEFAULT_LOCATION_TIMEOUT, LocationProvider};
use crate::models::{AlertState, DisasterEvent, DisasterType, UserLocationContext};
use crate::normalize::{NormalizeOptions, normalize};
use crate::proximity::ProximityPolicy;
use crate::stats::Stats;

/// Capacity of the alert update channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Engine settings.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub feed_url: String,
    pub geocode_url: String,
    pub location_timeout: Duration,
    pub policy: ProximityPolicy,
    pub type_filter: Option<DisasterType>,
    /// History window to load and show, if any
    pub history_days: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            feed_url: GDACS_FEED_URL.to_string(),
            geocode_url: NOMINATIM_URL.to_string(),
            location_timeout: DEFAULT_LOCATION_TIMEOUT,
            policy: ProximityPolicy::default(),
            type_filter: None,
            history_days: None,
        }
    }
}

/// Current history window selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HistoryStatus {
    /// Window the loaded snapshot covers
    pub days: u32,
    /// Window still being fetched, if any
    pub pending: Option<u32>,
    pub enabled: bool,
    /// Events in the fetched snapshot, shown or not
    pub loaded: usize,
}

/// Disaster ingestion and proximity alerting engine.
#[derive(Clone)]
pub struct Engine {
    state: Arc<Mutex<AlertCoordinator>>,
    feed: Arc<dyn FeedSource>,
    geocoder: Arc<dyn Geocoder>,
    location: Arc<dyn LocationProvider>,
    location_timeout: Duration,
    updates: broadcast::Sender<AlertState>,
}

impl Engine {
    /// Build an engine from explicit collaborators.
    pub fn new(
        feed: Arc<dyn FeedSource>,
        geocoder: Arc<dyn Geocoder>,
        location: Arc<dyn LocationProvider>,
        config: &EngineConfig,
    ) -> Self {
        let mut coordinator = AlertCoordinator::new(config.policy);
        coordinator.set_type_filter(config.type_filter.clone());
        coordinator.set_history_enabled(config.history_days.is_some());

        let (updates, _rx) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            state: Arc::new(Mutex::new(coordinator)),
            feed,
            geocoder,
            location,
            location_timeout: config.location_timeout,
            updates,
        }
    }

    /// Build an engine talking to the configured HTTP upstreams.
    ///
    /// # Errors
    ///
    /// Returns an error if an HTTP client cannot be initialized.
    pub fn from_config(
        config: &EngineConfig,
        location: Arc<dyn LocationProvider>,
    ) -> Result<Self, HazardError> {
        let feed = Arc::new(GdacsClient::new(config.feed_url.clone())?);
        let geocoder = Arc::new(NominatimClient::new(config.geocode_url.clone())?);
        Ok(Self::new(feed, geocoder, location, config))
    }

    /// Initial load: live feed, history window and user location, all
    /// in flight together.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWindow` if `history_days` is not a supported size.
    pub async fn start(&self, history_days: Option<u32>) -> Result<(), HazardError> {
        let history = async {
            match history_days {
                Some(days) => self.set_history_window(days).await,
                None => Ok(()),
            }
        };
        let (_, history, _) = tokio::join!(self.refresh_live(), history, self.refresh_user_location());
        history
    }

    // ------------------------------------------------------------------
    // Feed
    // ------------------------------------------------------------------

    /// Re-fetch the live feed. On failure the last snapshot is kept.
    pub async fn refresh_live(&self) {
        let ticket = self.state.lock().await.begin_live_fetch();

        match self.feed.fetch(FeedWindow::Live).await {
            Ok(features) => {
                let normalized = normalize(&features, &NormalizeOptions::live());
                debug!("live snapshot: {} events", normalized.events.len());
                let request = {
                    let mut state = self.state.lock().await;
                    state.note_dropped(FeedKind::Live, normalized.dropped);
                    state.commit_live(ticket, normalized.events)
                };
                self.enrich(request).await;
            }
            Err(e) => {
                self.state.lock().await.notice(Notice::FeedUnavailable {
                    feed: FeedKind::Live,
                    message: e.to_string(),
                });
            }
        }
    }

    /// Select a history window and load it, replacing the historical set.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWindow` for unsupported sizes. Fetch failures are
    /// reported as notices, not errors.
    pub async fn set_history_window(&self, days: u32) -> Result<(), HazardError> {
        let request = self
            .state
            .lock()
            .await
            .begin_history(days, Utc::now().date_naive())?;

        match self.feed.fetch(request.window).await {
            Ok(features) => {
                let normalized = normalize(&features, &NormalizeOptions::historical());
                let count = normalized.events.len();
                let mut state = self.state.lock().await;
                state.note_dropped(FeedKind::Historical, normalized.dropped);
                if state.commit_history(&request, normalized.events) {
                    debug!("historical snapshot ({days} days): {count} events");
                }
            }
            Err(e) => {
                let mut state = self.state.lock().await;
                state.abandon_history(&request);
                state.notice(Notice::FeedUnavailable {
                    feed: FeedKind::Historical,
                    message: e.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Show or hide the historical set without refetching.
    pub async fn set_history_enabled(&self, enabled: bool) {
        self.state.lock().await.set_history_enabled(enabled);
    }

    // ------------------------------------------------------------------
    // User location
    // ------------------------------------------------------------------

    /// Acquire a position, reverse-geocode it and recompute alerts.
    ///
    /// Returns false when no position could be acquired; the previous
    /// context, if any, stays in place and a retryable notice is recorded.
    /// A refresh overtaken by a newer one is discarded when it completes.
    pub async fn refresh_user_location(&self) -> bool {
        let ticket = self.state.lock().await.begin_location();
        let coord = match location::acquire(self.location.as_ref(), self.location_timeout).await {
            Ok(coord) => coord,
            Err(e) => {
                self.state.lock().await.notice(Notice::from_location_error(&e));
                return false;
            }
        };

        let (place, notice) = geocode::resolve_place(self.geocoder.as_ref(), coord.lat, coord.lng).await;
        let context = UserLocationContext {
            lat: coord.lat,
            lng: coord.lng,
            state: place.as_ref().and_then(|p| p.state.clone()),
            country: place.as_ref().and_then(|p| p.country.clone()),
            detailed_address: place.map(|p| p.detailed(coord.lat, coord.lng)),
        };
        info!(
            "user at {:.4},{:.4} ({} / {})",
            context.lat,
            context.lng,
            context.state.as_deref().unwrap_or("?"),
            context.country.as_deref().unwrap_or("?")
        );

        let request = {
            let mut state = self.state.lock().await;
            if let Some(notice) = notice {
                state.notice(notice);
            }
            state.commit_user_context(ticket, context)
        };
        self.enrich(request).await;
        true
    }

    // ------------------------------------------------------------------
    // Policy and filters
    // ------------------------------------------------------------------

    pub async fn set_policy(&self, policy: ProximityPolicy) {
        let request = self.state.lock().await.set_policy(policy);
        self.enrich(request).await;
    }

    /// # Errors
    ///
    /// Returns `InvalidPolicy` if the radius is not positive.
    pub async fn set_radius(&self, radius_km: f64) -> Result<(), HazardError> {
        let request = self.state.lock().await.set_radius(radius_km)?;
        self.enrich(request).await;
        Ok(())
    }

    /// Switch back to the radius policy with the last radius used.
    pub async fn use_nearby(&self) {
        let request = self.state.lock().await.use_nearby();
        self.enrich(request).await;
    }

    pub async fn set_type_filter(&self, filter: Option<DisasterType>) {
        self.state.lock().await.set_type_filter(filter);
    }

    // ------------------------------------------------------------------
    // Enrichment
    // ------------------------------------------------------------------

    /// Publish the recomputed state, then resolve the owed address.
    async fn enrich(&self, request: Option<AddressRequest>) {
        self.publish().await;
        let Some(request) = request else {
            return;
        };

        let (address, notice) =
            geocode::resolve_display(self.geocoder.as_ref(), request.lat, request.lng).await;

        let committed = {
            let mut state = self.state.lock().await;
            if let Some(notice) = notice {
                state.notice(notice);
            }
            state.commit_address(request, address)
        };
        if committed {
            self.publish().await;
        }
    }

    async fn publish(&self) {
        let snapshot = self.state.lock().await.alert_state().clone();
        // No subscribers is fine
        let _ = self.updates.send(snapshot);
    }

    // ------------------------------------------------------------------
    // Outputs
    // ------------------------------------------------------------------

    /// Receive every alert state published after a recomputation or an
    /// address update.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AlertState> {
        self.updates.subscribe()
    }

    pub async fn alert_state(&self) -> AlertState {
        self.state.lock().await.alert_state().clone()
    }

    pub async fn phase(&self) -> AlertPhase {
        self.state.lock().await.phase()
    }

    pub async fn composed_events(&self) -> Vec<DisasterEvent> {
        self.state.lock().await.composed_events()
    }

    pub async fn user(&self) -> Option<UserLocationContext> {
        self.state.lock().await.user().cloned()
    }

    pub async fn policy(&self) -> ProximityPolicy {
        self.state.lock().await.policy()
    }

    pub async fn history_status(&self) -> HistoryStatus {
        let state = self.state.lock().await;
        let history = state.history();
        HistoryStatus {
            days: history.days(),
            pending: history.pending(),
            enabled: history.enabled(),
            loaded: history.events().len(),
        }
    }

    pub async fn stats(&self) -> Stats {
        self.state.lock().await.stats(Utc::now())
    }

    pub async fn notices(&self) -> Vec<Notice> {
        self.state.lock().await.notices()
    }

    pub async fn drain_notices(&self) -> Vec<Notice> {
        self.state.lock().await.drain_notices()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use crate::geocode::ResolvedPlace;
    use crate::location::FixedLocation;
    use crate::models::{Coordinate, Feature, FeatureCollection};

    const LIVE: &str = r#"{"type": "FeatureCollection", "features": [
        {"geometry": {"coordinates": [80.2707, 13.0827]},
         "properties": {"eventid": 1, "eventtype": "FL", "name": "Chennai floods",
                        "country": "India", "adm1": "Tamil Nadu"}},
        {"geometry": {"coordinates": [76.6394, 12.2958]},
         "properties": {"eventid": 2, "eventtype": "EQ", "name": "Mysuru tremor",
                        "country": "India", "adm1": "karnataka"}},
        {"geometry": {"coordinates": [1]}, "properties": {"eventid": 3}}
    ]}"#;

    const HIST_30: &str = r#"{"features": [
        {"geometry": {"coordinates": [10, 10]}, "properties": {"eventid": 30}},
        {"geometry": {"coordinates": [11, 11]}, "properties": {"eventid": 31}}
    ]}"#;

    const HIST_90: &str = r#"{"features": [
        {"geometry": {"coordinates": [12, 12]}, "properties": {"eventid": 90}}
    ]}"#;

    struct StaticFeed {
        live: &'static str,
        fail: bool,
        /// Longer history windows fail upstream
        max_history_days: i64,
        calls: AtomicUsize,
    }

    impl StaticFeed {
        fn new(live: &'static str) -> Self {
            Self {
                live,
                fail: false,
                max_history_days: i64::MAX,
                calls: AtomicUsize::new(0),
            }
        }

        fn failing() -> Self {
            Self {
                fail: true,
                ..Self::new(LIVE)
            }
        }
    }

    #[async_trait]
    impl FeedSource for StaticFeed {
        async fn fetch(&self, window: FeedWindow) -> Result<Vec<Feature>, HazardError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let too_long = matches!(
                window,
                FeedWindow::Historical { from, to } if (to - from).num_days() > self.max_history_days
            );
            if self.fail || too_long {
                return Err(HazardError::Api {
                    status: 502,
                    message: "bad gateway".into(),
                });
            }
            let json = match window {
                FeedWindow::Live => self.live,
                FeedWindow::Historical { from, to } if (to - from).num_days() > 30 => HIST_90,
                FeedWindow::Historical { .. } => HIST_30,
            };
            Ok(serde_json::from_str::<FeatureCollection>(json)?.into_features())
        }
    }

    /// Karnataka for the user; slow display lookups near Chennai.
    struct FakeGeocoder {
        fail: bool,
    }

    #[async_trait]
    impl Geocoder for FakeGeocoder {
        async fn reverse(&self, _lat: f64, _lng: f64) -> Result<ResolvedPlace, HazardError> {
            if self.fail {
                return Err(HazardError::Api {
                    status: 500,
                    message: "geocoder down".into(),
                });
            }
            Ok(ResolvedPlace {
                city: Some("Bengaluru".into()),
                state: Some("Karnataka".into()),
                country: Some("India".into()),
                postcode: Some("560001".into()),
                display_address: Some("Bengaluru, Karnataka, India".into()),
            })
        }

        async fn display_name(&self, lat: f64, _lng: f64) -> Result<String, HazardError> {
            if lat > 13.0 {
                tokio::time::sleep(Duration::from_millis(150)).await;
                Ok("Chennai, Tamil Nadu".into())
            } else {
                Ok("Mysuru, Karnataka".into())
            }
        }
    }

    fn bangalore() -> Arc<FixedLocation> {
        Arc::new(FixedLocation(Some(Coordinate {
            lat: 12.9716,
            lng: 77.5946,
        })))
    }

    fn engine(feed: StaticFeed, geocoder_fails: bool, location: Arc<FixedLocation>) -> Engine {
        Engine::new(
            Arc::new(feed),
            Arc::new(FakeGeocoder {
                fail: geocoder_fails,
            }),
            location,
            &EngineConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_full_chain_alerts_with_address() {
        let engine = engine(StaticFeed::new(LIVE), false, bangalore());
        engine.refresh_user_location().await;
        engine.refresh_live().await;

        let alert = engine.alert_state().await;
        assert!(alert.visible);
        assert_eq!(alert.matched_events.len(), 2);
        assert_eq!(alert.matched_events[0].name, "Chennai floods");
        assert_eq!(alert.nearest_address, "Chennai, Tamil Nadu");
        assert_eq!(engine.phase().await, AlertPhase::Alerting);

        let notices = engine.notices().await;
        assert!(notices.contains(&Notice::MalformedRecords {
            feed: FeedKind::Live,
            count: 1
        }));
    }

    #[tokio::test]
    async fn test_state_policy_matches_case_insensitively() {
        let engine = engine(StaticFeed::new(LIVE), false, bangalore());
        engine.start(None).await.expect("start");
        engine.set_policy(ProximityPolicy::State).await;

        let alert = engine.alert_state().await;
        assert_eq!(alert.matched_events.len(), 1);
        assert_eq!(alert.matched_events[0].name, "Mysuru tremor");
        assert_eq!(alert.nearest_address, "Mysuru, Karnataka");
    }

    #[tokio::test]
    async fn test_slow_address_does_not_overwrite_newer_alert() {
        let engine = engine(StaticFeed::new(LIVE), false, bangalore());
        engine.refresh_user_location().await;

        // Chennai's lookup is slow; the radius shrinks while it is pending.
        let shrink = async {
            tokio::time::sleep(Duration::from_millis(30)).await;
            engine.set_radius(200.0).await.expect("valid radius");
        };
        tokio::join!(engine.refresh_live(), shrink);

        let alert = engine.alert_state().await;
        assert_eq!(alert.matched_events.len(), 1);
        assert_eq!(alert.matched_events[0].name, "Mysuru tremor");
        assert_eq!(alert.nearest_address, "Mysuru, Karnataka");
    }

    #[tokio::test]
    async fn test_history_window_replaced_not_appended() {
        let engine = engine(StaticFeed::new(LIVE), false, bangalore());
        engine.set_history_enabled(true).await;

        engine.set_history_window(30).await.expect("valid window");
        let hist: Vec<DisasterEvent> = engine
            .composed_events()
            .await
            .into_iter()
            .filter(|e| e.is_historical)
            .collect();
        assert_eq!(hist.len(), 2);

        engine.set_history_window(90).await.expect("valid window");
        let hist: Vec<DisasterEvent> = engine
            .composed_events()
            .await
            .into_iter()
            .filter(|e| e.id.starts_with("hist-"))
            .collect();
        assert_eq!(hist.len(), 1);
        assert_eq!(hist[0].id, "hist-90-0");
        assert!(hist.iter().all(|e| e.is_historical));
    }

    /// First fix is slow and stale; later fixes are immediate.
    struct MovingLocation {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LocationProvider for MovingLocation {
        async fn current_position(&self) -> Result<Coordinate, HazardError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                tokio::time::sleep(Duration::from_millis(100)).await;
                return Ok(Coordinate { lat: 12.9716, lng: 77.5946 });
            }
            Ok(Coordinate { lat: 13.0827, lng: 80.2707 })
        }
    }

    #[tokio::test]
    async fn test_newest_location_refresh_wins() {
        let engine = Engine::new(
            Arc::new(StaticFeed::new(LIVE)),
            Arc::new(FakeGeocoder { fail: false }),
            Arc::new(MovingLocation {
                calls: AtomicUsize::new(0),
            }),
            &EngineConfig::default(),
        );

        let newer = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            engine.refresh_user_location().await
        };
        let (older, newer) = tokio::join!(engine.refresh_user_location(), newer);
        assert!(older && newer);

        let user = engine.user().await.expect("user located");
        assert!((user.lat - 13.0827).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_window_keeps_loaded_window_status() {
        let feed = StaticFeed {
            max_history_days: 30,
            ..StaticFeed::new(LIVE)
        };
        let engine = engine(feed, false, bangalore());

        engine.set_history_window(30).await.expect("valid window");
        engine.set_history_window(365).await.expect("valid window");

        let status = engine.history_status().await;
        assert_eq!(
            status,
            HistoryStatus {
                days: 30,
                pending: None,
                enabled: false,
                loaded: 2
            }
        );
        assert!(engine.notices().await.iter().any(|n| matches!(
            n,
            Notice::FeedUnavailable {
                feed: FeedKind::Historical,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_invalid_window_rejected_without_fetch() {
        let feed = Arc::new(StaticFeed::new(LIVE));
        let engine = Engine::new(
            feed.clone(),
            Arc::new(FakeGeocoder { fail: false }),
            bangalore(),
            &EngineConfig::default(),
        );
        assert!(engine.set_history_window(45).await.is_err());
        assert_eq!(feed.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_feed_failure_degrades_to_notice() {
        let engine = engine(StaticFeed::failing(), false, bangalore());
        engine.start(Some(30)).await.expect("start");

        assert!(engine.composed_events().await.is_empty());
        assert_eq!(engine.phase().await, AlertPhase::NoLocation);
        let notices = engine.drain_notices().await;
        assert!(notices.iter().any(|n| matches!(
            n,
            Notice::FeedUnavailable {
                feed: FeedKind::Live,
                ..
            }
        )));
        assert!(notices.iter().any(|n| matches!(
            n,
            Notice::FeedUnavailable {
                feed: FeedKind::Historical,
                ..
            }
        )));
    }

    #[tokio::test]
    async fn test_geocode_failure_fails_closed() {
        let engine = engine(StaticFeed::new("{\"features\": []}"), true, bangalore());
        assert!(engine.refresh_user_location().await);
        engine.refresh_live().await;

        let user = engine.user().await.expect("user context");
        assert!(user.detailed_address.is_none());
        assert!(user.state.is_none() && user.country.is_none());
        assert_eq!(engine.phase().await, AlertPhase::NoLocation);
        assert!(!engine.alert_state().await.visible);
    }

    #[tokio::test]
    async fn test_region_policy_without_region_stays_idle() {
        let engine = Engine::new(
            Arc::new(StaticFeed::new(LIVE)),
            Arc::new(FakeGeocoder { fail: true }),
            bangalore(),
            &EngineConfig {
                policy: ProximityPolicy::Country,
                ..EngineConfig::default()
            },
        );
        engine.start(None).await.expect("start");

        assert_eq!(engine.phase().await, AlertPhase::Idle);
        assert!(!engine.alert_state().await.visible);
        assert!(
            engine
                .notices()
                .await
                .iter()
                .any(|n| matches!(n, Notice::GeocodeUnavailable { .. }))
        );
    }

    #[tokio::test]
    async fn test_missing_location_is_retryable() {
        let engine = engine(StaticFeed::new(LIVE), false, Arc::new(FixedLocation(None)));
        assert!(!engine.refresh_user_location().await);
        engine.refresh_live().await;

        assert_eq!(engine.phase().await, AlertPhase::NoLocation);
        let notices = engine.notices().await;
        assert!(notices.iter().any(Notice::is_retryable));
    }

    #[tokio::test]
    async fn test_updates_are_published() {
        let engine = engine(StaticFeed::new(LIVE), false, bangalore());
        let mut rx = engine.subscribe();
        engine.start(None).await.expect("start");

        let mut last = None;
        while let Ok(state) = rx.try_recv() {
            last = Some(state);
        }
        let last = last.expect("at least one update");
        assert_eq!(last, engine.alert_state().await);
    }
}
