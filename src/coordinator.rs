//! Alert coordination.
//!
//! [`AlertCoordinator`] is the single owner of engine state: the live and
//! historical event sets, the user context, the active policy and the
//! derived [`AlertState`]. Every input change recomputes alerts wholesale
//! and bumps a generation counter. Async work started for an older
//! generation is discarded when it comes back.
//!
//! States: `NoLocation` (no user or no live events), `Idle` (nothing
//! matched), `Alerting` (at least one match).

use std::collections::VecDeque;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::errors::{FeedKind, HazardError, Notice};
use crate::history::{HistoryWindowManager, WindowRequest};
use crate::models::{AlertState, DisasterEvent, DisasterType, UserLocationContext};
use crate::proximity::{self, ProximityPolicy};
use crate::stats::{self, Stats};

/// Maximum notices retained.
const NOTICE_CAPACITY: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertPhase {
    NoLocation,
    Idle,
    Alerting,
}

/// Address lookup owed for the first matched event of a recomputation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AddressRequest {
    pub generation: u64,
    pub lat: f64,
    pub lng: f64,
}

/// Ticket for a live fetch; only the newest ticket may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LiveTicket(u64);

/// Ticket for a location refresh; only the newest ticket may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LocationTicket(u64);

#[derive(Debug, Clone)]
pub struct AlertCoordinator {
    live: Vec<DisasterEvent>,
    history: HistoryWindowManager,
    user: Option<UserLocationContext>,
    policy: ProximityPolicy,
    /// Remembered across switches to region policies
    radius_km: f64,
    type_filter: Option<DisasterType>,
    alert: AlertState,
    phase: AlertPhase,
    generation: u64,
    live_generation: u64,
    location_generation: u64,
    notices: VecDeque<Notice>,
}

impl Default for AlertCoordinator {
    fn default() -> Self {
        Self::new(ProximityPolicy::default())
    }
}

impl AlertCoordinator {
    #[must_use]
    pub fn new(policy: ProximityPolicy) -> Self {
        Self {
            live: Vec::new(),
            history: HistoryWindowManager::default(),
            user: None,
            radius_km: policy.radius_km().unwrap_or(proximity::DEFAULT_RADIUS_KM),
            policy,
            type_filter: None,
            alert: AlertState::default(),
            phase: AlertPhase::NoLocation,
            generation: 0,
            live_generation: 0,
            location_generation: 0,
            notices: VecDeque::with_capacity(NOTICE_CAPACITY),
        }
    }

    // ------------------------------------------------------------------
    // Inputs
    // ------------------------------------------------------------------

    /// Start a live fetch, superseding any fetch still in flight.
    pub fn begin_live_fetch(&mut self) -> LiveTicket {
        self.live_generation += 1;
        LiveTicket(self.live_generation)
    }

    /// Install a live snapshot fetched under `ticket`.
    ///
    /// Returns `None` without touching state when the ticket is stale;
    /// otherwise the address lookup owed by the recomputation, if any.
    pub fn commit_live(&mut self, ticket: LiveTicket, events: Vec<DisasterEvent>) -> Option<AddressRequest> {
        if ticket.0 != self.live_generation {
            debug!("discarding stale live snapshot ({} events)", events.len());
            return None;
        }
        self.set_live_events(events)
    }

    /// Replace the live event set wholesale.
    pub fn set_live_events(&mut self, events: Vec<DisasterEvent>) -> Option<AddressRequest> {
        self.live = events;
        self.recompute()
    }

    /// Start a location refresh, superseding any refresh still in flight.
    pub fn begin_location(&mut self) -> LocationTicket {
        self.location_generation += 1;
        LocationTicket(self.location_generation)
    }

    /// Install a user context resolved under `ticket`.
    ///
    /// Returns `None` without touching state when the ticket is stale.
    pub fn commit_user_context(
        &mut self,
        ticket: LocationTicket,
        user: UserLocationContext,
    ) -> Option<AddressRequest> {
        if ticket.0 != self.location_generation {
            debug!("discarding stale position {:.4},{:.4}", user.lat, user.lng);
            return None;
        }
        self.set_user_context(Some(user))
    }

    /// Replace the user context. State and country travel together.
    pub fn set_user_context(&mut self, user: Option<UserLocationContext>) -> Option<AddressRequest> {
        self.user = user;
        self.recompute()
    }

    pub fn set_policy(&mut self, policy: ProximityPolicy) -> Option<AddressRequest> {
        if let Some(radius_km) = policy.radius_km() {
            self.radius_km = radius_km;
        }
        self.policy = policy;
        self.recompute()
    }

    /// Change the radius used by the `nearby` policy.
    ///
    /// # Errors
    ///
    /// Returns `InvalidPolicy` if the radius is not positive.
    pub fn set_radius(&mut self, radius_km: f64) -> Result<Option<AddressRequest>, HazardError> {
        let nearby = ProximityPolicy::nearby(radius_km)?;
        self.radius_km = radius_km;
        if self.policy.radius_km().is_some() {
            self.policy = nearby;
        }
        Ok(self.recompute())
    }

    /// Switch to the radius policy using the remembered radius.
    pub fn use_nearby(&mut self) -> Option<AddressRequest> {
        self.set_policy(ProximityPolicy::Nearby {
            radius_km: self.radius_km,
        })
    }

    /// Restrict the composed live view to one category. Alerts ignore it.
    pub fn set_type_filter(&mut self, filter: Option<DisasterType>) {
        self.type_filter = filter;
    }

    /// Start a history window change.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWindow` for unsupported sizes.
    pub fn begin_history(&mut self, days: u32, today: NaiveDate) -> Result<WindowRequest, HazardError> {
        self.history.begin(days, today)
    }

    /// Install a historical snapshot; false if superseded.
    pub fn commit_history(&mut self, request: &WindowRequest, events: Vec<DisasterEvent>) -> bool {
        self.history.commit(request, events)
    }

    /// Drop a failed history fetch, keeping the loaded snapshot.
    pub fn abandon_history(&mut self, request: &WindowRequest) {
        self.history.abandon(request);
    }

    pub fn set_history_enabled(&mut self, enabled: bool) {
        self.history.set_enabled(enabled);
    }

    // ------------------------------------------------------------------
    // Recomputation
    // ------------------------------------------------------------------

    /// Recompute the alert set from scratch.
    ///
    /// Clears any address attached to a previous alert immediately.
    pub fn recompute(&mut self) -> Option<AddressRequest> {
        self.generation += 1;
        self.alert.nearest_address.clear();

        if self.user.is_none() || self.live.is_empty() {
            self.alert.matched_events.clear();
            self.alert.visible = false;
            self.transition(AlertPhase::NoLocation);
            return None;
        }

        let matched = proximity::evaluate(&self.live, self.policy, self.user.as_ref());
        let first = matched.first().map(|e| (e.lat, e.lng));

        self.alert.visible = !matched.is_empty();
        self.alert.matched_events = matched;

        match first {
            None => {
                self.transition(AlertPhase::Idle);
                None
            }
            Some((lat, lng)) => {
                self.transition(AlertPhase::Alerting);
                Some(AddressRequest {
                    generation: self.generation,
                    lat,
                    lng,
                })
            }
        }
    }

    /// Attach a resolved address. Ignored if a newer recomputation ran.
    pub fn commit_address(&mut self, request: AddressRequest, address: String) -> bool {
        if request.generation != self.generation {
            debug!(
                "discarding stale address (generation {} < {})",
                request.generation, self.generation
            );
            return false;
        }
        self.alert.nearest_address = address;
        true
    }

    fn transition(&mut self, next: AlertPhase) {
        if next != self.phase {
            match next {
                AlertPhase::Alerting => info!(
                    "alerting: {} event(s) match {} policy",
                    self.alert.matched_events.len(),
                    self.policy.as_str()
                ),
                AlertPhase::Idle => info!("no events match {} policy", self.policy.as_str()),
                AlertPhase::NoLocation => info!("alerts cleared: no location or no live events"),
            }
        } else if next == AlertPhase::Alerting {
            debug!("alert set refreshed: {} event(s)", self.alert.matched_events.len());
        }
        self.phase = next;
    }

    // ------------------------------------------------------------------
    // Notices
    // ------------------------------------------------------------------

    /// Record a non-fatal condition.
    pub fn notice(&mut self, notice: Notice) {
        warn!("{}", notice);
        if self.notices.len() >= NOTICE_CAPACITY {
            self.notices.pop_front();
        }
        self.notices.push_back(notice);
    }

    /// Record malformed-record drops for a feed, if any.
    pub fn note_dropped(&mut self, feed: FeedKind, count: usize) {
        if count > 0 {
            self.notice(Notice::MalformedRecords { feed, count });
        }
    }

    #[must_use]
    pub fn notices(&self) -> Vec<Notice> {
        self.notices.iter().cloned().collect()
    }

    /// Take all notices, oldest first.
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        self.notices.drain(..).collect()
    }

    // ------------------------------------------------------------------
    // Outputs
    // ------------------------------------------------------------------

    #[must_use]
    pub fn alert_state(&self) -> &AlertState {
        &self.alert
    }

    #[must_use]
    pub fn phase(&self) -> AlertPhase {
        self.phase
    }

    #[must_use]
    pub fn policy(&self) -> ProximityPolicy {
        self.policy
    }

    #[must_use]
    pub fn user(&self) -> Option<&UserLocationContext> {
        self.user.as_ref()
    }

    #[must_use]
    pub fn history(&self) -> &HistoryWindowManager {
        &self.history
    }

    /// Live events (type-filtered) followed by shown historical events.
    #[must_use]
    pub fn composed_events(&self) -> Vec<DisasterEvent> {
        let live = self
            .live
            .iter()
            .filter(|e| self.type_filter.as_ref().is_none_or(|t| &e.event_type == t));
        live.chain(self.history.visible_events()).cloned().collect()
    }

    #[must_use]
    pub fn stats(&self, now: DateTime<Utc>) -> Stats {
        stats::summarize(&self.live, self.history.events(), now)
    }
}
