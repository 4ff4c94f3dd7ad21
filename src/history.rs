//! Historical data window.
//!
//! Tracks the window (in days) of the loaded snapshot, any window still
//! being fetched, whether history is shown, and the snapshot itself. Fetching happens outside; this type
//! hands out tickets and only accepts the result for the newest one.

use chrono::NaiveDate;
use tracing::debug;

use crate::client::FeedWindow;
use crate::errors::HazardError;
use crate::models::DisasterEvent;

/// Supported window sizes in days.
pub const WINDOW_CHOICES: [u32; 5] = [7, 30, 90, 180, 365];

/// Window selected before the operator picks one.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;

/// Validate a window size.
///
/// # Errors
///
/// Returns `InvalidWindow` for anything outside [`WINDOW_CHOICES`].
pub fn validate_window(days: u32) -> Result<u32, HazardError> {
    if WINDOW_CHOICES.contains(&days) {
        Ok(days)
    } else {
        Err(HazardError::InvalidWindow(days))
    }
}

/// A pending historical fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowRequest {
    pub generation: u64,
    pub days: u32,
    pub window: FeedWindow,
}

#[derive(Debug, Clone)]
pub struct HistoryWindowManager {
    /// Window the loaded snapshot covers
    days: u32,
    pending: Option<u32>,
    enabled: bool,
    events: Vec<DisasterEvent>,
    generation: u64,
}

impl Default for HistoryWindowManager {
    fn default() -> Self {
        Self {
            days: DEFAULT_WINDOW_DAYS,
            pending: None,
            enabled: false,
            events: Vec::new(),
            generation: 0,
        }
    }
}

impl HistoryWindowManager {
    /// Start a window change. Supersedes any fetch still in flight.
    ///
    /// # Errors
    ///
    /// Returns `InvalidWindow` if `days` is not a supported size.
    pub fn begin(&mut self, days: u32, today: NaiveDate) -> Result<WindowRequest, HazardError> {
        let days = validate_window(days)?;
        self.pending = Some(days);
        self.generation += 1;
        Ok(WindowRequest {
            generation: self.generation,
            days,
            window: FeedWindow::historical(days, today),
        })
    }

    /// Replace the historical set with a fetched snapshot.
    ///
    /// Returns false, leaving state untouched, when `request` has been
    /// superseded by a newer window change.
    pub fn commit(&mut self, request: &WindowRequest, events: Vec<DisasterEvent>) -> bool {
        if request.generation != self.generation {
            debug!(
                "discarding stale {}-day history snapshot (generation {} < {})",
                request.days, request.generation, self.generation
            );
            return false;
        }
        self.days = request.days;
        self.pending = None;
        self.events = events;
        true
    }

    /// Give up on a failed fetch. The loaded snapshot and its window stay.
    pub fn abandon(&mut self, request: &WindowRequest) {
        if request.generation == self.generation {
            self.pending = None;
        }
    }

    /// Show or hide history. Hiding keeps the fetched snapshot.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    #[must_use]
    pub fn enabled(&self) -> bool {
        self.enabled
    }

    #[must_use]
    pub fn days(&self) -> u32 {
        self.days
    }

    /// Window requested but not loaded yet.
    #[must_use]
    pub fn pending(&self) -> Option<u32> {
        self.pending
    }

    /// The whole historical snapshot, shown or not.
    #[must_use]
    pub fn events(&self) -> &[DisasterEvent] {
        &self.events
    }

    /// The historical events to compose into the view.
    #[must_use]
    pub fn visible_events(&self) -> &[DisasterEvent] {
        if self.enabled { &self.events } else { &[] }
    }
}
