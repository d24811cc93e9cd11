//! Scroll signals.
//!
//! Tracks how fast the feed is moving and how many newly discovered items
//! started loading recently. Fast scrolling widens the prefetch margin and
//! steers the scheduler toward the direct path; a stopped viewport lets
//! items ahead of it load slowly in the background. The burst count is
//! reported only: lookups are never held back by it, the request queue
//! does the limiting.

use std::time::Duration;
use tokio::time::Instant;

/// Scrolling is considered stopped after this long without an event.
pub const SCROLL_STOP_DELAY: Duration = Duration::from_millis(150);

/// Velocity thresholds in px/s.
pub const SLOW_SCROLL: f64 = 500.0;
pub const NORMAL_SCROLL: f64 = 1500.0;

/// Prefetch margins in px.
pub const INITIAL_ROOT_MARGIN: u32 = 2000;
pub const SLOW_ROOT_MARGIN: u32 = 2500;
pub const NORMAL_ROOT_MARGIN: u32 = 3000;
pub const FAST_ROOT_MARGIN: u32 = 4000;

/// Items loaded eagerly after a navigation before pacing kicks in.
pub const INITIAL_LOAD_TARGET: usize = 30;

/// Loads within one burst window above which the feed counts as bursting.
pub const BURST_MAX_ITEMS: usize = 30;
pub const BURST_WINDOW: Duration = Duration::from_secs(1);

/// Idle loading begins this long after scrolling stops.
pub const IDLE_START_DELAY: Duration = Duration::from_secs(5);
pub const IDLE_LOAD_INTERVAL: Duration = Duration::from_secs(3);
/// Idle loading pauses once this many items ahead are loaded.
pub const IDLE_LOOKAHEAD: usize = 50;

#[derive(Debug, Clone)]
pub struct ScrollTracker {
    last_y: Option<f64>,
    last_event_at: Option<Instant>,
    velocity: f64,
    initial_load: bool,
    initial_count: usize,
    burst_started: Option<Instant>,
    burst_count: usize,
    last_idle_load: Option<Instant>,
}

impl Default for ScrollTracker {
    fn default() -> Self {
        Self {
            last_y: None,
            last_event_at: None,
            velocity: 0.0,
            initial_load: true,
            initial_count: 0,
            burst_started: None,
            burst_count: 0,
            last_idle_load: None,
        }
    }
}

impl ScrollTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a scroll position sample.
    pub fn record_scroll(&mut self, y: f64, now: Instant) {
        if let (Some(prev_y), Some(prev_at)) = (self.last_y, self.last_event_at) {
            let elapsed = now.saturating_duration_since(prev_at).as_secs_f64();
            if elapsed > 0.0 {
                self.velocity = (y - prev_y).abs() / elapsed;
            }
        }
        self.last_y = Some(y);
        self.last_event_at = Some(now);
    }

    pub fn is_scrolling(&self, now: Instant) -> bool {
        self.last_event_at.is_some_and(|at| now.saturating_duration_since(at) < SCROLL_STOP_DELAY)
    }

    /// Current velocity in px/s; zero once scrolling has stopped.
    pub fn velocity(&self, now: Instant) -> f64 {
        if self.is_scrolling(now) { self.velocity } else { 0.0 }
    }

    /// Prefetch margin for the current scroll speed.
    pub fn root_margin(&self, now: Instant) -> u32 {
        if self.initial_load {
            return INITIAL_ROOT_MARGIN;
        }
        match self.velocity(now) {
            v if v < SLOW_SCROLL => SLOW_ROOT_MARGIN,
            v if v < NORMAL_SCROLL => NORMAL_ROOT_MARGIN,
            _ => FAST_ROOT_MARGIN,
        }
    }

    pub fn in_initial_load(&self) -> bool {
        self.initial_load
    }

    /// Count a newly discovered item. Returns `true` while it falls inside
    /// the eager initial load.
    pub fn note_discovered(&mut self) -> bool {
        if !self.initial_load {
            return false;
        }
        self.initial_count += 1;
        if self.initial_count >= INITIAL_LOAD_TARGET {
            self.initial_load = false;
            tracing::debug!(loaded = self.initial_count, "initial load complete");
        }
        true
    }

    /// Whether the current burst is still within its budget. Always true
    /// while the user is actively scrolling.
    pub fn should_load_item(&self, now: Instant) -> bool {
        if self.is_scrolling(now) {
            return true;
        }
        match self.burst_started {
            Some(started) if now.saturating_duration_since(started) < BURST_WINDOW => {
                self.burst_count < BURST_MAX_ITEMS
            }
            _ => true,
        }
    }

    pub fn track_item_loaded(&mut self, now: Instant) {
        let window_open = self.burst_started.is_some_and(|started| now.saturating_duration_since(started) < BURST_WINDOW);
        if !window_open {
            self.burst_started = Some(now);
            self.burst_count = 0;
        }
        self.burst_count += 1;
    }

    /// Loads counted in the burst window open at `now`.
    pub fn burst_loads(&self, now: Instant) -> usize {
        match self.burst_started {
            Some(started) if now.saturating_duration_since(started) < BURST_WINDOW => self.burst_count,
            _ => 0,
        }
    }

    /// Whether one more item ahead of the viewport should load in the
    /// background. Consumes the idle slot when it returns `true`.
    pub fn idle_load_due(&mut self, now: Instant, loaded_ahead: usize) -> bool {
        let Some(last_event) = self.last_event_at else {
            return false;
        };
        if now.saturating_duration_since(last_event) < SCROLL_STOP_DELAY + IDLE_START_DELAY {
            return false;
        }
        if loaded_ahead >= IDLE_LOOKAHEAD {
            return false;
        }
        if self.last_idle_load.is_some_and(|at| now.saturating_duration_since(at) < IDLE_LOAD_INTERVAL) {
            return false;
        }
        self.last_idle_load = Some(now);
        true
    }

    /// Start over after navigating to a new page.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
