//! Scheduler tuning and strategy selection.

use flagline_core::AppConfig;
use serde::Serialize;
use std::time::Duration;

/// How queued lookups are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Strategy {
    /// One handle per direct call.
    Direct,
    /// Cloud batch first, direct fallback for misses.
    Hybrid,
}

#[derive(Debug, Clone)]
pub struct SchedulerPolicy {
    pub capacity: usize,
    pub item_timeout: Duration,
    pub max_concurrent: usize,
    pub batch_size: usize,
    /// Resolved-item count below which [`Strategy::Direct`] is forced.
    pub warmup_items: u64,
    /// Scroll velocity (px/s) above which [`Strategy::Direct`] is forced.
    pub fast_scroll_threshold: f64,
    pub direct_spacing: Duration,
    pub hybrid_spacing: Duration,
    pub rate_limited_spacing: Duration,
    /// Re-check interval while nothing can be dispatched.
    pub idle_poll: Duration,
    /// Assumed rate-limit window when the upstream gives no reset time.
    pub default_rate_limit_window: Duration,
}

impl Default for SchedulerPolicy {
    fn default() -> Self {
        Self {
            capacity: 150,
            item_timeout: Duration::from_secs(30),
            max_concurrent: 5,
            batch_size: 5,
            warmup_items: 30,
            fast_scroll_threshold: 1500.0,
            direct_spacing: Duration::from_millis(50),
            hybrid_spacing: Duration::from_millis(100),
            rate_limited_spacing: Duration::from_secs(2),
            idle_poll: Duration::from_secs(1),
            default_rate_limit_window: Duration::from_secs(60),
        }
    }
}

impl SchedulerPolicy {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            capacity: config.max_queue_size,
            item_timeout: config.queue_item_timeout(),
            max_concurrent: config.max_concurrent_requests.max(1),
            batch_size: config.batch_size.max(1),
            warmup_items: config.warmup_items,
            fast_scroll_threshold: config.fast_scroll_threshold,
            ..Self::default()
        }
    }
}

/// Pick the strategy for the next dispatch.
///
/// Direct while the page is still warming up, so the first screenful
/// resolves with the lowest latency, and while the user scrolls fast, when
/// waiting to fill a batch would resolve items after they left the screen.
/// Hybrid otherwise, to spare the upstream rate limit.
pub fn select_strategy(total_processed: u64, scroll_velocity: f64, policy: &SchedulerPolicy) -> Strategy {
    if total_processed < policy.warmup_items || scroll_velocity > policy.fast_scroll_threshold {
        Strategy::Direct
    } else {
        Strategy::Hybrid
    }
}
