//! Pending lookup requests.
//!
//! The queue holds at most `capacity` items. Every waiter gets exactly one
//! answer: items that are evicted, rejected, expire, or are drained at
//! shutdown resolve to an empty result instead of being dropped silently.

use crate::resolver::{LocationResult, retry_delay};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::Instant;

/// Where the element that triggered a lookup currently sits relative to the
/// viewport. Queried at sort time, so it reflects the latest scroll position.
pub trait ViewportAnchor: Send + Sync {
    /// Distance in pixels between the element center and the viewport center.
    fn distance_to_center(&self) -> f64;
}

/// Anchor that never moves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedDistance(pub f64);

impl ViewportAnchor for FixedDistance {
    fn distance_to_center(&self) -> f64 {
        self.0
    }
}

/// A lookup waiting for the scheduler.
pub struct QueueItem {
    pub handle: String,
    anchor: Arc<dyn ViewportAnchor>,
    pub created_at: Instant,
    pub retry_count: u8,
    /// Earliest instant the item may be dispatched.
    pub not_before: Option<Instant>,
    reply: oneshot::Sender<LocationResult>,
}

impl std::fmt::Debug for QueueItem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueItem")
            .field("handle", &self.handle)
            .field("retry_count", &self.retry_count)
            .field("not_before", &self.not_before)
            .finish_non_exhaustive()
    }
}

impl QueueItem {
    pub fn new(
        handle: impl Into<String>, anchor: Arc<dyn ViewportAnchor>, created_at: Instant,
    ) -> (Self, oneshot::Receiver<LocationResult>) {
        let (reply, rx) = oneshot::channel();
        let item = Self { handle: handle.into(), anchor, created_at, retry_count: 0, not_before: None, reply };
        (item, rx)
    }

    /// Current distance to the viewport center. Unknown positions sort last.
    pub fn distance(&self) -> f64 {
        let d = self.anchor.distance_to_center();
        if d.is_nan() { f64::INFINITY } else { d.abs() }
    }

    pub fn is_ready(&self, now: Instant) -> bool {
        self.not_before.is_none_or(|at| at <= now)
    }

    pub fn is_stale(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.created_at) > timeout
    }

    /// Arm the next retry. Returns `false` once the retry budget is spent.
    pub fn schedule_retry(&mut self, now: Instant) -> bool {
        match retry_delay(self.retry_count) {
            Some(delay) => {
                self.not_before = Some(now + delay);
                self.retry_count += 1;
                true
            }
            None => false,
        }
    }

    /// Deliver the answer. A waiter that has gone away is not an error.
    pub fn resolve(self, result: LocationResult) {
        let _ = self.reply.send(result);
    }

    pub fn resolve_empty(self) {
        self.resolve(LocationResult::empty());
    }
}

/// Result of offering an item to a full or non-full queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Admission {
    Queued,
    /// Queued after evicting the farthest item, which resolved empty.
    Evicted { handle: String },
    /// Not queued; the item resolved empty.
    Rejected,
}

/// Capacity-bounded queue of pending lookups.
#[derive(Debug)]
pub struct RequestQueue {
    items: Vec<QueueItem>,
    capacity: usize,
}

impl RequestQueue {
    pub fn new(capacity: usize) -> Self {
        Self { items: Vec::new(), capacity: capacity.max(1) }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Offer an item.
    ///
    /// When full, the farthest queued item is evicted if the new item is
    /// strictly closer to the viewport center; otherwise the new item is
    /// rejected.
    pub fn admit(&mut self, item: QueueItem) -> Admission {
        if self.items.len() < self.capacity {
            self.items.push(item);
            return Admission::Queued;
        }

        let farthest = self
            .items
            .iter()
            .enumerate()
            .map(|(idx, queued)| (idx, queued.distance()))
            .max_by(|a, b| a.1.total_cmp(&b.1));

        match farthest {
            Some((idx, distance)) if item.distance() < distance => {
                let evicted = self.items.remove(idx);
                let handle = evicted.handle.clone();
                evicted.resolve_empty();
                self.items.push(item);
                Admission::Evicted { handle }
            }
            _ => {
                item.resolve_empty();
                Admission::Rejected
            }
        }
    }

    /// Resolve and drop every item older than `timeout`. Returns how many.
    pub fn purge_stale(&mut self, now: Instant, timeout: Duration) -> usize {
        let (stale, fresh): (Vec<_>, Vec<_>) =
            std::mem::take(&mut self.items).into_iter().partition(|item| item.is_stale(now, timeout));
        self.items = fresh;
        let purged = stale.len();
        for item in stale {
            tracing::debug!(handle = %item.handle, "lookup expired in queue");
            item.resolve_empty();
        }
        purged
    }

    /// Order by current distance to the viewport center, closest first.
    ///
    /// Distances are read once per item so a moving viewport cannot make
    /// the comparison inconsistent mid-sort.
    pub fn sort_by_distance(&mut self) {
        let mut keyed: Vec<(f64, QueueItem)> =
            std::mem::take(&mut self.items).into_iter().map(|item| (item.distance(), item)).collect();
        keyed.sort_by(|a, b| a.0.total_cmp(&b.0));
        self.items = keyed.into_iter().map(|(_, item)| item).collect();
    }

    /// Remove the first item that may be dispatched at `now`.
    pub fn take_ready(&mut self, now: Instant) -> Option<QueueItem> {
        let idx = self.items.iter().position(|item| item.is_ready(now))?;
        Some(self.items.remove(idx))
    }

    /// Remove up to `max` dispatchable items, preserving order.
    pub fn take_ready_batch(&mut self, now: Instant, max: usize) -> Vec<QueueItem> {
        let mut batch = Vec::new();
        let mut rest = Vec::with_capacity(self.items.len());
        for item in std::mem::take(&mut self.items) {
            if batch.len() < max && item.is_ready(now) {
                batch.push(item);
            } else {
                rest.push(item);
            }
        }
        self.items = rest;
        batch
    }

    /// Earliest instant a waiting item becomes dispatchable.
    pub fn next_ready_at(&self) -> Option<Instant> {
        self.items.iter().filter_map(|item| item.not_before).min()
    }

    /// Resolve every queued item empty.
    pub fn drain(&mut self) -> usize {
        let drained = self.items.len();
        for item in self.items.drain(..) {
            item.resolve_empty();
        }
        drained
    }

    pub fn handles(&self) -> impl Iterator<Item = &str> {
        self.items.iter().map(|item| item.handle.as_str())
    }
}
