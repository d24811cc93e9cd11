//! The scheduling loop.
//!
//! One task owns the request queue, the scroll signals, and every scheduler
//! counter. Callers talk to it through a [`SchedulerHandle`]; network calls
//! run on their own tasks and report back over a completion channel, so all
//! queue and counter mutation happens on the loop task.
//!
//! ### A processing pass
//!
//! 1. Expire the rate-limit window if it has elapsed.
//! 2. Purge items older than the item timeout.
//! 3. Honor the dispatch spacing and the concurrency budget.
//! 4. Re-sort the queue by distance to the viewport center.
//! 5. Pick a [`Strategy`] and dispatch.
//!
//! The loop then sleeps until the next spacing deadline, the next backoff
//! expiry, or the idle poll, whichever comes first. Any command or
//! completion wakes it early.

mod policy;

pub use policy::{SchedulerPolicy, Strategy, select_strategy};

use crate::Error;
use crate::cache::LocalCache;
use crate::queue::{Admission, QueueItem, RequestQueue, ViewportAnchor};
use crate::resolver::{DirectResult, LocationResult, Resolver};
use crate::signals::ScrollTracker;
use crate::uploads::UploadQueue;
use flagline_client::validate_handle;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Point-in-time view of the scheduler state.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerSnapshot {
    pub strategy: Strategy,
    pub scroll_velocity: f64,
    pub scrolling: bool,
    pub root_margin: u32,
    pub initial_load: bool,
    /// Loads started in the current burst window.
    pub burst_loads: usize,
    /// The current burst went over its budget. Informational only.
    pub bursting: bool,
    pub total_processed: u64,
    pub queued: usize,
    pub in_flight: usize,
    pub concurrency_budget: usize,
    pub rate_limited: bool,
}

enum Command {
    Lookup(QueueItem),
    Scroll { y: f64 },
    Navigate,
    NoteDiscovered(oneshot::Sender<bool>),
    TrackLoad,
    IdleLoadDue { loaded_ahead: usize, reply: oneshot::Sender<bool> },
    Snapshot(oneshot::Sender<SchedulerSnapshot>),
}

enum Completion {
    Direct { item: QueueItem, result: DirectResult },
    Cloud { batch: Vec<QueueItem>, hits: HashMap<String, String> },
}

enum Dispatch {
    Sent,
    /// An item was answered without a network call.
    ResolvedLocally,
    NothingReady,
}

/// Cloneable entry point to the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    commands: mpsc::UnboundedSender<Command>,
    cache: LocalCache,
}

impl SchedulerHandle {
    /// Resolve the location of `handle`.
    ///
    /// Answers from the cache when possible; otherwise queues the lookup and
    /// waits for the scheduler. Always resolves: every failure mode ends in
    /// an empty result.
    pub async fn get_user_location(&self, handle: &str, anchor: Arc<dyn ViewportAnchor>) -> LocationResult {
        if let Err(e) = validate_handle(handle) {
            tracing::debug!(error = %e, "ignoring lookup");
            return LocationResult::empty();
        }
        if let Some(entry) = self.cache.get(handle).await {
            return entry.into();
        }

        let (item, reply) = QueueItem::new(handle, anchor, Instant::now());
        if self.commands.send(Command::Lookup(item)).is_err() {
            return LocationResult::empty();
        }
        reply.await.unwrap_or_default()
    }

    /// Feed a scroll position sample.
    pub fn record_scroll(&self, y: f64) {
        let _ = self.commands.send(Command::Scroll { y });
    }

    /// The page changed; start the session counters over.
    pub fn navigate(&self) {
        let _ = self.commands.send(Command::Navigate);
    }

    /// Count a newly discovered item; `true` while it belongs to the eager
    /// initial load.
    pub async fn note_discovered(&self) -> bool {
        self.ask(Command::NoteDiscovered).await.unwrap_or(false)
    }

    /// Count a load that started outside the initial load.
    pub fn track_loaded(&self) {
        let _ = self.commands.send(Command::TrackLoad);
    }

    /// Whether one more item ahead of a resting viewport should load now.
    pub async fn idle_load_due(&self, loaded_ahead: usize) -> bool {
        self.ask(|reply| Command::IdleLoadDue { loaded_ahead, reply }).await.unwrap_or(false)
    }

    pub async fn snapshot(&self) -> Result<SchedulerSnapshot, Error> {
        self.ask(Command::Snapshot).await
    }

    async fn ask<T>(&self, command: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, Error> {
        let (reply, rx) = oneshot::channel();
        self.commands.send(command(reply)).map_err(|_| Error::SchedulerClosed)?;
        rx.await.map_err(|_| Error::SchedulerClosed)
    }
}

/// Owner of the queue and all scheduling state. Lives on its own task.
pub struct Scheduler {
    policy: SchedulerPolicy,
    resolver: Resolver,
    cache: LocalCache,
    uploads: UploadQueue,
    queue: RequestQueue,
    signals: ScrollTracker,
    in_flight: usize,
    total_processed: u64,
    rate_limited_until: Option<Instant>,
    next_dispatch_at: Option<Instant>,
    commands: mpsc::UnboundedReceiver<Command>,
    completions: mpsc::UnboundedReceiver<Completion>,
    completions_tx: mpsc::UnboundedSender<Completion>,
}

impl Scheduler {
    /// Start the scheduling loop.
    ///
    /// The loop stops when `shutdown` fires or every handle is dropped;
    /// anything still queued then resolves empty.
    pub fn spawn(
        policy: SchedulerPolicy, resolver: Resolver, cache: LocalCache, uploads: UploadQueue,
        shutdown: CancellationToken,
    ) -> SchedulerHandle {
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let (completions_tx, completions) = mpsc::unbounded_channel();
        let scheduler = Self {
            queue: RequestQueue::new(policy.capacity),
            policy,
            resolver,
            cache: cache.clone(),
            uploads,
            signals: ScrollTracker::new(),
            in_flight: 0,
            total_processed: 0,
            rate_limited_until: None,
            next_dispatch_at: None,
            commands,
            completions,
            completions_tx,
        };
        tokio::spawn(scheduler.run(shutdown));
        SchedulerHandle { commands: commands_tx, cache }
    }

    async fn run(mut self, shutdown: CancellationToken) {
        let mut wake_at: Option<Instant> = None;
        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                Some(done) = self.completions.recv() => self.handle_completion(done).await,
                command = self.commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                _ = sleep_until(wake_at) => {}
            }
            wake_at = self.run_pass(Instant::now());
        }

        let drained = self.queue.drain();
        tracing::debug!(drained, total_processed = self.total_processed, "scheduler stopped");
    }

    fn handle_command(&mut self, command: Command) {
        let now = Instant::now();
        match command {
            Command::Lookup(item) => match self.queue.admit(item) {
                Admission::Queued => {}
                Admission::Evicted { handle } => tracing::debug!(%handle, "queue full; evicted farthest lookup"),
                Admission::Rejected => tracing::debug!("queue full; rejected lookup"),
            },
            Command::Scroll { y } => self.signals.record_scroll(y, now),
            Command::Navigate => {
                self.signals.reset();
                self.total_processed = 0;
                tracing::info!(queued = self.queue.len(), "navigation; session counters reset");
            }
            Command::NoteDiscovered(reply) => {
                let _ = reply.send(self.signals.note_discovered());
            }
            Command::TrackLoad => self.signals.track_item_loaded(now),
            Command::IdleLoadDue { loaded_ahead, reply } => {
                let _ = reply.send(self.signals.idle_load_due(now, loaded_ahead));
            }
            Command::Snapshot(reply) => {
                let _ = reply.send(self.snapshot(now));
            }
        }
    }

    async fn handle_completion(&mut self, done: Completion) {
        let now = Instant::now();
        match done {
            Completion::Direct { item, result } => {
                self.in_flight = self.in_flight.saturating_sub(1);
                self.finish_direct(item, result, now).await;
            }
            Completion::Cloud { batch, hits } => {
                for item in batch {
                    match hits.get(&item.handle) {
                        Some(location) => {
                            self.in_flight = self.in_flight.saturating_sub(1);
                            self.total_processed += 1;
                            self.cache.put(&item.handle, Some(location.as_str()), None).await;
                            item.resolve(LocationResult::found(location.clone(), None));
                        }
                        None if item.retry_count == 0 && self.is_rate_limited(now) => {
                            self.in_flight = self.in_flight.saturating_sub(1);
                            item.resolve_empty();
                        }
                        // The in-flight slot carries over to the fallback call.
                        None => self.spawn_direct(item),
                    }
                }
            }
        }
    }

    async fn finish_direct(&mut self, mut item: QueueItem, result: DirectResult, now: Instant) {
        match result {
            DirectResult::Resolved(found) => {
                self.total_processed += 1;
                if let Some(location) = found.location.as_deref() {
                    self.cache.put(&item.handle, Some(location), found.user_id.as_deref()).await;
                    self.record_upload(&item.handle, location);
                }
                item.resolve(found);
            }
            DirectResult::RateLimited { reset_after } => {
                self.enter_rate_limit(now, reset_after);
                if item.schedule_retry(now) {
                    tracing::debug!(handle = %item.handle, retry = item.retry_count, "rate limited; retry scheduled");
                    if self.queue.admit(item) == Admission::Rejected {
                        tracing::debug!("queue full; dropped retry");
                    }
                } else {
                    tracing::warn!(handle = %item.handle, "rate limited; retries exhausted");
                    item.resolve_empty();
                }
            }
            DirectResult::Failed => item.resolve_empty(),
        }
    }

    fn run_pass(&mut self, now: Instant) -> Option<Instant> {
        self.refresh_rate_limit(now);

        let purged = self.queue.purge_stale(now, self.policy.item_timeout);
        if purged > 0 {
            tracing::debug!(purged, "purged stale lookups");
        }
        if self.queue.is_empty() {
            return None;
        }

        if let Some(at) = self.next_dispatch_at.filter(|at| *at > now) {
            return Some(at);
        }
        let budget = self.concurrency_budget(now);
        if self.in_flight >= budget {
            return Some(now + self.policy.idle_poll);
        }

        self.queue.sort_by_distance();
        let strategy = select_strategy(self.total_processed, self.signals.velocity(now), &self.policy);
        let dispatch = match strategy {
            Strategy::Direct => self.dispatch_direct(now),
            Strategy::Hybrid => self.dispatch_hybrid(now, budget),
        };

        match dispatch {
            Dispatch::Sent => {
                let at = now + self.spacing(strategy, now);
                self.next_dispatch_at = Some(at);
                Some(at)
            }
            Dispatch::ResolvedLocally => Some(now),
            Dispatch::NothingReady => {
                let idle = now + self.policy.idle_poll;
                Some(self.queue.next_ready_at().map_or(idle, |at| at.min(idle)))
            }
        }
    }

    fn dispatch_direct(&mut self, now: Instant) -> Dispatch {
        let Some(item) = self.queue.take_ready(now) else {
            return Dispatch::NothingReady;
        };
        if item.retry_count == 0 && self.is_rate_limited(now) {
            tracing::debug!(handle = %item.handle, "rate limited; skipping fresh lookup");
            item.resolve_empty();
            return Dispatch::ResolvedLocally;
        }
        self.in_flight += 1;
        self.spawn_direct(item);
        Dispatch::Sent
    }

    fn dispatch_hybrid(&mut self, now: Instant, budget: usize) -> Dispatch {
        let room = budget.saturating_sub(self.in_flight).min(self.policy.batch_size);
        let batch = self.queue.take_ready_batch(now, room);
        if batch.is_empty() {
            return Dispatch::NothingReady;
        }
        self.in_flight += batch.len();

        let resolver = self.resolver.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let handles: Vec<String> = batch.iter().map(|item| item.handle.clone()).collect();
            let hits = resolver.cloud_batch(&handles).await;
            let _ = done.send(Completion::Cloud { batch, hits });
        });
        Dispatch::Sent
    }

    fn spawn_direct(&self, item: QueueItem) {
        let resolver = self.resolver.clone();
        let done = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = resolver.direct(&item.handle).await;
            let _ = done.send(Completion::Direct { item, result });
        });
    }

    fn record_upload(&self, handle: &str, location: &str) {
        let uploads = self.uploads.clone();
        let handle = handle.to_string();
        let location = location.to_string();
        tokio::spawn(async move {
            if let Err(e) = uploads.enqueue(&handle, &location).await {
                tracing::warn!(%handle, error = %e, "could not queue location for upload");
            }
        });
    }

    fn is_rate_limited(&self, now: Instant) -> bool {
        self.rate_limited_until.is_some_and(|until| now < until)
    }

    fn enter_rate_limit(&mut self, now: Instant, reset_after: Option<Duration>) {
        let window = reset_after.unwrap_or(self.policy.default_rate_limit_window);
        if !self.is_rate_limited(now) {
            tracing::warn!(window_secs = window.as_secs(), "rate limited by upstream; collapsing concurrency");
        }
        let until = now + window;
        self.rate_limited_until = Some(self.rate_limited_until.map_or(until, |current| current.max(until)));
    }

    fn refresh_rate_limit(&mut self, now: Instant) {
        if self.rate_limited_until.is_some_and(|until| until <= now) {
            self.rate_limited_until = None;
            tracing::info!("rate-limit window elapsed; restoring concurrency");
        }
    }

    fn concurrency_budget(&self, now: Instant) -> usize {
        if self.is_rate_limited(now) { 1 } else { self.policy.max_concurrent }
    }

    fn spacing(&self, strategy: Strategy, now: Instant) -> Duration {
        if self.is_rate_limited(now) {
            return self.policy.rate_limited_spacing;
        }
        match strategy {
            Strategy::Direct => self.policy.direct_spacing,
            Strategy::Hybrid => self.policy.hybrid_spacing,
        }
    }

    fn snapshot(&self, now: Instant) -> SchedulerSnapshot {
        let velocity = self.signals.velocity(now);
        SchedulerSnapshot {
            strategy: select_strategy(self.total_processed, velocity, &self.policy),
            scroll_velocity: velocity,
            scrolling: self.signals.is_scrolling(now),
            root_margin: self.signals.root_margin(now),
            initial_load: self.signals.in_initial_load(),
            burst_loads: self.signals.burst_loads(now),
            bursting: !self.signals.should_load_item(now),
            total_processed: self.total_processed,
            queued: self.queue.len(),
            in_flight: self.in_flight,
            concurrency_budget: self.concurrency_budget(now),
            rate_limited: self.is_rate_limited(now),
        }
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
