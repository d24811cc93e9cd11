//! Contribution of fresh lookups to the cloud database.
//!
//! Every location found through the direct path is written to the durable
//! pending table, keyed by handle so repeated sightings collapse into one
//! entry. Pending entries are submitted in batches; an entry leaves the
//! table only after the cloud confirmed a submission carrying its current
//! location, so anything rewritten while a submission was in flight stays
//! queued for the next one.

use crate::Error;
use flagline_client::{CloudApi, MAX_SUBMIT_BATCH, validate_handle};
use flagline_core::{AppConfig, PendingUpload, StateDb};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// When and how much to submit.
#[derive(Debug, Clone)]
pub struct UploadPolicy {
    /// Pending count at which an enqueue submits right away.
    pub flush_threshold: usize,
    /// Pending count at which the background flusher is woken.
    pub watch_threshold: usize,
    pub batch_size: usize,
    pub interval: Duration,
    /// Delay of the first background flush after startup.
    pub kick_delay: Duration,
}

impl Default for UploadPolicy {
    fn default() -> Self {
        Self {
            flush_threshold: 20,
            watch_threshold: 10,
            batch_size: MAX_SUBMIT_BATCH,
            interval: Duration::from_secs(30 * 60),
            kick_delay: Duration::from_secs(10),
        }
    }
}

impl UploadPolicy {
    pub fn from_app(config: &AppConfig) -> Self {
        Self { interval: config.upload_interval(), kick_delay: config.upload_kick_delay(), ..Self::default() }
    }
}

/// What a flush did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FlushOutcome {
    /// Nothing was pending.
    Empty,
    /// Another flush is already running.
    Busy,
    Submitted { submitted: usize, remaining: usize },
}

/// Shared handle to the pending-upload buffer.
#[derive(Clone)]
pub struct UploadQueue {
    db: StateDb,
    cloud: Arc<dyn CloudApi>,
    policy: UploadPolicy,
    flushing: Arc<Mutex<()>>,
    pending_changed: Arc<Notify>,
}

impl UploadQueue {
    pub fn new(db: StateDb, cloud: Arc<dyn CloudApi>, policy: UploadPolicy) -> Self {
        Self { db, cloud, policy, flushing: Arc::new(Mutex::new(())), pending_changed: Arc::new(Notify::new()) }
    }

    /// Record a found location for submission.
    ///
    /// Returns the pending count after the write. Crossing the flush
    /// threshold starts a submission in the background.
    pub async fn enqueue(&self, handle: &str, location: &str) -> Result<usize, Error> {
        let pending = self.db.upsert_pending(handle, location).await?;
        if pending >= self.policy.watch_threshold {
            self.pending_changed.notify_one();
        }
        if pending >= self.policy.flush_threshold {
            let queue = self.clone();
            tokio::spawn(async move { queue.flush_logged().await });
        }
        Ok(pending)
    }

    pub async fn pending_count(&self) -> Result<usize, Error> {
        Ok(self.db.pending_count().await?)
    }

    /// Submit one batch of pending entries.
    ///
    /// On a failed submission nothing is removed and the error is returned.
    pub async fn flush(&self) -> Result<FlushOutcome, Error> {
        let Ok(_guard) = self.flushing.try_lock() else {
            return Ok(FlushOutcome::Busy);
        };

        let batch = loop {
            let (batch, unsendable): (Vec<_>, Vec<_>) =
                self.db.pending_batch(self.policy.batch_size).await?.into_iter().partition(is_submittable);
            let skipped = unsendable.len();
            self.discard(unsendable).await?;
            if skipped == 0 || !batch.is_empty() {
                break batch;
            }
        };
        if batch.is_empty() {
            return Ok(FlushOutcome::Empty);
        }

        self.cloud.submit(&batch).await?;
        let submitted = batch.len();
        let removed = self.db.remove_submitted(batch).await?;
        let remaining = self.db.pending_count().await?;
        tracing::info!(submitted, removed, remaining, "submitted pending locations");
        Ok(FlushOutcome::Submitted { submitted, remaining })
    }

    /// Drop rows the cloud would reject; one of them would otherwise fail
    /// every batch it lands in.
    async fn discard(&self, unsendable: Vec<PendingUpload>) -> Result<(), Error> {
        if unsendable.is_empty() {
            return Ok(());
        }
        let handles: Vec<&str> = unsendable.iter().map(|u| u.username.as_str()).collect();
        tracing::warn!(?handles, "dropping pending uploads the cloud would reject");
        self.db.remove_submitted(unsendable).await?;
        Ok(())
    }

    async fn flush_logged(&self) {
        match self.flush().await {
            Ok(FlushOutcome::Submitted { .. }) | Ok(FlushOutcome::Empty) => {}
            Ok(FlushOutcome::Busy) => tracing::debug!("upload flush already running"),
            Err(Error::Client(e)) if !e.is_transient() => {
                tracing::error!(error = %e, "cloud rejected upload batch; entries kept for next attempt")
            }
            Err(e) => tracing::warn!(error = %e, "upload flush failed; entries kept for next attempt"),
        }
    }

    /// Spawn the background flusher.
    ///
    /// Flushes once after the kick delay, then on every interval tick, and
    /// whenever the pending count crosses the watch threshold.
    pub fn spawn_flusher(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        let queue = self.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => return,
                _ = tokio::time::sleep(queue.policy.kick_delay) => queue.flush_logged().await,
            }

            let start = tokio::time::Instant::now() + queue.policy.interval;
            let mut ticker = tokio::time::interval_at(start, queue.policy.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = ticker.tick() => queue.flush_logged().await,
                    _ = queue.pending_changed.notified() => {
                        match queue.pending_count().await {
                            Ok(pending) if pending >= queue.policy.watch_threshold => queue.flush_logged().await,
                            Ok(_) => {}
                            Err(e) => tracing::warn!(error = %e, "could not read pending uploads"),
                        }
                    }
                }
            }
            tracing::debug!("upload flusher stopped");
        })
    }
}

fn is_submittable(upload: &PendingUpload) -> bool {
    validate_handle(&upload.username).is_ok() && !upload.location.trim().is_empty()
}
