//! The two lookup paths.
//!
//! The direct path resolves one handle at a time against the rate-limited
//! upstream. The cloud path resolves a batch from the shared cloud database
//! and costs nothing against that limit, but only knows handles someone has
//! already submitted. Both paths swallow transport failures: a lookup that
//! cannot be answered resolves to nothing rather than failing the caller.

use flagline_client::{ClientError, CloudApi, DirectLookup};
use flagline_core::CacheEntry;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

/// Delay before each retry of a rate-limited direct lookup.
pub const RETRY_BACKOFF: [Duration; 3] = [Duration::from_secs(5), Duration::from_secs(10), Duration::from_secs(30)];

/// Backoff before retry number `retry_count + 1`, or `None` once the retry
/// budget is spent.
pub fn retry_delay(retry_count: u8) -> Option<Duration> {
    RETRY_BACKOFF.get(usize::from(retry_count)).copied()
}

/// What a lookup resolves to. Both fields absent means "nothing found".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LocationResult {
    pub location: Option<String>,
    pub user_id: Option<String>,
}

impl LocationResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn found(location: impl Into<String>, user_id: Option<String>) -> Self {
        Self { location: Some(location.into()), user_id }
    }
}

impl From<CacheEntry> for LocationResult {
    fn from(entry: CacheEntry) -> Self {
        Self { location: Some(entry.location), user_id: entry.user_id }
    }
}

/// Outcome of one direct attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DirectResult {
    /// The upstream answered (possibly with no location) or the attempt
    /// timed out.
    Resolved(LocationResult),
    /// The upstream rejected the attempt with a rate limit.
    RateLimited { reset_after: Option<Duration> },
    /// Transport failure; not counted as processed.
    Failed,
}

/// Runs lookups against the direct and cloud collaborators.
#[derive(Clone)]
pub struct Resolver {
    direct: Arc<dyn DirectLookup>,
    cloud: Arc<dyn CloudApi>,
    direct_timeout: Duration,
}

impl Resolver {
    pub fn new(direct: Arc<dyn DirectLookup>, cloud: Arc<dyn CloudApi>, direct_timeout: Duration) -> Self {
        Self { direct, cloud, direct_timeout }
    }

    /// One direct attempt, bounded by the direct timeout.
    pub async fn direct(&self, handle: &str) -> DirectResult {
        match tokio::time::timeout(self.direct_timeout, self.direct.lookup(handle)).await {
            Err(_) | Ok(Err(ClientError::Timeout)) => {
                tracing::debug!(handle, timeout_ms = self.direct_timeout.as_millis() as u64, "direct lookup timed out");
                DirectResult::Resolved(LocationResult::empty())
            }
            Ok(Err(ClientError::RateLimited)) => DirectResult::RateLimited { reset_after: None },
            Ok(Err(e)) => {
                tracing::warn!(handle, error = %e, "direct lookup failed");
                DirectResult::Failed
            }
            Ok(Ok(outcome)) if outcome.rate_limited => DirectResult::RateLimited { reset_after: outcome.reset_after },
            Ok(Ok(outcome)) => DirectResult::Resolved(LocationResult {
                location: outcome.location.filter(|l| !l.is_empty()),
                user_id: outcome.user_id,
            }),
        }
    }

    /// Batch lookup against the cloud; a failed request is a miss for every
    /// handle in the batch.
    pub async fn cloud_batch(&self, handles: &[String]) -> HashMap<String, String> {
        match self.cloud.lookup(handles).await {
            Ok(hits) => {
                tracing::debug!(requested = handles.len(), hits = hits.len(), "cloud batch lookup");
                hits
            }
            Err(e) => {
                tracing::warn!(requested = handles.len(), error = %e, "cloud batch lookup failed; falling back");
                HashMap::new()
            }
        }
    }
}
