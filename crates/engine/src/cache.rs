//! In-memory location cache.
//!
//! Every lookup consults this cache before touching the network. Entries
//! carry an absolute expiry; an expired entry is dropped the moment it is
//! read. Only positive results are stored, so a handle that resolved to
//! nothing is looked up again next time it is seen.
//!
//! Writes mark the cache dirty. A background persister writes the snapshot
//! to the [`StateDb`] once writes have been quiet for the debounce window,
//! and again on a fixed interval, and once more on shutdown.

use chrono::Utc;
use flagline_core::{AppConfig, CacheEntry, StateDb};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Cache lifetime and persistence timing.
#[derive(Debug, Clone)]
pub struct CachePolicy {
    pub ttl: chrono::Duration,
    pub persist_debounce: Duration,
    pub persist_interval: Duration,
}

impl Default for CachePolicy {
    fn default() -> Self {
        Self {
            ttl: chrono::Duration::days(30),
            persist_debounce: Duration::from_secs(5),
            persist_interval: Duration::from_secs(30),
        }
    }
}

impl CachePolicy {
    pub fn from_app(config: &AppConfig) -> Self {
        Self {
            ttl: config.cache_ttl(),
            persist_debounce: config.cache_persist_debounce(),
            persist_interval: config.cache_persist_interval(),
        }
    }
}

/// Shared handle to the location cache.
#[derive(Clone)]
pub struct LocalCache {
    inner: Arc<CacheInner>,
}

struct CacheInner {
    entries: RwLock<HashMap<String, CacheEntry>>,
    ttl: chrono::Duration,
    dirty: AtomicBool,
    changed: Notify,
    persists: AtomicU64,
}

impl std::fmt::Debug for LocalCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalCache")
            .field("ttl", &self.inner.ttl)
            .field("dirty", &self.inner.dirty.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl LocalCache {
    pub fn new(ttl: chrono::Duration) -> Self {
        Self {
            inner: Arc::new(CacheInner {
                entries: RwLock::new(HashMap::new()),
                ttl,
                dirty: AtomicBool::new(false),
                changed: Notify::new(),
                persists: AtomicU64::new(0),
            }),
        }
    }

    /// Restore the cache from the persisted snapshot.
    ///
    /// A store that cannot be read yields an empty cache; lookups still work,
    /// they just start cold.
    pub async fn load(db: &StateDb, ttl: chrono::Duration) -> Self {
        let cache = Self::new(ttl);
        match db.load_locations(Utc::now()).await {
            Ok(entries) => {
                tracing::info!(entries = entries.len(), "restored location cache");
                let mut map = cache.inner.entries.write().await;
                for entry in entries {
                    map.insert(entry.handle.clone(), entry);
                }
            }
            Err(e) => tracing::warn!(error = %e, "could not restore location cache; starting empty"),
        }
        cache
    }

    /// Look up a handle, evicting it if it has expired.
    pub async fn get(&self, handle: &str) -> Option<CacheEntry> {
        let now = Utc::now();
        {
            let map = self.inner.entries.read().await;
            match map.get(handle) {
                None => return None,
                Some(entry) if !entry.is_expired_at(now) => return Some(entry.clone()),
                Some(_) => {}
            }
        }

        let mut map = self.inner.entries.write().await;
        if map.get(handle).is_some_and(|entry| entry.is_expired_at(now)) {
            map.remove(handle);
            self.mark_dirty();
            tracing::debug!(handle, "evicted expired cache entry");
        }
        map.get(handle).cloned()
    }

    /// Store a resolved location.
    ///
    /// Returns `false` without touching the cache when there is no location.
    pub async fn put(&self, handle: &str, location: Option<&str>, user_id: Option<&str>) -> bool {
        let Some(location) = location.filter(|l| !l.is_empty()) else {
            return false;
        };
        let entry = CacheEntry::new(handle, location, user_id.map(str::to_string), self.inner.ttl);
        self.inner.entries.write().await.insert(handle.to_string(), entry);
        self.mark_dirty();
        true
    }

    pub async fn len(&self) -> usize {
        self.inner.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.entries.read().await.is_empty()
    }

    /// All entries that have not yet expired.
    pub async fn snapshot(&self) -> Vec<CacheEntry> {
        let now = Utc::now();
        self.inner.entries.read().await.values().filter(|e| !e.is_expired_at(now)).cloned().collect()
    }

    /// Number of completed writes to the store.
    pub fn persist_count(&self) -> u64 {
        self.inner.persists.load(Ordering::Relaxed)
    }

    /// Write the current snapshot to the store.
    pub async fn persist(&self, db: &StateDb) -> Result<usize, flagline_core::Error> {
        self.inner.dirty.store(false, Ordering::Release);
        let snapshot = self.snapshot().await;
        match db.save_locations(snapshot).await {
            Ok(saved) => {
                self.inner.persists.fetch_add(1, Ordering::Relaxed);
                Ok(saved)
            }
            Err(e) => {
                self.inner.dirty.store(true, Ordering::Release);
                Err(e)
            }
        }
    }

    /// Spawn the background persister.
    pub fn spawn_persister(&self, db: StateDb, policy: &CachePolicy, shutdown: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        let debounce = policy.persist_debounce;
        let interval = policy.persist_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => break,
                    _ = cache.inner.changed.notified() => {
                        tokio::select! {
                            _ = shutdown.cancelled() => break,
                            _ = tokio::time::sleep(debounce) => cache.persist_logged(&db).await,
                        }
                    }
                    _ = ticker.tick() => cache.persist_logged(&db).await,
                }
            }

            cache.persist_logged(&db).await;
            tracing::debug!("cache persister stopped");
        })
    }

    fn mark_dirty(&self) {
        if !self.inner.dirty.swap(true, Ordering::AcqRel) {
            self.inner.changed.notify_one();
        }
    }

    async fn persist_logged(&self, db: &StateDb) {
        match self.persist(db).await {
            Ok(saved) => tracing::debug!(saved, "persisted location cache"),
            Err(e) => tracing::warn!(error = %e, "failed to persist location cache"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ttl() -> chrono::Duration {
        chrono::Duration::days(30)
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let cache = LocalCache::new(ttl());
        assert!(cache.put("jack", Some("Japan"), Some("12")).await);

        let entry = cache.get("jack").await.unwrap();
        assert_eq!(entry.location, "Japan");
        assert_eq!(entry.user_id.as_deref(), Some("12"));
        assert!(cache.get("amy").await.is_none());
    }

    #[tokio::test]
    async fn test_put_without_location_is_ignored() {
        let cache = LocalCache::new(ttl());
        assert!(!cache.put("jack", None, None).await);
        assert!(!cache.put("jack", Some(""), None).await);
        assert!(cache.is_empty().await);
    }

    #[tokio::test]
    async fn test_expired_entry_is_evicted_on_read() {
        let cache = LocalCache::new(chrono::Duration::milliseconds(-1));
        cache.put("jack", Some("Japan"), None).await;
        assert_eq!(cache.len().await, 1);

        assert!(cache.get("jack").await.is_none());
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn test_load_restores_persisted_entries() {
        let db = StateDb::open_in_memory().await.unwrap();
        let cache = LocalCache::new(ttl());
        cache.put("jack", Some("Japan"), None).await;
        cache.put("amy", Some("Canada"), Some("7")).await;
        assert_eq!(cache.persist(&db).await.unwrap(), 2);

        let restored = LocalCache::load(&db, ttl()).await;
        assert_eq!(restored.len().await, 2);
        assert_eq!(restored.get("amy").await.unwrap().user_id.as_deref(), Some("7"));
    }

    #[tokio::test]
    async fn test_persister_debounces_writes() {
        let db = StateDb::open_in_memory().await.unwrap();
        let cache = LocalCache::new(ttl());
        let policy = CachePolicy {
            ttl: ttl(),
            persist_debounce: Duration::from_millis(100),
            persist_interval: Duration::from_secs(3600),
        };
        let shutdown = CancellationToken::new();
        let task = cache.spawn_persister(db.clone(), &policy, shutdown.clone());

        cache.put("a", Some("Chile"), None).await;
        cache.put("b", Some("Peru"), None).await;
        cache.put("c", Some("Spain"), None).await;
        assert!(db.load_locations(Utc::now()).await.unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(db.load_locations(Utc::now()).await.unwrap().len(), 3);
        assert_eq!(cache.persist_count(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_persister_flushes_on_shutdown() {
        let db = StateDb::open_in_memory().await.unwrap();
        let cache = LocalCache::new(ttl());
        let policy = CachePolicy {
            ttl: ttl(),
            persist_debounce: Duration::from_secs(3600),
            persist_interval: Duration::from_secs(3600),
        };
        let shutdown = CancellationToken::new();
        let task = cache.spawn_persister(db.clone(), &policy, shutdown.clone());

        cache.put("jack", Some("Japan"), None).await;
        shutdown.cancel();
        task.await.unwrap();

        let saved = db.load_locations(Utc::now()).await.unwrap();
        assert_eq!(saved.len(), 1);
        assert_eq!(saved[0].handle, "jack");
    }

    async fn wait_for_persists(cache: &LocalCache, expected: u64) {
        for _ in 0..200 {
            if cache.persist_count() >= expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        panic!("persist count never reached {expected}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_persister_writes_every_interval_without_changes() {
        let db = StateDb::open_in_memory().await.unwrap();
        let cache = LocalCache::new(ttl());
        let shutdown = CancellationToken::new();
        let task = cache.spawn_persister(db.clone(), &CachePolicy::default(), shutdown.clone());

        cache.put("jack", Some("Japan"), None).await;
        tokio::time::sleep(Duration::from_secs(6)).await;
        wait_for_persists(&cache, 1).await;
        assert_eq!(cache.persist_count(), 1);

        // Nothing changed since; the 30 s tick writes anyway.
        tokio::time::sleep(Duration::from_secs(25)).await;
        wait_for_persists(&cache, 2).await;
        assert_eq!(cache.persist_count(), 2);

        tokio::time::sleep(Duration::from_secs(30)).await;
        wait_for_persists(&cache, 3).await;
        assert_eq!(cache.persist_count(), 3);
        assert_eq!(db.load_locations(Utc::now()).await.unwrap().len(), 1);

        shutdown.cancel();
        task.await.unwrap();
    }
}
