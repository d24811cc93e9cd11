//! Persisted location cache records.
//!
//! The in-memory cache is authoritative during a session; this table is the
//! durable snapshot it is restored from on startup.

use super::connection::StateDb;
use crate::Error;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A resolved location for one handle.
///
/// There is no representation for "resolved to nothing": lookups that find
/// no location are never cached so they can be attempted again later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub handle: String,
    pub location: String,
    pub user_id: Option<String>,
    pub expires_at: DateTime<Utc>,
}

impl CacheEntry {
    pub fn new(
        handle: impl Into<String>, location: impl Into<String>, user_id: Option<String>, ttl: chrono::Duration,
    ) -> Self {
        Self { handle: handle.into(), location: location.into(), user_id, expires_at: Utc::now() + ttl }
    }

    /// Entries whose expiry is at or before `now` are stale.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Fixed-width RFC 3339 so stored timestamps compare correctly as text.
pub(crate) fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl StateDb {
    /// Replace the persisted cache with `entries` in a single transaction.
    pub async fn save_locations(&self, entries: Vec<CacheEntry>) -> Result<usize, Error> {
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM locations", [])?;
                {
                    let mut stmt = tx.prepare(
                        "INSERT INTO locations (handle, location, user_id, expires_at) VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for entry in &entries {
                        stmt.execute(params![
                            &entry.handle,
                            &entry.location,
                            &entry.user_id,
                            timestamp(entry.expires_at)
                        ])?;
                    }
                }
                tx.commit()?;
                Ok(entries.len())
            })
            .await
            .map_err(Error::from)
    }

    /// Load every entry that is still fresh at `now`.
    ///
    /// Expired rows are deleted as a side effect. Rows whose expiry cannot be
    /// parsed are skipped.
    pub async fn load_locations(&self, now: DateTime<Utc>) -> Result<Vec<CacheEntry>, Error> {
        let cutoff = timestamp(now);
        self.conn
            .call(move |conn| -> Result<Vec<CacheEntry>, Error> {
                let purged = conn.execute("DELETE FROM locations WHERE expires_at <= ?1", params![cutoff])?;
                if purged > 0 {
                    tracing::debug!(purged, "dropped expired cache rows");
                }

                let mut stmt = conn.prepare("SELECT handle, location, user_id, expires_at FROM locations")?;
                let rows = stmt.query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                })?;

                let mut entries = Vec::new();
                for row in rows {
                    let (handle, location, user_id, expires_at) = row?;
                    match DateTime::parse_from_rfc3339(&expires_at) {
                        Ok(expires_at) => entries.push(CacheEntry {
                            handle,
                            location,
                            user_id,
                            expires_at: expires_at.with_timezone(&Utc),
                        }),
                        Err(e) => tracing::warn!(%handle, error = %e, "skipping cache row with bad expiry"),
                    }
                }
                Ok(entries)
            })
            .await
            .map_err(Error::from)
    }
}
