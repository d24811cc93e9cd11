//! Durable upload-queue records.
//!
//! One row per handle; writing a handle that is already pending replaces its
//! location (last write wins). Rows are removed only after the cloud has
//! confirmed a submission that contained them.

use super::connection::StateDb;
use super::locations::timestamp;
use crate::Error;
use serde::{Deserialize, Serialize};
use tokio_rusqlite::params;

/// A handle -> location pair awaiting submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingUpload {
    pub username: String,
    pub location: String,
}

impl PendingUpload {
    pub fn new(username: impl Into<String>, location: impl Into<String>) -> Self {
        Self { username: username.into(), location: location.into() }
    }
}

impl StateDb {
    /// Insert or overwrite the pending location for a handle.
    ///
    /// Returns the number of pending entries after the write.
    pub async fn upsert_pending(&self, handle: &str, location: &str) -> Result<usize, Error> {
        if handle.is_empty() || location.is_empty() {
            return Err(Error::InvalidInput("pending upload needs a handle and a location".into()));
        }
        let handle = handle.to_string();
        let location = location.to_string();
        let now = timestamp(chrono::Utc::now());
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                conn.execute(
                    "INSERT INTO pending_uploads (handle, location, queued_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(handle) DO UPDATE SET
                        location = excluded.location,
                        queued_at = excluded.queued_at",
                    params![handle, location, now],
                )?;
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Read up to `limit` pending entries.
    ///
    /// Callers must not rely on the order; the oldest rows happen to come first.
    pub async fn pending_batch(&self, limit: usize) -> Result<Vec<PendingUpload>, Error> {
        let limit = limit as i64;
        self.conn
            .call(move |conn| -> Result<Vec<PendingUpload>, Error> {
                let mut stmt =
                    conn.prepare("SELECT handle, location FROM pending_uploads ORDER BY queued_at ASC LIMIT ?1")?;
                let rows = stmt.query_map(params![limit], |row| {
                    Ok(PendingUpload { username: row.get(0)?, location: row.get(1)? })
                })?;
                let mut batch = Vec::new();
                for row in rows {
                    batch.push(row?);
                }
                Ok(batch)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn pending_count(&self) -> Result<usize, Error> {
        self.conn
            .call(|conn| -> Result<usize, Error> {
                let count: i64 = conn.query_row("SELECT COUNT(*) FROM pending_uploads", [], |row| row.get(0))?;
                Ok(count as usize)
            })
            .await
            .map_err(Error::from)
    }

    /// Remove entries that were part of a confirmed submission.
    ///
    /// The current rows are re-read inside the transaction: a handle is only
    /// deleted while it still holds the submitted location, so entries added
    /// or rewritten during the network round-trip stay queued.
    /// Returns the number of deleted rows.
    pub async fn remove_submitted(&self, submitted: Vec<PendingUpload>) -> Result<usize, Error> {
        self.conn
            .call(move |conn| -> Result<usize, Error> {
                let tx = conn.transaction()?;
                let mut removed = 0;
                {
                    let mut stmt = tx.prepare("DELETE FROM pending_uploads WHERE handle = ?1 AND location = ?2")?;
                    for entry in &submitted {
                        removed += stmt.execute(params![&entry.username, &entry.location])?;
                    }
                }
                tx.commit()?;
                Ok(removed)
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_upsert_overwrites() {
        let db = StateDb::open_in_memory().await.unwrap();
        assert_eq!(db.upsert_pending("jack", "Canada").await.unwrap(), 1);
        assert_eq!(db.upsert_pending("jack", "Mexico").await.unwrap(), 1);

        let batch = db.pending_batch(50).await.unwrap();
        assert_eq!(batch, vec![PendingUpload::new("jack", "Mexico")]);
    }

    #[tokio::test]
    async fn test_upsert_rejects_empty() {
        let db = StateDb::open_in_memory().await.unwrap();
        assert!(matches!(db.upsert_pending("", "Canada").await, Err(Error::InvalidInput(_))));
        assert!(matches!(db.upsert_pending("jack", "").await, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_batch_respects_limit() {
        let db = StateDb::open_in_memory().await.unwrap();
        for i in 0..7 {
            db.upsert_pending(&format!("user{i}"), "Kenya").await.unwrap();
        }
        assert_eq!(db.pending_batch(5).await.unwrap().len(), 5);
        assert_eq!(db.pending_count().await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_remove_submitted_keeps_new_and_rewritten() {
        let db = StateDb::open_in_memory().await.unwrap();
        db.upsert_pending("a", "Chile").await.unwrap();
        db.upsert_pending("b", "Peru").await.unwrap();
        let submitted = db.pending_batch(50).await.unwrap();

        // Arrives while the submission is in flight.
        db.upsert_pending("c", "Ghana").await.unwrap();
        db.upsert_pending("b", "Bolivia").await.unwrap();

        let removed = db.remove_submitted(submitted).await.unwrap();
        assert_eq!(removed, 1);

        let mut left = db.pending_batch(50).await.unwrap();
        left.sort_by(|x, y| x.username.cmp(&y.username));
        assert_eq!(left, vec![PendingUpload::new("b", "Bolivia"), PendingUpload::new("c", "Ghana")]);
    }
}
