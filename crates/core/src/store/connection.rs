//! Opening the state store.

use super::migrations;
use crate::Error;
use std::path::Path;
use tokio_rusqlite::Connection;

/// WAL keeps readers (cache load, pending counts) off the writer's lock; the
/// store holds nothing that cannot be rebuilt, so `synchronous=NORMAL` is
/// enough.
const PRAGMAS: &str = "PRAGMA journal_mode = WAL;
PRAGMA synchronous = NORMAL;
PRAGMA busy_timeout = 5000;";

/// Handle to the durable state store.
///
/// Statements run on tokio-rusqlite's dedicated thread; clones share that
/// one connection.
#[derive(Clone, Debug)]
pub struct StateDb {
    pub(crate) conn: Connection,
}

impl StateDb {
    /// Open (creating if absent) the store at `path` and migrate it.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, Error> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| Error::InvalidInput(format!("cannot create {}: {e}", parent.display())))?;
        }
        let conn = Connection::open(path).await?;
        Self::prepare(conn).await
    }

    /// A throwaway store that lives as long as the handle.
    pub async fn open_in_memory() -> Result<Self, Error> {
        Self::prepare(Connection::open_in_memory().await?).await
    }

    async fn prepare(conn: Connection) -> Result<Self, Error> {
        conn.call(|conn| conn.execute_batch(PRAGMAS)).await?;
        migrations::run(&conn).await?;
        Ok(Self { conn })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_in_memory_store_is_migrated() {
        let db = StateDb::open_in_memory().await.unwrap();
        assert_eq!(db.pending_count().await.unwrap(), 0);
        assert_eq!(db.get_setting("license_status").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_open_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("state.sqlite");

        StateDb::open(&path).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.sqlite");

        let db = StateDb::open(&path).await.unwrap();
        db.set_setting("theme", "1").await.unwrap();
        drop(db);

        let db = StateDb::open(&path).await.unwrap();
        assert_eq!(db.get_setting("theme").await.unwrap().as_deref(), Some("1"));
    }
}
