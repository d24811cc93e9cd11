//! Small key/value settings record.

use super::connection::StateDb;
use super::locations::timestamp;
use crate::Error;
use tokio_rusqlite::{params, rusqlite};

impl StateDb {
    pub async fn get_setting(&self, key: &str) -> Result<Option<String>, Error> {
        let key = key.to_string();
        self.conn
            .call(move |conn| -> Result<Option<String>, Error> {
                let result = conn.query_row("SELECT value FROM settings WHERE key = ?1", params![key], |row| row.get(0));
                match result {
                    Ok(value) => Ok(Some(value)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)
    }

    pub async fn set_setting(&self, key: &str, value: &str) -> Result<(), Error> {
        let key = key.to_string();
        let value = value.to_string();
        let now = timestamp(chrono::Utc::now());
        self.conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "INSERT INTO settings (key, value, updated_at) VALUES (?1, ?2, ?3)
                     ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
                    params![key, value, now],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_missing_setting() {
        let db = StateDb::open_in_memory().await.unwrap();
        assert!(db.get_setting("license_status").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_set_overwrites() {
        let db = StateDb::open_in_memory().await.unwrap();
        db.set_setting("license_status", "true").await.unwrap();
        db.set_setting("license_status", "false").await.unwrap();
        assert_eq!(db.get_setting("license_status").await.unwrap().as_deref(), Some("false"));
    }
}
