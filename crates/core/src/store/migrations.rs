//! Schema versioning.
//!
//! The applied schema version lives in SQLite's `user_version` header field.
//! Each step in [`MIGRATIONS`] runs in its own transaction together with the
//! version bump, so a crash mid-upgrade leaves the store at the last complete
//! version.

use super::Error;
use tokio_rusqlite::Connection;

/// Ordered schema steps; entry `i` upgrades the store to version `i + 1`.
const MIGRATIONS: &[&str] = &[
    include_str!("../../migrations/001_locations.sql"),
    include_str!("../../migrations/002_pending_uploads.sql"),
    include_str!("../../migrations/003_settings.sql"),
];

/// Bring the schema up to the latest version.
///
/// A store written by a newer build (version beyond the known steps) is
/// refused rather than opened with a schema this build does not understand.
pub async fn run(conn: &Connection) -> Result<(), Error> {
    conn.call(|conn| -> Result<(), Error> {
        let applied: usize = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;
        if applied > MIGRATIONS.len() {
            return Err(Error::MigrationFailed(format!(
                "store is at schema version {applied}, newest known is {}",
                MIGRATIONS.len()
            )));
        }

        for (idx, sql) in MIGRATIONS.iter().enumerate().skip(applied) {
            let version = idx + 1;
            let tx = conn.transaction()?;
            tx.execute_batch(sql)
                .map_err(|e| Error::MigrationFailed(format!("step {version}: {e}")))?;
            tx.pragma_update(None, "user_version", version)?;
            tx.commit()?;
            tracing::debug!(version, "applied schema migration");
        }
        Ok(())
    })
    .await
    .map_err(Error::from)
}
