//! SQLite-backed durable state.
//!
//! Holds the two records the lookup core persists across restarts plus a
//! small settings table:
//!
//! - `locations`: resolved handle -> location cache with expiry
//! - `pending_uploads`: handle -> location pairs awaiting cloud submission
//! - `settings`: key/value pairs such as the last known license status
//!
//! Access goes through tokio-rusqlite so database work runs on a background
//! thread and never blocks the scheduling loop.

pub mod connection;
pub mod locations;
pub mod migrations;
pub mod settings;
pub mod uploads;

pub use crate::Error;

pub use connection::StateDb;
pub use locations::CacheEntry;
pub use uploads::PendingUpload;
