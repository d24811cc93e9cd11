//! Adaptive lookup core for flagline.
//!
//! Decides, for every handle discovered while a feed scrolls, how and when
//! its location is fetched:
//!
//! - [`cache`]: in-memory location cache with TTL and debounced persistence
//! - [`uploads`]: durable, deduplicating buffer of fresh results for the cloud
//! - [`resolver`]: the direct and cloud-batch lookup paths
//! - [`queue`]: capacity-bounded, distance-ordered request queue
//! - [`scheduler`]: the single scheduling loop tying the above together
//! - [`signals`]: scroll velocity and load pacing inputs
//! - [`license`]: license verification with offline fallback
//! - [`blocking`]: licensed hide/mute verdicts by location

pub mod blocking;
pub mod cache;
pub mod error;
pub mod license;
pub mod queue;
pub mod resolver;
pub mod scheduler;
pub mod signals;
pub mod uploads;

#[cfg(test)]
pub(crate) mod testing;

pub use blocking::{BlockList, Verdict};
pub use cache::{CachePolicy, LocalCache};
pub use error::Error;
pub use queue::{FixedDistance, ViewportAnchor};
pub use resolver::{LocationResult, Resolver};
pub use scheduler::{Scheduler, SchedulerHandle, SchedulerPolicy, SchedulerSnapshot, Strategy};
pub use signals::ScrollTracker;
pub use uploads::{FlushOutcome, UploadPolicy, UploadQueue};
