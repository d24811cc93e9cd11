//! Network clients for flagline.
//!
//! This crate provides the HTTP side of the lookup core: the shared cloud
//! location service (batch lookup, submission, license check) and the direct
//! per-user lookup collaborator. Both sit behind traits so the scheduler can
//! be driven by test doubles.

pub mod cloud;
pub mod direct;
pub mod endpoint;
pub mod error;

pub use cloud::{CloudApi, CloudClient, CloudConfig, MAX_SUBMIT_BATCH};
pub use direct::{DirectConfig, DirectLookup, DirectOutcome, HttpDirectLookup};
pub use endpoint::{join_endpoint, validate_handle};
pub use error::ClientError;
