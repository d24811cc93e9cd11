//! Engine error type.

use flagline_client::ClientError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Store(#[from] flagline_core::Error),

    #[error(transparent)]
    Client(#[from] ClientError),

    /// The scheduling loop has stopped.
    #[error("scheduler is no longer running")]
    SchedulerClosed,
}
