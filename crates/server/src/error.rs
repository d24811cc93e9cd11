//! Structured errors for the flagline driver.
//!
//! Every error is reported on stdout as `{"error": "<CODE>: <message>"}`;
//! none of them stop the driver.

use crate::protocol::Response;

#[derive(Debug, thiserror::Error)]
pub enum DriverError {
    /// The line is not a valid request.
    #[error("INVALID_REQUEST: {0}")]
    InvalidRequest(String),

    /// An on-demand upload flush failed.
    #[error("FLUSH_FAILED: {0}")]
    FlushFailed(String),

    /// The scheduler has already stopped.
    #[error("UNAVAILABLE: {0}")]
    Unavailable(String),
}

impl From<DriverError> for Response {
    fn from(err: DriverError) -> Self {
        Response::Error { error: err.to_string() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_codes() {
        let response: Response = DriverError::InvalidRequest("missing field `handle`".into()).into();
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            serde_json::json!({ "error": "INVALID_REQUEST: missing field `handle`" })
        );
    }
}
