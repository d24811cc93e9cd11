//! Client error types.

use std::sync::Arc;

/// Errors from the cloud and direct lookup clients.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Handle is empty or contains characters a handle cannot have.
    #[error("invalid handle: {0}")]
    InvalidHandle(String),

    /// Request rejected before it was sent.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Base URL could not be turned into an endpoint.
    #[error("invalid endpoint: {0}")]
    InvalidEndpoint(String),

    /// Rate limited by the remote service.
    #[error("rate limited: too many requests")]
    RateLimited,

    /// HTTP error response.
    #[error("HTTP error: {status}")]
    HttpError { status: u16 },

    /// Request timeout.
    #[error("request timeout")]
    Timeout,

    /// Network error.
    #[error("network error: {0}")]
    Network(Arc<reqwest::Error>),

    /// Response parse error.
    #[error("parse error: {0}")]
    Parse(String),
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() { ClientError::Timeout } else { ClientError::Network(Arc::new(err)) }
    }
}

impl ClientError {
    /// Whether retrying the same request later could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::RateLimited | ClientError::Timeout | ClientError::Network(_) => true,
            ClientError::HttpError { status } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClientError::InvalidHandle("bad handle!".to_string());
        assert!(err.to_string().contains("invalid handle"));

        let err = ClientError::HttpError { status: 400 };
        assert_eq!(err.to_string(), "HTTP error: 400");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ClientError::RateLimited.is_transient());
        assert!(ClientError::Timeout.is_transient());
        assert!(ClientError::HttpError { status: 503 }.is_transient());
        assert!(!ClientError::HttpError { status: 400 }.is_transient());
        assert!(!ClientError::Parse("x".into()).is_transient());
    }
}
