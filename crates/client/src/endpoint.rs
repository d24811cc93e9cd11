//! Handle validation and endpoint construction.

use crate::ClientError;
use url::Url;

/// Longest handle the upstream service accepts.
pub const MAX_HANDLE_LEN: usize = 15;

/// Validate a user handle.
///
/// Handles are 1-15 characters of ASCII letters, digits and underscores.
/// A leading `@` is not accepted; callers strip it.
pub fn validate_handle(handle: &str) -> Result<(), ClientError> {
    if handle.is_empty() {
        return Err(ClientError::InvalidHandle("handle cannot be empty".to_string()));
    }
    if handle.len() > MAX_HANDLE_LEN {
        return Err(ClientError::InvalidHandle(format!(
            "{handle}: {} chars (max {MAX_HANDLE_LEN})",
            handle.len()
        )));
    }
    if !handle.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ClientError::InvalidHandle(format!("{handle}: unexpected character")));
    }
    Ok(())
}

/// Join `path` onto a configured base URL.
///
/// The base may carry a path prefix (e.g. `https://host/api/`); a trailing
/// slash is tolerated. Only http and https are accepted.
pub fn join_endpoint(base: &str, path: &str) -> Result<Url, ClientError> {
    let trimmed = base.trim();
    if trimmed.is_empty() {
        return Err(ClientError::InvalidEndpoint("empty base URL".to_string()));
    }

    let mut url = Url::parse(trimmed).map_err(|e| ClientError::InvalidEndpoint(e.to_string()))?;

    match url.scheme() {
        "http" | "https" => {}
        scheme => return Err(ClientError::InvalidEndpoint(format!("unsupported scheme: {scheme}"))),
    }

    let joined = format!("{}/{}", url.path().trim_end_matches('/'), path.trim_start_matches('/'));
    url.set_path(&joined);
    url.set_query(None);
    url.set_fragment(None);

    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_handles() {
        for handle in ["jack", "a", "User_123", "fifteen_chars__"] {
            assert!(validate_handle(handle).is_ok(), "{handle} should be valid");
        }
    }

    #[test]
    fn test_invalid_handles() {
        for handle in ["", "@jack", "has space", "sixteen_chars___", "home/status"] {
            assert!(
                matches!(validate_handle(handle), Err(ClientError::InvalidHandle(_))),
                "{handle} should be rejected"
            );
        }
    }

    #[test]
    fn test_endpoint_join() {
        let url = join_endpoint("https://api.example.com", "lookup").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/lookup");

        let url = join_endpoint("https://api.example.com/v2/", "/submit").unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/v2/submit");
    }

    #[test]
    fn test_endpoint_drops_query_and_fragment() {
        let url = join_endpoint("http://localhost:8787/?x=1#top", "lookup").unwrap();
        assert_eq!(url.as_str(), "http://localhost:8787/lookup");
    }

    #[test]
    fn test_endpoint_rejects_bad_base() {
        assert!(matches!(join_endpoint("", "lookup"), Err(ClientError::InvalidEndpoint(_))));
        assert!(matches!(join_endpoint("ftp://example.com", "lookup"), Err(ClientError::InvalidEndpoint(_))));
        assert!(matches!(join_endpoint("not a url", "lookup"), Err(ClientError::InvalidEndpoint(_))));
    }
}
