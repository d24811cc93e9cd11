//! Shared cloud location service client.
//!
//! ### Endpoints
//!
//! - `GET /lookup?users=a,b,c` -> `{ "a": "Japan", ... }`; absent keys are misses.
//! - `POST /submit` with `{ "users": [{ "username", "location" }] }`, at most 50 entries.
//! - `POST /verify-license` with `{ "licenseKey" }` -> `{ "valid": bool }`.
//!
//! Cloud hits cost nothing against the upstream per-user rate limit, so the
//! scheduler prefers this path once the initial page population is done.

pub mod request;
pub mod response;

pub use request::{LicenseRequest, MAX_SUBMIT_BATCH, SubmitRequest};
pub use response::{LicenseResponse, LookupResponse};

use crate::{ClientError, join_endpoint, validate_handle};
use async_trait::async_trait;
use flagline_core::PendingUpload;
use reqwest::header;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default user agent.
const DEFAULT_USER_AGENT: &str = "flagline/0.1";

/// Operations the lookup core needs from the cloud service.
#[async_trait]
pub trait CloudApi: Send + Sync {
    /// Batch lookup; the map holds only the handles the cloud knows.
    async fn lookup(&self, handles: &[String]) -> Result<HashMap<String, String>, ClientError>;

    /// Submit newly discovered locations. `Ok` means the service confirmed them.
    async fn submit(&self, users: &[PendingUpload]) -> Result<(), ClientError>;

    async fn verify_license(&self, license_key: &str) -> Result<bool, ClientError>;
}

/// Cloud client configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    pub base_url: String,
    /// Request timeout (default: 10s).
    pub timeout: Duration,
    pub user_agent: String,
}

impl CloudConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), timeout: DEFAULT_TIMEOUT, user_agent: DEFAULT_USER_AGENT.to_string() }
    }

    pub fn from_app(config: &flagline_core::AppConfig) -> Self {
        Self {
            base_url: config.cloud_base_url.clone(),
            timeout: config.cloud_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// HTTP client for the cloud service.
#[derive(Debug, Clone)]
pub struct CloudClient {
    http: reqwest::Client,
    lookup_url: url::Url,
    submit_url: url::Url,
    license_url: url::Url,
}

impl CloudClient {
    /// Create a new cloud client; endpoint URLs are resolved up front.
    pub fn new(config: CloudConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::Network(Arc::new(e)))?;

        Ok(Self {
            http,
            lookup_url: join_endpoint(&config.base_url, "lookup")?,
            submit_url: join_endpoint(&config.base_url, "submit")?,
            license_url: join_endpoint(&config.base_url, "verify-license")?,
        })
    }

    fn check_status(status: reqwest::StatusCode) -> Result<(), ClientError> {
        if status == 429 {
            return Err(ClientError::RateLimited);
        }
        if !status.is_success() {
            return Err(ClientError::HttpError { status: status.as_u16() });
        }
        Ok(())
    }
}

#[async_trait]
impl CloudApi for CloudClient {
    async fn lookup(&self, handles: &[String]) -> Result<HashMap<String, String>, ClientError> {
        if handles.is_empty() {
            return Ok(HashMap::new());
        }
        for handle in handles {
            validate_handle(handle)?;
        }

        let start = Instant::now();
        let users = handles.join(",");
        tracing::debug!(count = handles.len(), "cloud lookup: users={}", users);

        let response = self
            .http
            .get(self.lookup_url.clone())
            .header(header::ACCEPT, "application/json")
            .query(&[("users", users.as_str())])
            .send()
            .await?;

        Self::check_status(response.status())?;

        let bytes = response.bytes().await?;
        let raw: LookupResponse = serde_json::from_slice(&bytes).map_err(|e| ClientError::Parse(e.to_string()))?;
        let hits = raw.into_hits(handles);

        tracing::debug!(
            requested = handles.len(),
            hits = hits.len(),
            "cloud lookup completed in {:?}",
            start.elapsed()
        );

        Ok(hits)
    }

    async fn submit(&self, users: &[PendingUpload]) -> Result<(), ClientError> {
        let body = SubmitRequest { users };
        body.validate()?;

        let response = self
            .http
            .post(self.submit_url.clone())
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!(count = users.len(), %status, "cloud submit response");
        Self::check_status(status)
    }

    async fn verify_license(&self, license_key: &str) -> Result<bool, ClientError> {
        if license_key.trim().is_empty() {
            return Err(ClientError::InvalidInput("license key is empty".to_string()));
        }

        let response = self
            .http
            .post(self.license_url.clone())
            .json(&LicenseRequest { license_key })
            .send()
            .await?;

        Self::check_status(response.status())?;

        let bytes = response.bytes().await?;
        let parsed: LicenseResponse = serde_json::from_slice(&bytes).map_err(|e| ClientError::Parse(e.to_string()))?;
        Ok(parsed.valid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = CloudConfig::new("https://cloud.example.com");
        assert_eq!(config.timeout, Duration::from_secs(10));
        assert_eq!(config.user_agent, "flagline/0.1");
    }

    #[test]
    fn test_config_from_app() {
        let app = flagline_core::AppConfig { cloud_timeout_ms: 2_500, ..Default::default() };
        let config = CloudConfig::from_app(&app);
        assert_eq!(config.base_url, app.cloud_base_url);
        assert_eq!(config.timeout, Duration::from_millis(2_500));
    }

    #[test]
    fn test_client_resolves_endpoints() {
        let client = CloudClient::new(CloudConfig::new("https://cloud.example.com/api/")).unwrap();
        assert_eq!(client.lookup_url.as_str(), "https://cloud.example.com/api/lookup");
        assert_eq!(client.submit_url.as_str(), "https://cloud.example.com/api/submit");
        assert_eq!(client.license_url.as_str(), "https://cloud.example.com/api/verify-license");
    }

    #[test]
    fn test_client_rejects_bad_base() {
        let result = CloudClient::new(CloudConfig::new("ftp://cloud.example.com"));
        assert!(matches!(result, Err(ClientError::InvalidEndpoint(_))));
    }

    #[tokio::test]
    async fn test_lookup_rejects_invalid_handle_before_sending() {
        let client = CloudClient::new(CloudConfig::new("http://127.0.0.1:9")).unwrap();
        let result = client.lookup(&["ok".to_string(), "not ok".to_string()]).await;
        assert!(matches!(result, Err(ClientError::InvalidHandle(_))));
    }

    #[tokio::test]
    async fn test_lookup_empty_is_noop() {
        let client = CloudClient::new(CloudConfig::new("http://127.0.0.1:9")).unwrap();
        assert!(client.lookup(&[]).await.unwrap().is_empty());
    }
}
