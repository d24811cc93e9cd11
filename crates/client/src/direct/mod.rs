//! Direct per-user location lookup.
//!
//! One request resolves one handle. The upstream enforces a per-minute rate
//! limit; a 429 is not an error here but an outcome the scheduler reacts to
//! (retry with backoff, collapse concurrency), so it is reported through
//! [`DirectOutcome::rate_limited`] together with the advertised reset time.

use crate::{ClientError, join_endpoint, validate_handle};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::header;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// Header carrying the unix second at which the rate-limit window resets.
pub const RATE_LIMIT_RESET_HEADER: &str = "x-rate-limit-reset";

/// Result of a single direct lookup.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DirectOutcome {
    pub location: Option<String>,
    pub user_id: Option<String>,
    /// The upstream answered 429.
    pub rate_limited: bool,
    /// Time until the rate-limit window resets, when advertised.
    pub reset_after: Option<Duration>,
}

impl DirectOutcome {
    pub fn found(location: impl Into<String>, user_id: Option<String>) -> Self {
        Self { location: Some(location.into()), user_id, ..Default::default() }
    }

    pub fn rate_limited(reset_after: Option<Duration>) -> Self {
        Self { rate_limited: true, reset_after, ..Default::default() }
    }
}

/// The external per-user lookup collaborator.
#[async_trait]
pub trait DirectLookup: Send + Sync {
    async fn lookup(&self, handle: &str) -> Result<DirectOutcome, ClientError>;
}

#[derive(Debug, Deserialize)]
struct DirectResponse {
    #[serde(default)]
    location: Option<String>,
    #[serde(default, alias = "userId")]
    user_id: Option<String>,
}

/// Parse an `x-rate-limit-reset` value into the remaining window length.
///
/// Returns `None` for values that are not a unix timestamp; a reset time in
/// the past yields a zero-length window.
pub fn reset_after_from_header(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let reset_secs: i64 = value.trim().parse().ok()?;
    let reset_at = DateTime::<Utc>::from_timestamp(reset_secs, 0)?;
    Some((reset_at - now).to_std().unwrap_or(Duration::ZERO))
}

/// Direct lookup configuration.
#[derive(Debug, Clone)]
pub struct DirectConfig {
    pub base_url: String,
    pub auth_token: Option<String>,
    pub timeout: Duration,
    pub user_agent: String,
}

impl DirectConfig {
    pub fn from_app(config: &flagline_core::AppConfig) -> Self {
        Self {
            base_url: config.lookup_base_url.clone(),
            auth_token: config.lookup_auth_token.clone(),
            timeout: config.direct_timeout(),
            user_agent: config.user_agent.clone(),
        }
    }
}

/// HTTP implementation of [`DirectLookup`].
///
/// Calls `GET {base}/location?screen_name=<handle>` and expects
/// `{ "location": string|null, "userId": string|null }`.
#[derive(Debug, Clone)]
pub struct HttpDirectLookup {
    http: reqwest::Client,
    url: url::Url,
    auth_token: Option<String>,
}

impl HttpDirectLookup {
    pub fn new(config: DirectConfig) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .map_err(|e| ClientError::Network(Arc::new(e)))?;

        Ok(Self { http, url: join_endpoint(&config.base_url, "location")?, auth_token: config.auth_token })
    }
}

#[async_trait]
impl DirectLookup for HttpDirectLookup {
    async fn lookup(&self, handle: &str) -> Result<DirectOutcome, ClientError> {
        validate_handle(handle)?;

        let mut request = self
            .http
            .get(self.url.clone())
            .header(header::ACCEPT, "application/json")
            .query(&[("screen_name", handle)]);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        tracing::debug!(handle, %status, "direct lookup response");

        if status == 429 {
            let reset_after = response
                .headers()
                .get(RATE_LIMIT_RESET_HEADER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| reset_after_from_header(v, Utc::now()));
            return Ok(DirectOutcome::rate_limited(reset_after));
        }

        if status == 404 {
            return Ok(DirectOutcome::default());
        }

        if !status.is_success() {
            return Err(ClientError::HttpError { status: status.as_u16() });
        }

        let bytes = response.bytes().await?;
        let parsed: DirectResponse = serde_json::from_slice(&bytes).map_err(|e| ClientError::Parse(e.to_string()))?;

        Ok(DirectOutcome {
            location: parsed.location.filter(|l| !l.trim().is_empty()),
            user_id: parsed.user_id.filter(|id| !id.is_empty()),
            ..Default::default()
        })
    }
}
