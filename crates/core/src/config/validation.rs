//! Range and format checks run on a freshly loaded `AppConfig`.

use crate::config::AppConfig;
use thiserror::Error;

/// Why a configuration could not be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },
}

const MIN_TIMEOUT_MS: u64 = 100;
/// Ten years; keeps `now + ttl` far from chrono's representable range.
pub const MAX_CACHE_TTL_DAYS: u32 = 3650;
const MAX_TIMEOUT_MS: u64 = 300_000;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, value: u64) -> Result<(), ConfigError> {
    if value < MIN_TIMEOUT_MS {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if value > MAX_TIMEOUT_MS {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

fn check_url(field: &str, value: &str) -> Result<(), ConfigError> {
    let parsed = url::Url::parse(value).map_err(|e| invalid(field, &e.to_string()))?;
    if !matches!(parsed.scheme(), "http" | "https") {
        return Err(invalid(field, "scheme must be http or https"));
    }
    Ok(())
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - a base URL does not parse or is not http(s)
    /// - a network timeout is outside [100ms, 5min]
    /// - a queue, batch or concurrency size is 0 or out of range
    /// - `user_agent` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        check_url("cloud_base_url", &self.cloud_base_url)?;
        check_url("lookup_base_url", &self.lookup_base_url)?;

        check_timeout("cloud_timeout_ms", self.cloud_timeout_ms)?;
        check_timeout("direct_timeout_ms", self.direct_timeout_ms)?;

        if self.max_queue_size == 0 {
            return Err(invalid("max_queue_size", "must be greater than 0"));
        }
        if self.max_concurrent_requests == 0 || self.max_concurrent_requests > 64 {
            return Err(invalid("max_concurrent_requests", "must be between 1 and 64"));
        }
        if self.batch_size == 0 || self.batch_size > 50 {
            return Err(invalid("batch_size", "must be between 1 and 50"));
        }
        if self.queue_item_timeout_ms == 0 {
            return Err(invalid("queue_item_timeout_ms", "must be greater than 0"));
        }
        if self.cache_ttl_days == 0 || self.cache_ttl_days > MAX_CACHE_TTL_DAYS {
            return Err(invalid("cache_ttl_days", "must be between 1 and 3650"));
        }
        if self.blocked_countries.iter().any(|c| c.trim().is_empty()) {
            return Err(invalid("blocked_countries", "entries must not be blank"));
        }
        if !self.fast_scroll_threshold.is_finite() || self.fast_scroll_threshold < 0.0 {
            return Err(invalid("fast_scroll_threshold", "must be a non-negative number"));
        }
        if self.cache_persist_interval_ms == 0 || self.upload_interval_ms == 0 {
            return Err(invalid("cache_persist_interval_ms", "intervals must be greater than 0"));
        }

        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        if self.cache_persist_debounce_ms >= self.cache_persist_interval_ms {
            tracing::warn!(
                debounce_ms = self.cache_persist_debounce_ms,
                interval_ms = self.cache_persist_interval_ms,
                "cache persist debounce is not shorter than the periodic persist interval"
            );
        }

        Ok(())
    }
}
