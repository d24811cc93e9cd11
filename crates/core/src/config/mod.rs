//! Runtime settings for the lookup core.
//!
//! Everything has a working default; a TOML file named by
//! `FLAGLINE_CONFIG_FILE` and `FLAGLINE_*` environment variables override it,
//! the environment winning.

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

mod validation;

pub use validation::ConfigError;

/// Application configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (FLAGLINE_*)
/// 2. TOML config file (if FLAGLINE_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the SQLite state database.
    ///
    /// Set via FLAGLINE_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Base URL of the shared cloud location service.
    ///
    /// Set via FLAGLINE_CLOUD_BASE_URL environment variable.
    #[serde(default = "default_cloud_base_url")]
    pub cloud_base_url: String,

    /// Base URL of the direct per-user lookup endpoint.
    ///
    /// Set via FLAGLINE_LOOKUP_BASE_URL environment variable.
    #[serde(default = "default_lookup_base_url")]
    pub lookup_base_url: String,

    /// Bearer token forwarded to the direct lookup endpoint.
    #[serde(default)]
    pub lookup_auth_token: Option<String>,

    /// License key verified against the cloud service at startup.
    ///
    /// Set via FLAGLINE_LICENSE_KEY environment variable.
    #[serde(default)]
    pub license_key: Option<String>,

    /// User-Agent string for HTTP requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Cloud HTTP timeout in milliseconds.
    #[serde(default = "default_ten_seconds")]
    pub cloud_timeout_ms: u64,

    /// Hard upper bound on a single direct lookup in milliseconds.
    #[serde(default = "default_ten_seconds")]
    pub direct_timeout_ms: u64,

    /// Maximum number of items waiting in the request queue.
    #[serde(default = "default_max_queue_size")]
    pub max_queue_size: usize,

    /// Age after which a queued item is purged, in milliseconds.
    #[serde(default = "default_queue_item_timeout_ms")]
    pub queue_item_timeout_ms: u64,

    /// Number of network calls allowed in flight at once.
    #[serde(default = "default_max_concurrent_requests")]
    pub max_concurrent_requests: usize,

    /// Number of handles sent in one cloud lookup.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Resolved-item count below which the direct strategy is forced.
    #[serde(default = "default_warmup_items")]
    pub warmup_items: u64,

    /// Scroll velocity (px/s) above which the direct strategy is forced.
    #[serde(default = "default_fast_scroll_threshold")]
    pub fast_scroll_threshold: f64,

    /// Days a resolved location stays cached.
    #[serde(default = "default_cache_ttl_days")]
    pub cache_ttl_days: u32,

    /// Debounce window for cache persistence in milliseconds.
    #[serde(default = "default_cache_persist_debounce_ms")]
    pub cache_persist_debounce_ms: u64,

    /// Interval of the unconditional cache persist in milliseconds.
    #[serde(default = "default_cache_persist_interval_ms")]
    pub cache_persist_interval_ms: u64,

    /// Interval of the periodic upload flush in milliseconds.
    #[serde(default = "default_upload_interval_ms")]
    pub upload_interval_ms: u64,

    /// Delay of the first upload flush after startup in milliseconds.
    #[serde(default = "default_ten_seconds")]
    pub upload_kick_delay_ms: u64,

    /// Locations whose accounts are hidden for licensed users. Matched
    /// case-insensitively against the resolved location.
    ///
    /// Set via FLAGLINE_BLOCKED_COUNTRIES, e.g. `["Atlantis","Narnia"]`.
    #[serde(default)]
    pub blocked_countries: Vec<String>,

    /// Also mute hidden accounts.
    #[serde(default)]
    pub auto_mute: bool,
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./flagline-state.sqlite")
}

fn default_cloud_base_url() -> String {
    "https://tweet-sanitizer-api.tweet-sanitizer.workers.dev".into()
}

fn default_lookup_base_url() -> String {
    "http://127.0.0.1:8788".into()
}

fn default_user_agent() -> String {
    "flagline/0.1".into()
}

fn default_ten_seconds() -> u64 {
    10_000
}

fn default_max_queue_size() -> usize {
    150
}

fn default_queue_item_timeout_ms() -> u64 {
    30_000
}

fn default_max_concurrent_requests() -> usize {
    5
}

fn default_batch_size() -> usize {
    5
}

fn default_warmup_items() -> u64 {
    30
}

fn default_fast_scroll_threshold() -> f64 {
    1500.0
}

fn default_cache_ttl_days() -> u32 {
    30
}

fn default_cache_persist_debounce_ms() -> u64 {
    5_000
}

fn default_cache_persist_interval_ms() -> u64 {
    30_000
}

fn default_upload_interval_ms() -> u64 {
    30 * 60 * 1000
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
            cloud_base_url: default_cloud_base_url(),
            lookup_base_url: default_lookup_base_url(),
            lookup_auth_token: None,
            license_key: None,
            user_agent: default_user_agent(),
            cloud_timeout_ms: default_ten_seconds(),
            direct_timeout_ms: default_ten_seconds(),
            max_queue_size: default_max_queue_size(),
            queue_item_timeout_ms: default_queue_item_timeout_ms(),
            max_concurrent_requests: default_max_concurrent_requests(),
            batch_size: default_batch_size(),
            warmup_items: default_warmup_items(),
            fast_scroll_threshold: default_fast_scroll_threshold(),
            cache_ttl_days: default_cache_ttl_days(),
            cache_persist_debounce_ms: default_cache_persist_debounce_ms(),
            cache_persist_interval_ms: default_cache_persist_interval_ms(),
            upload_interval_ms: default_upload_interval_ms(),
            upload_kick_delay_ms: default_ten_seconds(),
            blocked_countries: Vec::new(),
            auto_mute: false,
        }
    }
}

impl AppConfig {
    /// Cloud request timeout as Duration for use with reqwest.
    pub fn cloud_timeout(&self) -> Duration {
        Duration::from_millis(self.cloud_timeout_ms)
    }

    /// Hard bound on one direct lookup.
    pub fn direct_timeout(&self) -> Duration {
        Duration::from_millis(self.direct_timeout_ms)
    }

    pub fn queue_item_timeout(&self) -> Duration {
        Duration::from_millis(self.queue_item_timeout_ms)
    }

    /// Cache entry lifetime.
    pub fn cache_ttl(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.cache_ttl_days))
    }

    pub fn cache_persist_debounce(&self) -> Duration {
        Duration::from_millis(self.cache_persist_debounce_ms)
    }

    pub fn cache_persist_interval(&self) -> Duration {
        Duration::from_millis(self.cache_persist_interval_ms)
    }

    pub fn upload_interval(&self) -> Duration {
        Duration::from_millis(self.upload_interval_ms)
    }

    pub fn upload_kick_delay(&self) -> Duration {
        Duration::from_millis(self.upload_kick_delay_ms)
    }

    /// Merge defaults, the optional TOML file and the environment, then
    /// validate the result.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("FLAGLINE_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("FLAGLINE_")
                .ignore(&["CONFIG_FILE"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// License key, if one was configured and is non-blank.
    pub fn license_key(&self) -> Option<&str> {
        self.license_key.as_deref().map(str::trim).filter(|k| !k.is_empty())
    }
}
