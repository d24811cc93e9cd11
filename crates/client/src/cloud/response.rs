//! Cloud API response types and normalization.

use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;

/// Raw response from `GET /lookup`: handle -> location.
///
/// The service omits unknown handles, but `null`, empty strings and
/// non-string values are tolerated and treated as misses too.
#[derive(Debug, Deserialize)]
#[serde(transparent)]
pub struct LookupResponse(pub HashMap<String, Value>);

impl LookupResponse {
    /// Keep only usable locations for handles that were actually requested.
    pub fn into_hits(self, requested: &[String]) -> HashMap<String, String> {
        self.0
            .into_iter()
            .filter(|(handle, _)| requested.iter().any(|r| r == handle))
            .filter_map(|(handle, value)| match value {
                Value::String(location) if !location.trim().is_empty() => Some((handle, location)),
                _ => None,
            })
            .collect()
    }
}

/// Response from `POST /verify-license`.
#[derive(Debug, Deserialize)]
pub struct LicenseResponse {
    #[serde(default)]
    pub valid: bool,
}
