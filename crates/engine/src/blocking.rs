//! Hiding and muting accounts by location.
//!
//! A licensed feature: without a valid license every verdict is "show".
//! Mapping a location to a flag and issuing the mute request stay with the
//! caller; this only decides.

use crate::resolver::LocationResult;
use flagline_core::AppConfig;
use serde::Serialize;
use std::collections::HashSet;

/// What to do with an account whose location was just resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Verdict {
    pub blocked: bool,
    /// Only ever set together with `blocked`.
    pub mute: bool,
}

#[derive(Debug, Clone, Default)]
pub struct BlockList {
    licensed: bool,
    countries: HashSet<String>,
    auto_mute: bool,
}

impl BlockList {
    pub fn new<I, S>(licensed: bool, countries: I, auto_mute: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let countries = countries.into_iter().map(|c| normalize(c.as_ref())).filter(|c| !c.is_empty()).collect();
        Self { licensed, countries, auto_mute }
    }

    pub fn from_app(config: &AppConfig, licensed: bool) -> Self {
        let list = Self::new(licensed, &config.blocked_countries, config.auto_mute);
        if !licensed && !list.countries.is_empty() {
            tracing::info!(countries = list.countries.len(), "blocked countries configured but not licensed; ignoring");
        }
        list
    }

    pub fn is_active(&self) -> bool {
        self.licensed && !self.countries.is_empty()
    }

    pub fn verdict(&self, result: &LocationResult) -> Verdict {
        if !self.licensed {
            return Verdict::default();
        }
        let blocked = result.location.as_deref().is_some_and(|location| self.countries.contains(&normalize(location)));
        Verdict { blocked, mute: blocked && self.auto_mute }
    }
}

fn normalize(location: &str) -> String {
    location.trim().to_lowercase()
}
