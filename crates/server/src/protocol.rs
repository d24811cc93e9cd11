//! Line protocol spoken on stdin/stdout.
//!
//! Requests are single JSON objects tagged by `op`. Responses are single
//! JSON objects whose shape identifies them; lookup answers arrive in
//! completion order, not request order.

use flagline_engine::{FlushOutcome, LocationResult, SchedulerSnapshot, Verdict};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Request {
    /// Resolve a handle whose element sits at `top` (document px) with the
    /// given height.
    Lookup {
        handle: String,
        #[serde(default)]
        top: f64,
        #[serde(default)]
        height: f64,
    },
    /// New scroll position; `viewport_height` is kept when omitted.
    Scroll {
        y: f64,
        #[serde(default)]
        viewport_height: Option<f64>,
    },
    Navigate,
    /// Ask whether another item ahead of the viewport should load.
    Idle {
        #[serde(default)]
        loaded_ahead: usize,
    },
    Flush,
    Stats,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Response {
    /// `blocked` and `mute` are only ever set for a licensed session.
    Lookup { handle: String, location: Option<String>, user_id: Option<String>, blocked: bool, mute: bool },
    Idle { idle_load: bool },
    Flush { flush: FlushOutcome },
    Stats { stats: SchedulerSnapshot },
    Error { error: String },
}

impl Response {
    pub fn lookup(handle: String, result: LocationResult, verdict: Verdict) -> Self {
        Response::Lookup {
            handle,
            location: result.location,
            user_id: result.user_id,
            blocked: verdict.blocked,
            mute: verdict.mute,
        }
    }
}
