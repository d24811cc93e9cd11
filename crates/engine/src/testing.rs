//! In-process doubles for the network collaborators.

use async_trait::async_trait;
use flagline_client::{ClientError, CloudApi, DirectLookup, DirectOutcome};
use flagline_core::PendingUpload;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

type Respond = Box<dyn Fn(&str) -> Option<DirectOutcome> + Send + Sync>;

/// Direct lookup answering from a closure; `None` never completes.
pub struct FakeDirect {
    respond: Respond,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeDirect {
    pub fn new(respond: impl Fn(&str) -> Option<DirectOutcome> + Send + Sync + 'static) -> Self {
        Self { respond: Box::new(respond), delay: Duration::ZERO, calls: Mutex::new(Vec::new()) }
    }

    /// Answer only after `delay`, keeping the call in flight meanwhile.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn found(location: &'static str) -> Self {
        Self::new(move |_| Some(DirectOutcome::found(location, None)))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self, handle: &str) -> usize {
        self.calls.lock().unwrap().iter().filter(|h| h.as_str() == handle).count()
    }
}

#[async_trait]
impl DirectLookup for FakeDirect {
    async fn lookup(&self, handle: &str) -> Result<DirectOutcome, ClientError> {
        self.calls.lock().unwrap().push(handle.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        match (self.respond)(handle) {
            Some(outcome) => Ok(outcome),
            None => std::future::pending().await,
        }
    }
}

/// Cloud service double with canned hits and optional failures.
#[derive(Default)]
pub struct FakeCloud {
    pub hits: HashMap<String, String>,
    pub fail_lookup: bool,
    pub fail_submit: bool,
    pub license: Option<bool>,
    pub gate_submit: bool,
    pub submit_started: Notify,
    pub submit_release: Notify,
    pub lookups: Mutex<Vec<Vec<String>>>,
    pub submissions: Mutex<Vec<Vec<PendingUpload>>>,
}

impl FakeCloud {
    pub fn with_hits(hits: &[(&str, &str)]) -> Self {
        Self { hits: hits.iter().map(|(h, l)| (h.to_string(), l.to_string())).collect(), ..Default::default() }
    }

    pub fn lookups(&self) -> Vec<Vec<String>> {
        self.lookups.lock().unwrap().clone()
    }

    pub fn submissions(&self) -> Vec<Vec<PendingUpload>> {
        self.submissions.lock().unwrap().clone()
    }
}

#[async_trait]
impl CloudApi for FakeCloud {
    async fn lookup(&self, handles: &[String]) -> Result<HashMap<String, String>, ClientError> {
        self.lookups.lock().unwrap().push(handles.to_vec());
        if self.fail_lookup {
            return Err(ClientError::HttpError { status: 503 });
        }
        Ok(handles.iter().filter_map(|h| self.hits.get(h).map(|l| (h.clone(), l.clone()))).collect())
    }

    async fn submit(&self, users: &[PendingUpload]) -> Result<(), ClientError> {
        self.submissions.lock().unwrap().push(users.to_vec());
        if self.gate_submit {
            self.submit_started.notify_one();
            self.submit_release.notified().await;
        }
        if self.fail_submit {
            return Err(ClientError::HttpError { status: 400 });
        }
        Ok(())
    }

    async fn verify_license(&self, _license_key: &str) -> Result<bool, ClientError> {
        self.license.ok_or(ClientError::Timeout)
    }
}
