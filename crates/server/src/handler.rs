//! Request handling for the line driver.
//!
//! Lookups run as independent tasks so a slow one never holds up the
//! requests behind it; every other request is answered inline.

use crate::error::DriverError;
use crate::protocol::{Request, Response};
use crate::viewport::{PageAnchor, Viewport};
use flagline_engine::{BlockList, SchedulerHandle, UploadQueue};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;

pub struct Driver {
    scheduler: SchedulerHandle,
    uploads: UploadQueue,
    block_list: Arc<BlockList>,
    viewport: Arc<Viewport>,
    out: mpsc::UnboundedSender<Response>,
    lookups: JoinSet<()>,
}

impl Driver {
    pub fn new(
        scheduler: SchedulerHandle, uploads: UploadQueue, block_list: BlockList, out: mpsc::UnboundedSender<Response>,
    ) -> Self {
        Self {
            scheduler,
            uploads,
            block_list: Arc::new(block_list),
            viewport: Arc::new(Viewport::default()),
            out,
            lookups: JoinSet::new(),
        }
    }

    /// Handle one input line. Blank lines are ignored.
    pub async fn handle_line(&mut self, line: &str) {
        while self.lookups.try_join_next().is_some() {}

        let line = line.trim();
        if line.is_empty() {
            return;
        }
        match serde_json::from_str::<Request>(line) {
            Ok(request) => self.handle(request).await,
            Err(e) => self.emit(DriverError::InvalidRequest(e.to_string()).into()),
        }
    }

    async fn handle(&mut self, request: Request) {
        match request {
            Request::Lookup { handle, top, height } => self.lookup(handle, top, height).await,
            Request::Scroll { y, viewport_height } => {
                self.viewport.update(y, viewport_height);
                self.scheduler.record_scroll(y);
            }
            Request::Navigate => self.scheduler.navigate(),
            Request::Idle { loaded_ahead } => {
                let idle_load = self.scheduler.idle_load_due(loaded_ahead).await;
                self.emit(Response::Idle { idle_load });
            }
            Request::Flush => {
                let response = match self.uploads.flush().await {
                    Ok(flush) => Response::Flush { flush },
                    Err(e) => DriverError::FlushFailed(e.to_string()).into(),
                };
                self.emit(response);
            }
            Request::Stats => {
                let response = match self.scheduler.snapshot().await {
                    Ok(stats) => Response::Stats { stats },
                    Err(e) => DriverError::Unavailable(e.to_string()).into(),
                };
                self.emit(response);
            }
        }
    }

    async fn lookup(&mut self, handle: String, top: f64, height: f64) {
        // Loads past the warm-up only feed the burst counter; every lookup is queued.
        if !self.scheduler.note_discovered().await {
            self.scheduler.track_loaded();
        }

        let anchor = Arc::new(PageAnchor::new(self.viewport.clone(), top, height));
        let scheduler = self.scheduler.clone();
        let block_list = self.block_list.clone();
        let out = self.out.clone();
        self.lookups.spawn(async move {
            let result = scheduler.get_user_location(&handle, anchor).await;
            let verdict = block_list.verdict(&result);
            if verdict.blocked {
                tracing::info!(%handle, mute = verdict.mute, "account hidden by location");
            }
            let _ = out.send(Response::lookup(handle, result, verdict));
        });
    }

    fn emit(&self, response: Response) {
        if self.out.send(response).is_err() {
            tracing::warn!("output closed; dropping response");
        }
    }

    /// Wait for every outstanding lookup to answer.
    pub async fn finish(mut self) {
        let outstanding = self.lookups.len();
        if outstanding > 0 {
            tracing::info!(outstanding, "waiting for outstanding lookups");
        }
        while let Some(joined) = self.lookups.join_next().await {
            if let Err(e) = joined {
                tracing::warn!(error = %e, "lookup task failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use flagline_client::{ClientError, CloudApi, DirectLookup, DirectOutcome};
    use flagline_core::{PendingUpload, StateDb};
    use flagline_engine::{CachePolicy, LocalCache, Resolver, Scheduler, SchedulerPolicy, UploadPolicy};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct Japan;

    #[async_trait]
    impl DirectLookup for Japan {
        async fn lookup(&self, _handle: &str) -> Result<DirectOutcome, ClientError> {
            Ok(DirectOutcome::found("Japan", None))
        }
    }

    struct Offline;

    #[async_trait]
    impl CloudApi for Offline {
        async fn lookup(&self, _handles: &[String]) -> Result<HashMap<String, String>, ClientError> {
            Err(ClientError::Timeout)
        }

        async fn submit(&self, _users: &[PendingUpload]) -> Result<(), ClientError> {
            Err(ClientError::Timeout)
        }

        async fn verify_license(&self, _license_key: &str) -> Result<bool, ClientError> {
            Err(ClientError::Timeout)
        }
    }

    async fn driver() -> (Driver, mpsc::UnboundedReceiver<Response>) {
        driver_with(BlockList::default()).await
    }

    async fn driver_with(block_list: BlockList) -> (Driver, mpsc::UnboundedReceiver<Response>) {
        let db = StateDb::open_in_memory().await.unwrap();
        let cloud: Arc<dyn CloudApi> = Arc::new(Offline);
        let uploads = UploadQueue::new(db, cloud.clone(), UploadPolicy::default());
        let resolver = Resolver::new(Arc::new(Japan), cloud, Duration::from_secs(5));
        let cache = LocalCache::new(CachePolicy::default().ttl);
        let scheduler =
            Scheduler::spawn(SchedulerPolicy::default(), resolver, cache, uploads.clone(), CancellationToken::new());
        let (out, rx) = mpsc::unbounded_channel();
        (Driver::new(scheduler, uploads, block_list, out), rx)
    }

    #[tokio::test]
    async fn test_lookup_answers_on_output() {
        let (mut driver, mut rx) = driver().await;
        driver.handle_line(r#"{"op":"lookup","handle":"jack","top":100,"height":40}"#).await;
        driver.finish().await;

        assert_eq!(
            rx.recv().await.unwrap(),
            Response::Lookup {
                handle: "jack".into(),
                location: Some("Japan".into()),
                user_id: None,
                blocked: false,
                mute: false
            }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lookups_past_burst_are_still_answered() {
        let (mut driver, mut rx) = driver().await;
        for i in 0..80 {
            driver.handle_line(&format!(r#"{{"op":"lookup","handle":"user{i}"}}"#)).await;
        }
        driver.finish().await;

        let mut answered = 0;
        while let Ok(response) = rx.try_recv() {
            match response {
                Response::Lookup { location, .. } => assert_eq!(location.as_deref(), Some("Japan")),
                other => panic!("unexpected response: {other:?}"),
            }
            answered += 1;
        }
        assert_eq!(answered, 80);
    }

    #[tokio::test]
    async fn test_licensed_block_list_marks_lookup() {
        let (mut driver, mut rx) = driver_with(BlockList::new(true, ["japan"], true)).await;
        driver.handle_line(r#"{"op":"lookup","handle":"jack"}"#).await;
        driver.finish().await;

        match rx.recv().await.unwrap() {
            Response::Lookup { blocked, mute, .. } => assert!(blocked && mute),
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unlicensed_block_list_never_blocks() {
        let (mut driver, mut rx) = driver_with(BlockList::new(false, ["Japan"], true)).await;
        driver.handle_line(r#"{"op":"lookup","handle":"jack"}"#).await;
        driver.finish().await;

        match rx.recv().await.unwrap() {
            Response::Lookup { location, blocked, mute, .. } => {
                assert_eq!(location.as_deref(), Some("Japan"));
                assert!(!blocked && !mute);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_malformed_line_reports_error() {
        let (mut driver, mut rx) = driver().await;
        driver.handle_line("{not json").await;
        driver.handle_line("   ").await;

        match rx.recv().await.unwrap() {
            Response::Error { error } => assert!(error.starts_with("INVALID_REQUEST")),
            other => panic!("unexpected response: {other:?}"),
        }
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_flush_failure_is_reported() {
        let (mut driver, mut rx) = driver().await;
        driver.handle_line(r#"{"op":"lookup","handle":"jack"}"#).await;
        let _ = rx.recv().await.unwrap();

        // The upload is recorded off the lookup path; wait for it to land.
        let mut failed = false;
        for _ in 0..50 {
            driver.handle_line(r#"{"op":"flush"}"#).await;
            match rx.recv().await.unwrap() {
                Response::Error { error } => {
                    assert!(error.starts_with("FLUSH_FAILED"));
                    failed = true;
                    break;
                }
                Response::Flush { .. } => tokio::time::sleep(Duration::from_millis(10)).await,
                other => panic!("unexpected response: {other:?}"),
            }
        }
        assert!(failed);
    }

    #[tokio::test]
    async fn test_stats_reports_snapshot() {
        let (mut driver, mut rx) = driver().await;
        driver.handle_line(r#"{"op":"scroll","y":0,"viewport_height":900}"#).await;
        driver.handle_line(r#"{"op":"stats"}"#).await;

        match rx.recv().await.unwrap() {
            Response::Stats { stats } => {
                assert_eq!(stats.total_processed, 0);
                assert!(stats.initial_load);
            }
            other => panic!("unexpected response: {other:?}"),
        }
    }
}
