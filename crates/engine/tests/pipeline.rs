use std::sync::Arc;
use std::time::Duration;

use flagline_client::{CloudClient, CloudConfig, DirectConfig, HttpDirectLookup};
use flagline_core::{PendingUpload, StateDb};
use flagline_engine::{
    Error, FixedDistance, FlushOutcome, LocalCache, LocationResult, Resolver, Scheduler, SchedulerPolicy, UploadPolicy,
    UploadQueue,
};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{body_json, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn cloud_for(server: &MockServer) -> Arc<CloudClient> {
    let config = CloudConfig { timeout: Duration::from_secs(2), ..CloudConfig::new(server.uri()) };
    Arc::new(CloudClient::new(config).expect("cloud client builds"))
}

fn direct_for(server: &MockServer) -> Arc<HttpDirectLookup> {
    let config = DirectConfig {
        base_url: server.uri(),
        auth_token: None,
        timeout: Duration::from_secs(2),
        user_agent: "flagline-test".to_string(),
    };
    Arc::new(HttpDirectLookup::new(config).expect("direct client builds"))
}

fn manual_flush() -> UploadPolicy {
    UploadPolicy { flush_threshold: usize::MAX, watch_threshold: usize::MAX, ..UploadPolicy::default() }
}

#[tokio::test]
async fn rejected_submission_leaves_pending_unchanged() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .respond_with(ResponseTemplate::new(400))
        .expect(1)
        .mount(&server)
        .await;

    let db = StateDb::open_in_memory().await.unwrap();
    let uploads = UploadQueue::new(db.clone(), cloud_for(&server), manual_flush());
    uploads.enqueue("jack", "Japan").await.unwrap();
    uploads.enqueue("amy", "Canada").await.unwrap();

    let err = uploads.flush().await.unwrap_err();
    assert!(matches!(err, Error::Client(_)));

    let mut pending = db.pending_batch(50).await.unwrap();
    pending.sort_by(|a, b| a.username.cmp(&b.username));
    assert_eq!(pending, vec![PendingUpload::new("amy", "Canada"), PendingUpload::new("jack", "Japan")]);
}

#[tokio::test]
async fn confirmed_submission_clears_pending() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/submit"))
        .and(body_json(serde_json::json!({
            "users": [{ "username": "jack", "location": "Japan" }]
        })))
        .respond_with(ResponseTemplate::new(200))
        .expect(1)
        .mount(&server)
        .await;

    let db = StateDb::open_in_memory().await.unwrap();
    let uploads = UploadQueue::new(db.clone(), cloud_for(&server), manual_flush());
    uploads.enqueue("jack", "Japan").await.unwrap();

    assert_eq!(uploads.flush().await.unwrap(), FlushOutcome::Submitted { submitted: 1, remaining: 0 });
    assert_eq!(db.pending_count().await.unwrap(), 0);
}

#[tokio::test]
async fn lookup_resolves_through_direct_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/location"))
        .and(query_param("screen_name", "jack"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "location": "Japan",
            "userId": "12"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = StateDb::open_in_memory().await.unwrap();
    let cloud = cloud_for(&server);
    let cache = LocalCache::new(chrono::Duration::days(30));
    let uploads = UploadQueue::new(db.clone(), cloud.clone(), manual_flush());
    let resolver = Resolver::new(direct_for(&server), cloud, Duration::from_secs(5));
    let shutdown = CancellationToken::new();
    let scheduler = Scheduler::spawn(SchedulerPolicy::default(), resolver, cache.clone(), uploads, shutdown.clone());

    let result = scheduler.get_user_location("jack", Arc::new(FixedDistance(0.0))).await;
    assert_eq!(result, LocationResult::found("Japan", Some("12".to_string())));

    // Served from the cache; the mock expects exactly one request.
    let again = scheduler.get_user_location("jack", Arc::new(FixedDistance(0.0))).await;
    assert_eq!(again, result);
    assert!(cache.get("jack").await.is_some());

    shutdown.cancel();
}
