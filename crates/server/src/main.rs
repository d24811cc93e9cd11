//! flagline driver entry point.
//!
//! Boots the lookup core and speaks a JSON-lines protocol: requests on
//! stdin, responses on stdout. Logging goes to stderr to keep stdout clean
//! for the protocol.

use anyhow::Result;
use flagline_client::{CloudApi, CloudClient, CloudConfig, DirectConfig, DirectLookup, HttpDirectLookup};
use flagline_core::{AppConfig, StateDb};
use flagline_engine::license::check_license;
use flagline_engine::{
    BlockList, CachePolicy, LocalCache, Resolver, Scheduler, SchedulerPolicy, UploadPolicy, UploadQueue,
};
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod protocol;
mod viewport;

use handler::Driver;
use protocol::Response;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(
        db_path = %config.db_path.display(),
        cloud = %config.cloud_base_url,
        lookup = %config.lookup_base_url,
        "starting flagline"
    );

    let db = StateDb::open(&config.db_path).await?;
    let cloud: Arc<dyn CloudApi> = Arc::new(CloudClient::new(CloudConfig::from_app(&config))?);
    let direct: Arc<dyn DirectLookup> = Arc::new(HttpDirectLookup::new(DirectConfig::from_app(&config))?);
    let shutdown = CancellationToken::new();

    let licensed = check_license(cloud.as_ref(), &db, config.license_key()).await;
    tracing::info!(licensed, "license status");

    let cache_policy = CachePolicy::from_app(&config);
    let cache = LocalCache::load(&db, cache_policy.ttl).await;
    let persister = cache.spawn_persister(db.clone(), &cache_policy, shutdown.clone());

    let uploads = UploadQueue::new(db.clone(), cloud.clone(), UploadPolicy::from_app(&config));
    let flusher = uploads.spawn_flusher(shutdown.clone());

    let resolver = Resolver::new(direct, cloud, config.direct_timeout());
    let scheduler =
        Scheduler::spawn(SchedulerPolicy::from_app(&config), resolver, cache, uploads.clone(), shutdown.clone());

    let (out_tx, out_rx) = mpsc::unbounded_channel();
    let writer = tokio::spawn(write_responses(out_rx));

    let block_list = BlockList::from_app(&config, licensed);
    let mut driver = Driver::new(scheduler, uploads, block_list, out_tx);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) => driver.handle_line(&line).await,
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("interrupted");
                break;
            }
        }
    }

    driver.finish().await;
    shutdown.cancel();
    persister.await?;
    flusher.await?;
    writer.await??;

    tracing::info!("flagline stopped");
    Ok(())
}

/// Serialize responses to stdout, one per line, until every sender is gone.
async fn write_responses(mut rx: mpsc::UnboundedReceiver<Response>) -> Result<()> {
    let mut stdout = tokio::io::stdout();
    while let Some(response) = rx.recv().await {
        let mut line = serde_json::to_vec(&response)?;
        line.push(b'\n');
        stdout.write_all(&line).await?;
        stdout.flush().await?;
    }
    Ok(())
}
