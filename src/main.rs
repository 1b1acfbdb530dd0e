//! tx_tracker - transaction confirmation tracker
//!
//! ```text
//! ┌────────────┐  NewBlockEvent  ┌─────────────┐  Notification  ┌──────────┐
//! │ BlockFeed  │────(cap 1)─────▶│ block loop  │───────────────▶│   Sink   │
//! │ (per net)  │    per net      │  (per net)  │                │ (webhook)│
//! └────────────┘                 └─────────────┘                └──────────┘
//!                                       │ shared registry
//! ┌────────────┐  WatchRequest   ┌─────────────┐
//! │   stdin    │──(unbounded)───▶│ ingest loop │
//! └────────────┘                 └─────────────┘
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use futures::future::join_all;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use tx_tracker::config::AppConfig;
use tx_tracker::logging::init_logging;
use tx_tracker::tracker::shutdown::handle_signals;
use tx_tracker::tracker::{
    BlockFeed, ChainLookup, ConfirmationEngine, LogSink, MempoolClient, NotificationSink,
    SnapshotStore, WebhookSink, run_ingress, shutdown_channel, sweep_expired,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

fn get_config_path() -> Option<String> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--config" && i + 1 < args.len() {
            return Some(args[i + 1].clone());
        }
    }
    None
}

fn main() -> anyhow::Result<()> {
    let config = match get_config_path() {
        Some(path) => AppConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => {
            let env = get_env();
            AppConfig::load(&env).with_context(|| format!("loading config for env {}", env))?
        }
    };
    let _guard = init_logging(&config)?;
    info!(git_hash = env!("GIT_HASH"), "tx_tracker starting");

    let runtime = tokio::runtime::Runtime::new()?;
    let result = runtime.block_on(run(config));
    // The stdin reader sits in a blocking read; don't wait for it
    runtime.shutdown_timeout(Duration::from_secs(1));

    info!("tx_tracker stopped");
    result
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    let tracker = &config.tracker;
    let retention = tracker.retention();

    // An unreadable snapshot is fatal
    let store = Arc::new(SnapshotStore::new(&tracker.save_file));
    let registry = match store.load() {
        Ok(registry) => Arc::new(registry),
        Err(e) => {
            error!(path = %store.path().display(), error = %e, "Failed to load snapshot");
            return Err(anyhow::Error::new(e)
                .context(format!("restoring {}", store.path().display())));
        }
    };
    let expired = sweep_expired(&registry, chrono::Utc::now(), retention);
    info!(restored = registry.len(), expired, "Registry restored");

    let (trigger, shutdown) = shutdown_channel();
    tokio::spawn(handle_signals(
        trigger,
        registry.clone(),
        store.clone(),
        retention,
    ));

    let lookup: Arc<dyn ChainLookup> = Arc::new(
        MempoolClient::new(&tracker.api_base, tracker.http_timeout())
            .context("building status client")?,
    );
    let sink: Arc<dyn NotificationSink> = match &config.notify.webhook_url {
        Some(url) => Arc::new(WebhookSink::new(url, tracker.http_timeout())?),
        None => {
            warn!("No webhook configured, notifications go to the log");
            Arc::new(LogSink)
        }
    };

    let engine = Arc::new(
        ConfirmationEngine::new(registry.clone(), lookup, sink.clone())
            .with_default_target(tracker.default_confirmations)
            .with_retention(retention),
    );

    let mut loops = engine.spawn_block_loops(&tracker.networks, true, &shutdown);
    for (network, events) in std::mem::take(&mut loops.senders) {
        let feed = BlockFeed::new(
            network,
            network.ws_url(&tracker.ws_base),
            events,
            shutdown.clone(),
        )
        .with_keepalive_timeout(tracker.keepalive_timeout())
        .with_reconnect_delay(tracker.reconnect_delay());
        tokio::spawn(feed.run());
    }

    let (request_tx, request_rx) = mpsc::unbounded_channel();
    tokio::spawn(run_ingress(
        BufReader::new(tokio::io::stdin()),
        config.notify.default_destination.clone(),
        tracker.default_confirmations,
        sink,
        request_tx,
        shutdown.clone(),
    ));

    let ingest = tokio::spawn(engine.run_ingest(request_rx, shutdown));
    let (blocks, ingest) = tokio::join!(join_all(loops.handles), ingest);
    for result in blocks {
        result?;
    }
    ingest?;
    Ok(())
}
