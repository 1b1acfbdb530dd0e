use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tx_tracker::tracker::{
    ChainLookup, ConfirmationEngine, ConfirmationStatus, LogSink, Network, NewBlockEvent,
    Notification, NotificationKind, NotificationSink, TrackerError, WatchKey, WatchRegistry,
    WatchRequest, WatchedTransaction, shutdown_channel,
};

/// Status endpoint stand-in: a tx is confirmed once it is in `confirmed`.
#[derive(Default)]
struct MockLookup {
    confirmed: Mutex<HashSet<String>>,
    failing: AtomicBool,
    status_calls: AtomicUsize,
    tip: u64,
}

impl MockLookup {
    fn confirm(&self, tx_id: &str) {
        self.confirmed.lock().unwrap().insert(tx_id.to_string());
    }
}

#[async_trait]
impl ChainLookup for MockLookup {
    async fn tx_status(
        &self,
        _network: Network,
        tx_id: &str,
    ) -> Result<ConfirmationStatus, TrackerError> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(TrackerError::Decode("status unavailable".to_string()));
        }
        Ok(ConfirmationStatus {
            confirmed: self.confirmed.lock().unwrap().contains(tx_id),
            block_hash: Some("0000abcd".to_string()),
            block_time: Some(1_700_000_000),
            ..Default::default()
        })
    }

    async fn tip_height(&self, _network: Network) -> Result<u64, TrackerError> {
        Ok(self.tip)
    }
}

struct Harness {
    lookup: Arc<MockLookup>,
    engine: ConfirmationEngine,
}

impl Harness {
    fn new() -> Self {
        Self::with_lookup(MockLookup::default())
    }

    fn with_lookup(lookup: MockLookup) -> Self {
        let lookup = Arc::new(lookup);
        let sink: Arc<dyn NotificationSink> = Arc::new(LogSink);
        let engine = ConfirmationEngine::new(Arc::new(WatchRegistry::new()), lookup.clone(), sink);
        Self { lookup, engine }
    }

    fn registry(&self) -> &WatchRegistry {
        self.engine.registry()
    }

    async fn block(&self, height: u64) -> Vec<Notification> {
        self.engine
            .on_block(NewBlockEvent {
                network: Network::Mainnet,
                height,
            })
            .await
    }
}

fn request(tx_id: &str, target: Option<u32>) -> WatchRequest {
    WatchRequest {
        tx_id: tx_id.to_string(),
        network: Network::Mainnet,
        target_confirmations: target,
        destination: "#ops".to_string(),
    }
}

fn key(tx_id: &str) -> WatchKey {
    WatchKey {
        tx_id: tx_id.to_string(),
        network: Network::Mainnet,
        destination: "#ops".to_string(),
    }
}

fn count_of(h: &Harness, tx_id: &str) -> Option<u32> {
    h.registry().record(&key(tx_id)).map(|r| r.confirmation_count)
}

#[tokio::test]
async fn test_full_lifecycle_with_target_three() {
    let h = Harness::new();
    assert!(h.engine.ingest(request("abc", Some(3))));

    // Still in the mempool
    assert!(h.block(100).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(0));

    h.lookup.confirm("abc");
    let sent = h.block(101).await;
    assert_eq!(sent.len(), 1);
    assert!(matches!(
        sent[0].kind,
        NotificationKind::FirstConfirmation { .. }
    ));
    assert_eq!(count_of(&h, "abc"), Some(1));

    let sent = h.block(102).await;
    assert_eq!(sent[0].kind, NotificationKind::Confirmation { count: 2 });
    assert_eq!(count_of(&h, "abc"), Some(2));

    let sent = h.block(103).await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, NotificationKind::Final { target: 3 });
    assert_eq!(sent[0].destination, "#ops");
    assert!(h.registry().is_empty());

    // Nothing left to report
    assert!(h.block(104).await.is_empty());
}

#[tokio::test]
async fn test_default_target_is_six() {
    let h = Harness::new();
    h.engine.ingest(request("abc", None));
    h.lookup.confirm("abc");

    let mut finals = 0;
    for height in 1..=10 {
        for n in h.block(height).await {
            if matches!(n.kind, NotificationKind::Final { target: 6 }) {
                finals += 1;
                assert_eq!(height, 6);
            }
        }
    }
    assert_eq!(finals, 1);
    assert!(h.registry().is_empty());
}

#[tokio::test]
async fn test_duplicate_registration_is_ignored() {
    let h = Harness::new();
    assert!(h.engine.ingest(request("abc", Some(3))));
    assert!(!h.engine.ingest(request("abc", Some(5))));
    assert_eq!(h.registry().len(), 1);
    assert_eq!(
        h.registry().record(&key("abc")).unwrap().target_confirmations,
        3
    );

    // Same tx for another destination is a separate watch
    let mut other = request("abc", Some(3));
    other.destination = "#treasury".to_string();
    assert!(h.engine.ingest(other));
    assert_eq!(h.registry().len(), 2);
}

#[tokio::test]
async fn test_repeated_height_does_not_double_count() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(3)));
    h.lookup.confirm("abc");

    h.block(200).await;
    assert_eq!(count_of(&h, "abc"), Some(1));

    assert!(h.block(200).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(1));

    h.block(201).await;
    assert!(h.block(201).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(2));

    // The final step needs a newer block too
    assert!(h.block(201).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(2));
}

#[tokio::test]
async fn test_count_never_decreases_on_stale_height() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(5)));
    h.lookup.confirm("abc");

    h.block(300).await;
    h.block(301).await;
    assert!(h.block(250).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(2));
    assert_eq!(
        h.registry().record(&key("abc")).unwrap().last_confirmed_height,
        301
    );
}

#[tokio::test]
async fn test_height_gap_counts_one() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(5)));
    h.lookup.confirm("abc");

    h.block(10).await;
    let sent = h.block(15).await;
    assert_eq!(sent[0].kind, NotificationKind::Confirmation { count: 2 });
}

#[tokio::test]
async fn test_target_one_finishes_on_first_confirmation() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(1)));
    h.lookup.confirm("abc");

    let sent = h.block(50).await;
    assert_eq!(sent.len(), 2);
    assert!(matches!(
        sent[0].kind,
        NotificationKind::FirstConfirmation { .. }
    ));
    assert_eq!(sent[1].kind, NotificationKind::Final { target: 1 });
    assert!(h.registry().is_empty());
}

#[tokio::test]
async fn test_lookup_failure_leaves_record_unchanged() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(3)));
    h.lookup.confirm("abc");
    h.lookup.failing.store(true, Ordering::SeqCst);

    assert!(h.block(400).await.is_empty());
    assert_eq!(count_of(&h, "abc"), Some(0));

    h.lookup.failing.store(false, Ordering::SeqCst);
    assert_eq!(h.block(401).await.len(), 1);
    assert_eq!(count_of(&h, "abc"), Some(1));
}

#[tokio::test]
async fn test_other_network_blocks_are_ignored() {
    let h = Harness::new();
    h.engine.ingest(request("abc", Some(3)));
    h.lookup.confirm("abc");

    let sent = h
        .engine
        .on_block(NewBlockEvent {
            network: Network::Testnet,
            height: 900,
        })
        .await;
    assert!(sent.is_empty());
    assert_eq!(h.lookup.status_calls.load(Ordering::SeqCst), 0);
    assert_eq!(count_of(&h, "abc"), Some(0));
}

#[tokio::test]
async fn test_block_sweeps_expired_watches() {
    let h = Harness::new();
    let stale = WatchedTransaction {
        tx_id: "old".to_string(),
        network: Network::Testnet,
        target_confirmations: 6,
        confirmation_count: 2,
        last_confirmed_height: 10,
        destination: "#ops".to_string(),
        watched_since: Utc::now() - Duration::days(15),
    };
    h.registry().add(stale, "20200101000000".to_string());
    h.engine.ingest(request("fresh", Some(3)));

    h.block(1).await;

    assert_eq!(h.registry().len(), 1);
    assert!(h.registry().contains(&key("fresh")));
}

#[tokio::test]
async fn test_catch_up_uses_tip_height() {
    let h = Harness::with_lookup(MockLookup {
        tip: 777,
        ..Default::default()
    });
    h.engine.ingest(request("abc", Some(3)));
    h.lookup.confirm("abc");

    let sent = h.engine.catch_up(Network::Mainnet).await.unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(
        h.registry().record(&key("abc")).unwrap().last_confirmed_height,
        777
    );
}

/// Sink that records what was delivered.
#[derive(Default)]
struct RecordingSink {
    delivered: Mutex<Vec<Notification>>,
}

#[async_trait]
impl NotificationSink for RecordingSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), TrackerError> {
        self.delivered.lock().unwrap().push(notification.clone());
        Ok(())
    }
}

#[tokio::test]
async fn test_notifications_reach_the_sink() {
    let lookup = Arc::new(MockLookup::default());
    lookup.confirm("abc");
    let sink = Arc::new(RecordingSink::default());
    let engine = ConfirmationEngine::new(
        Arc::new(WatchRegistry::new()),
        lookup,
        sink.clone() as Arc<dyn NotificationSink>,
    )
    .with_default_target(2);

    engine.ingest(request("abc", None));
    engine
        .on_block(NewBlockEvent {
            network: Network::Mainnet,
            height: 1,
        })
        .await;
    engine
        .on_block(NewBlockEvent {
            network: Network::Mainnet,
            height: 2,
        })
        .await;

    // Delivery runs on spawned tasks
    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while sink.delivered.lock().unwrap().len() < 2 {
            tokio::task::yield_now().await;
        }
    })
    .await
    .unwrap();

    let delivered = sink.delivered.lock().unwrap();
    assert!(
        delivered
            .iter()
            .any(|n| n.kind == NotificationKind::Final { target: 2 })
    );
}

/// Every status query on `stalled` hangs forever; the rest are confirmed.
struct StallingLookup {
    stalled: Network,
}

#[async_trait]
impl ChainLookup for StallingLookup {
    async fn tx_status(
        &self,
        network: Network,
        _tx_id: &str,
    ) -> Result<ConfirmationStatus, TrackerError> {
        if network == self.stalled {
            std::future::pending::<()>().await;
        }
        Ok(ConfirmationStatus {
            confirmed: true,
            ..Default::default()
        })
    }

    async fn tip_height(&self, _network: Network) -> Result<u64, TrackerError> {
        Ok(0)
    }
}

#[tokio::test]
async fn test_stalled_network_does_not_block_other_networks() {
    let registry = Arc::new(WatchRegistry::new());
    let engine = Arc::new(ConfirmationEngine::new(
        registry.clone(),
        Arc::new(StallingLookup {
            stalled: Network::Testnet,
        }),
        Arc::new(LogSink),
    ));
    let mut slow = request("slow", Some(3));
    slow.network = Network::Testnet;
    engine.ingest(slow);
    engine.ingest(request("fast", Some(3)));

    let (trigger, signal) = shutdown_channel();
    let loops = engine.spawn_block_loops(
        &[Network::Testnet, Network::Mainnet, Network::Testnet],
        false,
        &signal,
    );
    assert_eq!(loops.senders.len(), 2);

    let testnet = loops.sender(Network::Testnet).unwrap();
    let mainnet = loops.sender(Network::Mainnet).unwrap();
    testnet
        .send(NewBlockEvent {
            network: Network::Testnet,
            height: 499,
        })
        .await
        .unwrap();
    mainnet
        .send(NewBlockEvent {
            network: Network::Mainnet,
            height: 500,
        })
        .await
        .unwrap();

    tokio::time::timeout(std::time::Duration::from_secs(2), async {
        while registry.record(&key("fast")).map(|r| r.confirmation_count) != Some(1) {
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("mainnet block was held back by the stalled testnet lookup");

    let slow_key = WatchKey {
        network: Network::Testnet,
        ..key("slow")
    };
    assert_eq!(registry.record(&slow_key).unwrap().confirmation_count, 0);

    // Shutdown also releases the loop stuck inside the lookup
    trigger.request_shutdown();
    for handle in loops.handles {
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("block loop did not stop on shutdown")
            .unwrap();
    }
}
