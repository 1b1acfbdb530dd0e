//! Confirmation Engine
//!
//! Loops sharing the registry:
//! - ingest: watch requests from the chat side become registry records
//! - blocks, one per network: every new block advances the records of its
//!   network. A stalled lookup on one network never holds back another.
//!
//! After each block the expiry sweep runs opportunistically.

use super::error::TrackerError;
use super::lookup::ChainLookup;
use super::model::{
    DEFAULT_CONFIRMATIONS, NewBlockEvent, WatchRequest, WatchedTransaction, format_timestamp,
};
use super::network::Network;
use super::notify::{Notification, NotificationKind, NotificationSink, dispatch};
use super::registry::WatchRegistry;
use super::shutdown::ShutdownSignal;
use super::snapshot::{default_retention, sweep_expired};
use super::state::{Step, first_confirmation, next_step};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub struct ConfirmationEngine {
    registry: Arc<WatchRegistry>,
    lookup: Arc<dyn ChainLookup>,
    sink: Arc<dyn NotificationSink>,
    default_target: u32,
    retention: Duration,
}

impl ConfirmationEngine {
    pub fn new(
        registry: Arc<WatchRegistry>,
        lookup: Arc<dyn ChainLookup>,
        sink: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            lookup,
            sink,
            default_target: DEFAULT_CONFIRMATIONS,
            retention: default_retention(),
        }
    }

    pub fn with_default_target(mut self, target: u32) -> Self {
        self.default_target = target.max(1);
        self
    }

    pub fn with_retention(mut self, retention: Duration) -> Self {
        self.retention = retention;
        self
    }

    pub fn registry(&self) -> &Arc<WatchRegistry> {
        &self.registry
    }

    /// Register a watch unless the same one exists. Returns `true` if added.
    pub fn ingest(&self, request: WatchRequest) -> bool {
        let now = Utc::now();
        let record = request.into_record(self.default_target, now);
        let key = record.key();
        if self.registry.contains(&key) {
            debug!(tx_id = %key.tx_id, network = %key.network, "Duplicate watch dropped");
            return false;
        }
        let added = self.registry.add(record, format_timestamp(now));
        if added {
            info!(tx_id = %key.tx_id, network = %key.network, destination = %key.destination, "Watching transaction");
        }
        added
    }

    /// Advance every record of `event.network`. Returns the notifications
    /// handed to the sink, in emission order.
    pub async fn on_block(&self, event: NewBlockEvent) -> Vec<Notification> {
        let mut emitted = Vec::new();

        for record in self.registry.keys() {
            if record.network != event.network {
                continue;
            }
            self.advance(record, event.height, &mut emitted).await;
        }

        sweep_expired(&self.registry, Utc::now(), self.retention);

        for notification in &emitted {
            dispatch(&self.sink, notification.clone());
        }
        emitted
    }

    /// Run one pass at the current tip, used right after a restore.
    pub async fn catch_up(&self, network: Network) -> Result<Vec<Notification>, TrackerError> {
        let height = self.lookup.tip_height(network).await?;
        info!(%network, height, "Catching up restored watches");
        Ok(self.on_block(NewBlockEvent { network, height }).await)
    }

    async fn advance(
        &self,
        record: WatchedTransaction,
        height: u64,
        emitted: &mut Vec<Notification>,
    ) {
        match next_step(&record, height) {
            Step::Intermediate(next) => {
                if self.registry.replace(next.clone(), format_timestamp(Utc::now())) {
                    debug!(tx_id = %next.tx_id, count = next.confirmation_count, height, "Confirmation advanced");
                    emitted.push(notification(
                        &next,
                        NotificationKind::Confirmation {
                            count: next.confirmation_count,
                        },
                    ));
                }
            }
            Step::CheckInclusion => {
                let status = match self.lookup.tx_status(record.network, &record.tx_id).await {
                    Ok(status) => status,
                    Err(e) => {
                        warn!(tx_id = %record.tx_id, network = %record.network, error = %e, "Status lookup failed");
                        return;
                    }
                };
                if !status.confirmed {
                    debug!(tx_id = %record.tx_id, height, "Still unconfirmed");
                    return;
                }

                let next = first_confirmation(&record, height);
                let first = notification(
                    &next,
                    NotificationKind::FirstConfirmation {
                        block_hash: status.block_hash,
                        block_time: status.block_time,
                    },
                );

                if next.confirmation_count >= next.target_confirmations {
                    if self.registry.remove(&next.key()).is_some() {
                        info!(tx_id = %next.tx_id, target = next.target_confirmations, "Target reached on first confirmation");
                        emitted.push(first);
                        emitted.push(final_notification(&next));
                    }
                } else if self.registry.replace(next.clone(), format_timestamp(Utc::now())) {
                    info!(tx_id = %next.tx_id, height, "First confirmation");
                    emitted.push(first);
                }
            }
            Step::Final(done) => {
                if self.registry.remove(&done.key()).is_some() {
                    info!(tx_id = %done.tx_id, target = done.target_confirmations, height, "Target reached, watch removed");
                    emitted.push(final_notification(&done));
                }
            }
            Step::Hold => {
                debug!(tx_id = %record.tx_id, height, last = record.last_confirmed_height, "No transition");
            }
        }
    }

    /// Ingest loop. Exits on shutdown or when every request sender is gone.
    pub async fn run_ingest(
        self: Arc<Self>,
        mut requests: mpsc::UnboundedReceiver<WatchRequest>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutting down watch request listener");
                    return;
                }
                request = requests.recv() => match request {
                    Some(request) => {
                        self.ingest(request);
                    }
                    None => {
                        info!("Watch request source closed");
                        return;
                    }
                },
            }
        }
    }

    /// Spawn one block-reaction task per distinct network, each fed by its
    /// own capacity-1 channel. With `catch_up`, a task first advances its
    /// network's records to the current tip.
    pub fn spawn_block_loops(
        self: &Arc<Self>,
        networks: &[Network],
        catch_up: bool,
        shutdown: &ShutdownSignal,
    ) -> BlockLoops {
        let mut loops = BlockLoops::default();
        for &network in networks {
            if loops.sender(network).is_some() {
                continue;
            }
            let (tx, rx) = mpsc::channel(1);
            let engine = self.clone();
            let shutdown = shutdown.clone();
            let handle = tokio::spawn(async move {
                if catch_up && !engine.registry.is_empty() {
                    if let Err(e) = engine.catch_up(network).await {
                        warn!(%network, error = %e, "Catch-up failed, waiting for the next block");
                    }
                }
                engine.run_blocks(rx, shutdown).await;
            });
            loops.senders.push((network, tx));
            loops.handles.push(handle);
        }
        loops
    }

    /// Block-reaction loop. Exits on shutdown or when its feed is gone.
    pub async fn run_blocks(
        self: Arc<Self>,
        mut blocks: mpsc::Receiver<NewBlockEvent>,
        mut shutdown: ShutdownSignal,
    ) {
        loop {
            tokio::select! {
                _ = shutdown.wait() => {
                    info!("Shutting down block reaction loop");
                    return;
                }
                event = blocks.recv() => match event {
                    Some(event) => {
                        info!(network = %event.network, height = event.height, "New block");
                        tokio::select! {
                            _ = shutdown.wait() => {
                                info!(network = %event.network, "Shutdown during block pass");
                                return;
                            }
                            _ = self.on_block(event) => {}
                        }
                    }
                    None => {
                        info!("Block feed closed");
                        return;
                    }
                },
            }
        }
    }
}

/// Per-network block channels and the tasks draining them.
#[derive(Default)]
pub struct BlockLoops {
    pub senders: Vec<(Network, mpsc::Sender<NewBlockEvent>)>,
    pub handles: Vec<JoinHandle<()>>,
}

impl BlockLoops {
    pub fn sender(&self, network: Network) -> Option<mpsc::Sender<NewBlockEvent>> {
        self.senders
            .iter()
            .find(|(n, _)| *n == network)
            .map(|(_, tx)| tx.clone())
    }
}

fn notification(record: &WatchedTransaction, kind: NotificationKind) -> Notification {
    Notification {
        destination: record.destination.clone(),
        tx_id: record.tx_id.clone(),
        network: record.network,
        kind,
    }
}

fn final_notification(record: &WatchedTransaction) -> Notification {
    notification(
        record,
        NotificationKind::Final {
            target: record.target_confirmations,
        },
    )
}
