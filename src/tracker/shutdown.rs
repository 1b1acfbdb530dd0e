//! Root cancellation and interrupt handling.
//!
//! First interrupt: sweep expired watches, snapshot the registry, then
//! cancel every task. Second interrupt: exit immediately with status 1,
//! without saving.

use super::registry::WatchRegistry;
use super::snapshot::{SnapshotStore, sweep_expired};
use chrono::{Duration, Utc};
use std::sync::Arc;
use tokio::sync::watch;

/// Shutdown signal observed by every long-running task.
#[derive(Clone)]
pub struct ShutdownSignal {
    rx: watch::Receiver<bool>,
}

/// Owner side of the root cancellation.
pub struct ShutdownTrigger {
    tx: watch::Sender<bool>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = watch::channel(false);
    (ShutdownTrigger { tx }, ShutdownSignal { rx })
}

impl ShutdownTrigger {
    pub fn request_shutdown(&self) {
        self.tx.send_replace(true);
    }
}

impl ShutdownSignal {
    pub fn is_shutdown_requested(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once shutdown is requested or the trigger is gone.
    pub async fn wait(&mut self) {
        loop {
            if *self.rx.borrow_and_update() {
                return;
            }
            if self.rx.changed().await.is_err() {
                return;
            }
        }
    }
}

/// Save-then-cancel, shared by the interrupt handler and tests.
pub fn drain_and_save(
    registry: &WatchRegistry,
    store: &SnapshotStore,
    retention: Duration,
    trigger: &ShutdownTrigger,
) {
    let expired = sweep_expired(registry, Utc::now(), retention);
    if let Err(e) = store.save(registry) {
        tracing::error!(error = %e, "Failed to save snapshot, shutting down anyway");
    } else {
        tracing::info!(expired, kept = registry.len(), "Registry saved");
    }
    trigger.request_shutdown();
}

/// Runs until the process exits. Spawn once from `main`.
pub async fn handle_signals(
    trigger: ShutdownTrigger,
    registry: Arc<WatchRegistry>,
    store: Arc<SnapshotStore>,
    retention: Duration,
) {
    let mut forced = false;
    loop {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Unable to listen for interrupt");
            return;
        }
        if forced {
            tracing::warn!("Forcing tracker to shut down");
            std::process::exit(1);
        }
        tracing::info!("Interrupt received, shutting down tracker");
        drain_and_save(&registry, &store, retention, &trigger);
        forced = true;
    }
}
