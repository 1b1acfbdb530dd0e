//! tx_tracker - Bitcoin transaction confirmation tracker
//!
//! Follows per-network block feeds and tells whoever registered a
//! transaction how far it has been confirmed.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration (`config/{env}.yaml`)
//! - [`logging`] - tracing subscriber with rolling file output
//! - [`tracker`] - block feeds, watch registry, confirmation engine, snapshot

pub mod config;
pub mod logging;
pub mod tracker;

pub use config::{AppConfig, NotifyConfig, TrackerConfig};
pub use tracker::{
    BlockFeed, ConfirmationEngine, Network, NewBlockEvent, SnapshotStore, TrackerError,
    WatchRegistry, WatchRequest, WatchedTransaction,
};
