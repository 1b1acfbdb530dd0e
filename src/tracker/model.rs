//! Watch records and the events that flow between feed, engine and sinks.

use super::network::Network;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Target used when a request does not name one.
pub const DEFAULT_CONFIRMATIONS: u32 = 6;

/// Format of the last-touched timestamp kept beside every record.
pub const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Registry identity of a watch. Registering the same triple twice is a no-op.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WatchKey {
    pub tx_id: String,
    pub network: Network,
    pub destination: String,
}

/// A request coming from the chat side, before defaults are applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchRequest {
    pub tx_id: String,
    pub network: Network,
    pub target_confirmations: Option<u32>,
    pub destination: String,
}

impl WatchRequest {
    pub fn into_record(self, default_target: u32, now: DateTime<Utc>) -> WatchedTransaction {
        let target = self.target_confirmations.unwrap_or(default_target).max(1);
        WatchedTransaction {
            tx_id: self.tx_id,
            network: self.network,
            target_confirmations: target,
            confirmation_count: 0,
            last_confirmed_height: 0,
            destination: self.destination,
            watched_since: now,
        }
    }
}

/// A tracked transaction and its confirmation progress.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WatchedTransaction {
    pub tx_id: String,
    pub network: Network,
    pub target_confirmations: u32,
    /// Always within `0..=target_confirmations`, never decreases.
    pub confirmation_count: u32,
    /// Height of the block that last advanced `confirmation_count`.
    pub last_confirmed_height: u64,
    pub destination: String,
    pub watched_since: DateTime<Utc>,
}

impl WatchedTransaction {
    pub fn key(&self) -> WatchKey {
        WatchKey {
            tx_id: self.tx_id.clone(),
            network: self.network,
            destination: self.destination.clone(),
        }
    }
}

/// A network produced a block at `height`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewBlockEvent {
    pub network: Network,
    pub height: u64,
}

/// Answer of the status endpoint for one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ConfirmationStatus {
    pub confirmed: bool,
    #[serde(default)]
    pub block_height: Option<u64>,
    #[serde(default)]
    pub block_hash: Option<String>,
    #[serde(default)]
    pub block_time: Option<i64>,
}
