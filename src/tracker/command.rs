//! Watch command grammar.
//!
//! ```text
//! command := (pair | word)*
//! pair    := key ":" value | key ":" SP value
//! key     := "txId" | "confirms" | "network"      (case-insensitive)
//! ```
//!
//! Words that are not a known key (mentions, filler) are skipped.

use super::model::WatchRequest;
use super::network::Network;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("a txId is required, in the format: 'txId: <transaction id to watch>'")]
    MissingTxId,

    #[error("invalid txId '{0}', expected an alphanumeric transaction id")]
    InvalidTxId(String),

    #[error("missing value after '{0}:'")]
    MissingValue(String),

    #[error("invalid confirmation count '{0}', expected a positive integer")]
    InvalidConfirmations(String),

    #[error("unknown network '{0}', expected mainnet, testnet or signet")]
    UnknownNetwork(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WatchCommand {
    pub tx_id: String,
    pub network: Network,
    pub target_confirmations: Option<u32>,
}

impl WatchCommand {
    pub fn into_request(self, destination: impl Into<String>) -> WatchRequest {
        WatchRequest {
            tx_id: self.tx_id,
            network: self.network,
            target_confirmations: self.target_confirmations,
            destination: destination.into(),
        }
    }
}

#[derive(Clone, Copy)]
enum Key {
    TxId,
    Confirms,
    Network,
}

impl Key {
    fn parse(word: &str) -> Option<Self> {
        match word.to_ascii_lowercase().as_str() {
            "txid" => Some(Key::TxId),
            "confirms" => Some(Key::Confirms),
            "network" => Some(Key::Network),
            _ => None,
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Key::TxId => "txId",
            Key::Confirms => "confirms",
            Key::Network => "network",
        }
    }
}

pub fn parse_command(text: &str) -> Result<WatchCommand, CommandError> {
    let mut tx_id = None;
    let mut network = Network::default();
    let mut confirms = None;

    let mut words = text.split_whitespace().peekable();
    while let Some(word) = words.next() {
        let Some((head, inline)) = word.split_once(':') else {
            continue;
        };
        let Some(key) = Key::parse(head) else {
            continue;
        };

        let value = if inline.is_empty() {
            match words.peek() {
                Some(next) if !next.contains(':') => words.next(),
                _ => None,
            }
        } else {
            Some(inline)
        };
        let value = value.ok_or_else(|| CommandError::MissingValue(key.name().to_string()))?;

        match key {
            Key::TxId => {
                // Sentence punctuation typed after the id
                let id = value.trim_end_matches(|c: char| c.is_ascii_punctuation());
                if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
                    return Err(CommandError::InvalidTxId(value.to_string()));
                }
                tx_id = Some(id.to_string());
            }
            Key::Confirms => {
                let n = value
                    .parse::<u32>()
                    .ok()
                    .filter(|n| *n > 0)
                    .ok_or_else(|| CommandError::InvalidConfirmations(value.to_string()))?;
                confirms = Some(n);
            }
            Key::Network => {
                network = value
                    .parse()
                    .map_err(|_| CommandError::UnknownNetwork(value.to_string()))?;
            }
        }
    }

    let tx_id = tx_id.ok_or(CommandError::MissingTxId)?;
    Ok(WatchCommand {
        tx_id,
        network,
        target_confirmations: confirms,
    })
}

/// Reply text for a parsed (or rejected) command.
pub fn render_ack(result: &Result<WatchCommand, CommandError>, default_target: u32) -> String {
    match result {
        Ok(cmd) => format!(
            "Your transaction {} is being watched on {} and you will be notified of each block until {} confirmations have occurred",
            cmd.tx_id,
            cmd.network,
            cmd.target_confirmations.unwrap_or(default_target)
        ),
        Err(e) => format!("Failed to set up watcher, check your format? {}", e),
    }
}
