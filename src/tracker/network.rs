use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Chain variants the tracker can follow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    #[default]
    Mainnet,
    Testnet,
    Signet,
}

impl Network {
    pub const ALL: [Network; 3] = [Network::Mainnet, Network::Testnet, Network::Signet];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Signet => "signet",
        }
    }

    /// Path segment inserted after the host for this network's endpoints.
    /// The primary chain is served from the root.
    pub fn path_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "",
            Network::Testnet => "/testnet",
            Network::Signet => "/signet",
        }
    }

    pub fn ws_url(&self, ws_base: &str) -> String {
        format!("{}{}/api/v1/ws", ws_base.trim_end_matches('/'), self.path_prefix())
    }

    pub fn tx_status_url(&self, api_base: &str, tx_id: &str) -> String {
        format!(
            "{}{}/api/tx/{}/status",
            api_base.trim_end_matches('/'),
            self.path_prefix(),
            tx_id
        )
    }

    pub fn tip_height_url(&self, api_base: &str) -> String {
        format!(
            "{}{}/api/blocks/tip/height",
            api_base.trim_end_matches('/'),
            self.path_prefix()
        )
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "" | "main" | "mainnet" => Ok(Network::Mainnet),
            "testnet" | "test" => Ok(Network::Testnet),
            "signet" => Ok(Network::Signet),
            other => Err(other.to_string()),
        }
    }
}
