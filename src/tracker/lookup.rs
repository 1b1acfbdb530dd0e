//! Confirmation-status and tip-height lookups over the mempool REST API.

use super::error::TrackerError;
use super::model::ConfirmationStatus;
use super::network::Network;
use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

/// On-demand chain queries used by the confirmation engine.
#[async_trait]
pub trait ChainLookup: Send + Sync {
    /// Has `tx_id` been included in a block yet?
    async fn tx_status(
        &self,
        network: Network,
        tx_id: &str,
    ) -> Result<ConfirmationStatus, TrackerError>;

    /// Height of the current chain tip.
    async fn tip_height(&self, network: Network) -> Result<u64, TrackerError>;
}

/// HTTP client for a mempool.space style API.
pub struct MempoolClient {
    client: reqwest::Client,
    api_base: String,
}

impl MempoolClient {
    pub fn new(api_base: impl Into<String>, timeout: Duration) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            api_base: api_base.into(),
        })
    }
}

#[async_trait]
impl ChainLookup for MempoolClient {
    async fn tx_status(
        &self,
        network: Network,
        tx_id: &str,
    ) -> Result<ConfirmationStatus, TrackerError> {
        let url = network.tx_status_url(&self.api_base, tx_id);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(%network, tx_id, payload = %body, "Status response");
        serde_json::from_str(&body)
            .map_err(|e| TrackerError::Decode(format!("status payload for {}: {}", tx_id, e)))
    }

    async fn tip_height(&self, network: Network) -> Result<u64, TrackerError> {
        let url = network.tip_height_url(&self.api_base);
        let body = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        debug!(%network, body = %body.trim(), "Tip height response");
        parse_tip_height(&body)
    }
}

/// The tip endpoint answers with a bare decimal integer.
pub fn parse_tip_height(body: &str) -> Result<u64, TrackerError> {
    body.trim()
        .parse::<u64>()
        .map_err(|e| TrackerError::Decode(format!("tip height {:?}: {}", body.trim(), e)))
}
