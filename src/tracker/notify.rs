//! Notification events and the sinks that deliver them.
//!
//! Delivery is fire-and-forget: every notification is handed to the sink in
//! its own task and a failure is only logged. The confirmation count has
//! already advanced by the time a message is attempted.

use super::error::TrackerError;
use super::network::Network;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    /// Transaction left the mempool and landed in a block.
    FirstConfirmation {
        block_hash: Option<String>,
        block_time: Option<i64>,
    },
    /// One more block on top.
    Confirmation { count: u32 },
    /// Target reached, no more updates follow.
    Final { target: u32 },
    /// Reply to a watch command, successful or not.
    Acknowledgement { text: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub destination: String,
    pub tx_id: String,
    pub network: Network,
    pub kind: NotificationKind,
}

impl Notification {
    pub fn text(&self) -> String {
        match &self.kind {
            NotificationKind::FirstConfirmation {
                block_hash,
                block_time,
            } => {
                let hash = block_hash.as_deref().unwrap_or("unknown");
                let at = block_time
                    .and_then(|t| DateTime::<Utc>::from_timestamp(t, 0))
                    .map(|t| t.to_string())
                    .unwrap_or_else(|| "an unknown time".to_string());
                format!(
                    "Your transaction {} has been picked up from the mempool and confirmed in block {} at {}!",
                    self.tx_id, hash, at
                )
            }
            NotificationKind::Confirmation { count } => format!(
                "Your transaction {} has moved up a confirmation {}",
                self.tx_id, count
            ),
            NotificationKind::Final { target } => format!(
                "The transaction {} has moved up to your limit of confirmations {} and you will no longer be notified",
                self.tx_id, target
            ),
            NotificationKind::Acknowledgement { text } => text.clone(),
        }
    }
}

#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> Result<(), TrackerError>;
}

/// Hand a notification to the sink without waiting for it.
pub fn dispatch(sink: &Arc<dyn NotificationSink>, notification: Notification) {
    let sink = sink.clone();
    tokio::spawn(async move {
        if let Err(e) = sink.deliver(&notification).await {
            tracing::warn!(
                destination = %notification.destination,
                tx_id = %notification.tx_id,
                error = %e,
                "Failed to deliver notification"
            );
        }
    });
}

/// Writes notifications to the log. Used when no webhook is configured.
pub struct LogSink;

#[async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), TrackerError> {
        tracing::info!(
            destination = %notification.destination,
            network = %notification.network,
            "{}",
            notification.text()
        );
        Ok(())
    }
}

#[derive(Serialize)]
struct WebhookPayload<'a> {
    channel: &'a str,
    text: String,
}

/// POSTs `{channel, text}` JSON to a chat webhook.
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>, timeout: std::time::Duration) -> Result<Self, TrackerError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl NotificationSink for WebhookSink {
    async fn deliver(&self, notification: &Notification) -> Result<(), TrackerError> {
        let payload = WebhookPayload {
            channel: &notification.destination,
            text: notification.text(),
        };
        self.client
            .post(&self.url)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}
