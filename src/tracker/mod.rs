//! Transaction Confirmation Tracker
//!
//! Watches per-network block feeds and reports confirmation progress for
//! registered transactions:
//! - Websocket block feed per network with keepalive and reconnect
//! - Lock-guarded watch registry shared by the engine loops
//! - Confirmation state machine and engine
//! - Compressed snapshot with 14 day expiry

pub mod command;
pub mod engine;
pub mod error;
pub mod feed;
pub mod ingress;
pub mod lookup;
pub mod model;
pub mod network;
pub mod notify;
pub mod registry;
pub mod shutdown;
pub mod snapshot;
pub mod state;

// Re-exports for convenience
pub use command::{CommandError, WatchCommand, parse_command, render_ack};
pub use engine::{BlockLoops, ConfirmationEngine};
pub use error::{TrackerError, is_abnormal_closure};
pub use feed::{BlockFeed, Disconnect};
pub use ingress::run_ingress;
pub use lookup::{ChainLookup, MempoolClient};
pub use model::{
    ConfirmationStatus, DEFAULT_CONFIRMATIONS, NewBlockEvent, WatchKey, WatchRequest,
    WatchedTransaction,
};
pub use network::Network;
pub use notify::{LogSink, dispatch, Notification, NotificationKind, NotificationSink, WebhookSink};
pub use registry::WatchRegistry;
pub use shutdown::{ShutdownSignal, ShutdownTrigger, shutdown_channel};
pub use snapshot::{SnapshotStore, sweep_expired};
pub use state::{ConfirmationState, Step};
