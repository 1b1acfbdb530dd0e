//! Block Feed
//!
//! One long-lived websocket subscription per network.
//!
//! ```text
//! Connecting -> Listening -> (disconnect) -> Reconnecting -> Connecting
//!      \______________________ shutdown ______________________-> Stopped
//! ```
//!
//! On entering `Listening` the feed sends `{"action":"want","data":["blocks"]}`
//! and starts a keepalive task. The keepalive pings every `timeout / 2` and
//! checks for silence every `timeout / 4`. A connection that stayed silent
//! for longer than `timeout` is closed within a further `timeout / 4`, which
//! turns a silently dead socket into an ordinary disconnect.
//!
//! Reconnects are an explicit loop without backoff: disconnects are paced by
//! the remote keepalive. Only a failed dial waits `reconnect_delay`.

use super::error::{TrackerError, is_abnormal_closure};
use super::model::NewBlockEvent;
use super::network::Network;
use super::shutdown::ShutdownSignal;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tokio::sync::{Notify, mpsc};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

pub const DEFAULT_KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(120);

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWrite = SplitSink<WsStream, Message>;
type WsRead = SplitStream<WsStream>;

/// Subscription directive sent right after connecting.
#[derive(Debug, Serialize)]
struct WantDirective<'a> {
    action: &'a str,
    data: [&'a str; 1],
}

const WANT_BLOCKS: WantDirective<'static> = WantDirective {
    action: "want",
    data: ["blocks"],
};

#[derive(Debug, Deserialize)]
struct BlockFrame {
    block: Option<BlockPayload>,
}

#[derive(Debug, Deserialize)]
struct BlockPayload {
    height: u64,
}

/// Decode one text frame. `Ok(None)` for frames that carry no block.
pub fn decode_block_frame(text: &str) -> Result<Option<u64>, TrackerError> {
    let frame: BlockFrame =
        serde_json::from_str(text).map_err(|e| TrackerError::Decode(e.to_string()))?;
    Ok(frame.block.map(|b| b.height))
}

/// Why one listening session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disconnect {
    /// Shutdown requested; do not reconnect.
    Cancelled,
    /// Remote closed or reset the socket.
    Remote,
    /// Keepalive saw no response within the timeout.
    KeepaliveTimeout,
    /// Every consumer of block events is gone.
    ConsumerGone,
}

pub struct BlockFeed {
    network: Network,
    url: String,
    timeout: Duration,
    reconnect_delay: Duration,
    events: mpsc::Sender<NewBlockEvent>,
    shutdown: ShutdownSignal,
}

impl BlockFeed {
    pub fn new(
        network: Network,
        url: impl Into<String>,
        events: mpsc::Sender<NewBlockEvent>,
        shutdown: ShutdownSignal,
    ) -> Self {
        Self {
            network,
            url: url.into(),
            timeout: DEFAULT_KEEPALIVE_TIMEOUT,
            reconnect_delay: Duration::from_secs(1),
            events,
            shutdown,
        }
    }

    pub fn with_keepalive_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    /// Supervisor loop: keeps a session alive until shutdown.
    pub async fn run(mut self) {
        info!(network = %self.network, url = %self.url, "Starting block feed");
        loop {
            if self.shutdown.is_shutdown_requested() {
                break;
            }
            match self.listen_once().await {
                Ok(Disconnect::Cancelled) | Ok(Disconnect::ConsumerGone) => break,
                Ok(reason) => {
                    info!(network = %self.network, ?reason, "Block feed disconnected, reconnecting");
                }
                Err(TrackerError::Connect(e)) => {
                    warn!(network = %self.network, error = %e, "Block feed connect failed");
                    tokio::select! {
                        _ = self.shutdown.wait() => break,
                        _ = tokio::time::sleep(self.reconnect_delay) => {}
                    }
                }
                Err(e) => {
                    warn!(network = %self.network, error = %e, "Block feed session failed, restarting");
                }
            }
        }
        info!(network = %self.network, "Block feed stopped");
    }

    /// Connect, subscribe and read until the session ends.
    pub async fn listen_once(&mut self) -> Result<Disconnect, TrackerError> {
        info!(network = %self.network, url = %self.url, "Connecting to block feed");
        let (ws, _) = tokio::select! {
            _ = self.shutdown.wait() => return Ok(Disconnect::Cancelled),
            conn = connect_async(self.url.as_str()) => {
                conn.map_err(|e| TrackerError::Connect(e.to_string()))?
            }
        };
        let (mut write, read) = ws.split();

        let directive =
            serde_json::to_string(&WANT_BLOCKS).map_err(|e| TrackerError::Decode(e.to_string()))?;
        write.send(Message::Text(directive)).await?;
        info!(network = %self.network, "Subscribed to blocks");

        let liveness = Arc::new(Liveness::new());
        let dead = Arc::new(Notify::new());
        let keepalive = tokio::spawn(keep_alive(
            write,
            self.timeout,
            liveness.clone(),
            dead.clone(),
            self.network,
        ));

        let outcome = self.read_loop(read, &liveness, &dead).await;
        keepalive.abort();
        outcome
    }

    async fn read_loop(
        &mut self,
        mut read: WsRead,
        liveness: &Liveness,
        dead: &Notify,
    ) -> Result<Disconnect, TrackerError> {
        loop {
            let frame = tokio::select! {
                _ = self.shutdown.wait() => return Ok(Disconnect::Cancelled),
                _ = dead.notified() => return Ok(Disconnect::KeepaliveTimeout),
                frame = read.next() => frame,
            };

            let message = match frame {
                None => return Ok(Disconnect::Remote),
                Some(Ok(message)) => message,
                Some(Err(e)) if is_abnormal_closure(&e) => {
                    info!(network = %self.network, error = %e, "Remote closed the connection");
                    return Ok(Disconnect::Remote);
                }
                Some(Err(e)) => return Err(e.into()),
            };
            liveness.touch();

            match message {
                Message::Text(text) => match decode_block_frame(&text) {
                    Ok(Some(height)) => {
                        let event = NewBlockEvent {
                            network: self.network,
                            height,
                        };
                        debug!(network = %self.network, height, "Block received");
                        tokio::select! {
                            _ = self.shutdown.wait() => return Ok(Disconnect::Cancelled),
                            sent = self.events.send(event) => {
                                if sent.is_err() {
                                    return Ok(Disconnect::ConsumerGone);
                                }
                            }
                        }
                    }
                    Ok(None) => {}
                    Err(e) => {
                        warn!(network = %self.network, error = %e, "Skipping malformed frame");
                    }
                },
                Message::Close(frame) => {
                    info!(network = %self.network, ?frame, "Server sent close");
                    return Ok(Disconnect::Remote);
                }
                _ => {}
            }
        }
    }
}

/// Last moment anything arrived from the server.
struct Liveness {
    last: Mutex<Instant>,
}

impl Liveness {
    fn new() -> Self {
        Self {
            last: Mutex::new(Instant::now()),
        }
    }

    fn touch(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Instant::now();
    }

    fn silent_for(&self) -> Duration {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .elapsed()
    }
}

async fn keep_alive(
    mut write: WsWrite,
    timeout: Duration,
    liveness: Arc<Liveness>,
    dead: Arc<Notify>,
    network: Network,
) {
    let ping_every = timeout / 2;
    let mut last_ping: Option<Instant> = None;
    loop {
        if last_ping.is_none_or(|at| at.elapsed() >= ping_every) {
            if write.send(Message::Ping(b"keepalive".to_vec())).await.is_err() {
                dead.notify_one();
                return;
            }
            debug!(%network, "Keepalive ping sent");
            last_ping = Some(Instant::now());
        }
        tokio::time::sleep(timeout / 4).await;
        if liveness.silent_for() > timeout {
            warn!(%network, "No response within keepalive timeout, closing");
            dead.notify_one();
            let _ = write.close().await;
            return;
        }
    }
}
