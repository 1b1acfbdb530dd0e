//! Line-oriented command ingress.
//!
//! Each line is one watch command. A leading `#channel` token names where
//! the acknowledgement and every later notification go; otherwise the
//! configured default destination is used.

use super::command::{parse_command, render_ack};
use super::model::WatchRequest;
use super::network::Network;
use super::notify::{Notification, NotificationKind, NotificationSink, dispatch};
use super::shutdown::ShutdownSignal;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Split a line into its destination and command text.
pub fn split_destination<'a>(line: &'a str, default_destination: &'a str) -> (&'a str, &'a str) {
    let line = line.trim();
    match line.split_once(char::is_whitespace) {
        Some((head, rest)) if head.len() > 1 && head.starts_with('#') => (head, rest.trim_start()),
        None if line.len() > 1 && line.starts_with('#') => (line, ""),
        _ => (default_destination, line),
    }
}

/// Parse one line, acknowledge it, and build the request on success.
pub fn handle_line(
    line: &str,
    default_destination: &str,
    default_target: u32,
    sink: &Arc<dyn NotificationSink>,
) -> Option<WatchRequest> {
    let (destination, text) = split_destination(line, default_destination);
    let parsed = parse_command(text);
    let ack = render_ack(&parsed, default_target);

    let (tx_id, network) = match &parsed {
        Ok(cmd) => (cmd.tx_id.clone(), cmd.network),
        Err(_) => (String::new(), Network::default()),
    };
    dispatch(
        sink,
        Notification {
            destination: destination.to_string(),
            tx_id,
            network,
            kind: NotificationKind::Acknowledgement { text: ack },
        },
    );

    match parsed {
        Ok(cmd) => Some(cmd.into_request(destination)),
        Err(e) => {
            warn!(destination, error = %e, "Rejected watch command");
            None
        }
    }
}

/// Read commands until EOF or shutdown, forwarding accepted requests.
pub async fn run_ingress<R>(
    reader: R,
    default_destination: String,
    default_target: u32,
    sink: Arc<dyn NotificationSink>,
    requests: mpsc::UnboundedSender<WatchRequest>,
    mut shutdown: ShutdownSignal,
) where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.wait() => return,
            line = lines.next_line() => line,
        };
        let line = match line {
            Ok(Some(line)) => line,
            Ok(None) => {
                info!("Command input closed");
                return;
            }
            Err(e) => {
                warn!(error = %e, "Failed to read command input");
                return;
            }
        };
        if line.trim().is_empty() {
            continue;
        }
        let Some(request) = handle_line(&line, &default_destination, default_target, &sink) else {
            continue;
        };
        if requests.send(request).is_err() {
            return;
        }
    }
}
