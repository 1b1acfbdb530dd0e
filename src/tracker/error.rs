use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TrackerError {
    #[error("Websocket connection failed: {0}")]
    Connect(String),

    #[error("Websocket transport error: {0}")]
    Transport(#[from] tungstenite::Error),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Errors the remote end produces when it drops the socket without a
/// closing handshake (close code 1006). These are ordinary disconnects.
pub fn is_abnormal_closure(err: &tungstenite::Error) -> bool {
    use std::io::ErrorKind;
    use tungstenite::error::ProtocolError;

    match err {
        tungstenite::Error::ConnectionClosed | tungstenite::Error::AlreadyClosed => true,
        tungstenite::Error::Protocol(ProtocolError::ResetWithoutClosingHandshake) => true,
        tungstenite::Error::Io(io) => matches!(
            io.kind(),
            ErrorKind::ConnectionReset | ErrorKind::UnexpectedEof | ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tungstenite::error::ProtocolError;

    #[test]
    fn test_abnormal_closure_classification() {
        assert!(is_abnormal_closure(&tungstenite::Error::ConnectionClosed));
        assert!(is_abnormal_closure(&tungstenite::Error::Protocol(
            ProtocolError::ResetWithoutClosingHandshake
        )));
        assert!(is_abnormal_closure(&tungstenite::Error::Io(
            std::io::Error::from(std::io::ErrorKind::ConnectionReset)
        )));
        assert!(!is_abnormal_closure(&tungstenite::Error::Utf8));
    }
}
