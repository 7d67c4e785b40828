//! Link-layer error types

use std::net::SocketAddr;
use thiserror::Error;

/// Result alias for link operations.
pub type Result<T> = std::result::Result<T, LinkError>;

/// Link-layer error type
///
/// Only [`LinkError::Bind`] is fatal (at construction). Everything else is a
/// transient fault that the receive loops and the uplink gate log and move past.
#[derive(Error, Debug)]
pub enum LinkError {
    /// Local address or port unavailable
    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Outbound datagram could not be sent
    #[error("Send error: {0}")]
    Send(#[source] std::io::Error),

    /// Socket fault while receiving
    #[error("Receive error: {0}")]
    Receive(#[source] std::io::Error),

    /// Receive poll interval elapsed without a datagram
    ///
    /// Not a fault; loops use it to re-check their stop flags.
    #[error("Receive timeout")]
    Timeout,

    /// Malformed telemetry datagram
    #[error("Decode error: {0}")]
    Decode(String),

    /// Channel was already closed
    #[error("Channel closed")]
    ChannelClosed,

    /// Invalid configuration value or unreadable config file
    #[error("Config error: {0}")]
    Config(String),

    /// Receiver thread could not be started
    #[error("Failed to spawn {name} thread: {source}")]
    Thread {
        name: String,
        #[source]
        source: std::io::Error,
    },
}

impl LinkError {
    /// Map a raw receive error, folding poll expiry into [`LinkError::Timeout`].
    pub(crate) fn from_receive(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => Self::Timeout,
            _ => Self::Receive(err),
        }
    }

    /// Whether this error is a poll expiry rather than a fault.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::LinkError;
    use std::io;

    #[test]
    fn test_link_error_display() {
        let err = LinkError::Bind {
            addr: "127.0.0.1:8889".parse().unwrap(),
            source: io::Error::new(io::ErrorKind::AddrInUse, "in use"),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("127.0.0.1:8889") && msg.contains("in use"), "{}", msg);

        let err = LinkError::Decode("not ascii".to_string());
        assert_eq!(format!("{}", err), "Decode error: not ascii");

        assert_eq!(format!("{}", LinkError::ChannelClosed), "Channel closed");
        assert_eq!(format!("{}", LinkError::Timeout), "Receive timeout");
    }

    #[test]
    fn test_from_receive_folds_poll_expiry() {
        let err = LinkError::from_receive(io::Error::from(io::ErrorKind::WouldBlock));
        assert!(err.is_timeout());

        let err = LinkError::from_receive(io::Error::from(io::ErrorKind::TimedOut));
        assert!(err.is_timeout());

        let err = LinkError::from_receive(io::Error::from(io::ErrorKind::ConnectionRefused));
        match err {
            LinkError::Receive(e) => assert_eq!(e.kind(), io::ErrorKind::ConnectionRefused),
            other => panic!("Expected Receive variant, got {:?}", other),
        }
    }
}
