//! Transport abstraction layer for Tether
//!
//! Defines the capability traits every concrete transport implements and the
//! error type shared by connect, send and receive primitives.

use async_trait::async_trait;
use std::fmt;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Kind of stream a link runs over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    /// TCP socket
    Tcp,
    /// In-process byte pipe (tests, loopback)
    Loopback,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Tcp => write!(f, "TCP"),
            TransportKind::Loopback => write!(f, "Loopback"),
        }
    }
}

/// Errors raised by the underlying connect/send/receive primitives
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("I/O error ({kind:?}): {message}")]
    Io { kind: io::ErrorKind, message: String },

    #[error("Peer closed the connection")]
    PeerClosed,

    #[error("Connection reset by peer: {0}")]
    PeerReset(String),

    #[error("Timed out after {0:?}")]
    Timeout(Duration),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Not connected")]
    NotConnected,

    #[error("Encoding error: {0}")]
    Encoding(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(&'static str),
}

impl TransportError {
    /// True when the remote end has gone away (graceful close or reset)
    pub fn is_peer_disconnect(&self) -> bool {
        matches!(
            self,
            TransportError::PeerClosed | TransportError::PeerReset(_) | TransportError::NotConnected
        )
    }

    /// Capability mismatches are never retried
    pub fn is_retryable(&self) -> bool {
        !matches!(self, TransportError::Unsupported(_))
    }
}

impl From<io::Error> for TransportError {
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::BrokenPipe => TransportError::PeerReset(err.to_string()),
            io::ErrorKind::UnexpectedEof => TransportError::PeerClosed,
            kind => TransportError::Io {
                kind,
                message: err.to_string(),
            },
        }
    }
}

/// Establishes and tears down the underlying connection.
///
/// Implementations replace their stream on every successful `establish`;
/// `teardown` must be safe to call when nothing is connected.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Perform the transport-specific connect handshake
    async fn establish(&self) -> Result<(), TransportError>;

    /// Graceful shutdown followed by a hard close
    async fn teardown(&self);

    /// Short description used in log lines
    fn describe(&self) -> String;
}

/// One-way delivery of `T`
#[async_trait]
pub trait Outbound<T: Send + Sync>: Link {
    async fn send_one(&self, message: &T) -> Result<(), TransportError>;
}

/// Send-then-receive-one plus a standalone receive for listening.
///
/// `receive_one` returns `Ok(None)` when the peer closed the connection
/// (a zero-length read).
#[async_trait]
pub trait Duplex<T: Send + Sync, U: Send>: Outbound<T> {
    async fn receive_one(&self) -> Result<Option<U>, TransportError>;

    async fn exchange(&self, message: &T) -> Result<U, TransportError> {
        self.send_one(message).await?;
        self.receive_one().await?.ok_or(TransportError::PeerClosed)
    }
}
