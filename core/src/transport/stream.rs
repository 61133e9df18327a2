//! Stream-backed byte links
//!
//! A [`StreamLink`] owns one duplex byte stream produced by a [`Dialer`].
//! The stream is split into independently locked read and write halves so a
//! pending listener receive never blocks a foreground send. Every successful
//! `establish` replaces both halves with a freshly dialed stream.

use crate::transport::abstraction::{Duplex, Link, Outbound, TransportError, TransportKind};
use async_trait::async_trait;
use tokio::io::{
    AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, DuplexStream, ReadHalf, WriteHalf,
};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Mutex};
use tracing::debug;

/// Default receive buffer size for byte links
pub const DEFAULT_BUFFER_SIZE: usize = 1024;

/// Produces a connected stream for each connect attempt
#[async_trait]
pub trait Dialer: Send + Sync + 'static {
    type Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    async fn dial(&self, options: &LinkOptions) -> Result<Self::Stream, TransportError>;

    fn kind(&self) -> TransportKind;

    fn target(&self) -> String;
}

/// Per-link tuning
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkOptions {
    /// Size of the buffer allocated for every receive
    pub buffer_size: usize,
    /// Disable Nagle's algorithm on TCP sockets
    pub nodelay: bool,
    /// Link only supports one-way delivery; receives are rejected
    pub send_only: bool,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            buffer_size: DEFAULT_BUFFER_SIZE,
            nodelay: true,
            send_only: false,
        }
    }
}

/// Dials a TCP endpoint
#[derive(Debug, Clone)]
pub struct TcpDialer {
    address: String,
}

impl TcpDialer {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
        }
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    type Stream = TcpStream;

    async fn dial(&self, options: &LinkOptions) -> Result<TcpStream, TransportError> {
        let dial_addr = self
            .address
            .strip_prefix("tcp://")
            .unwrap_or(&self.address);
        let stream = TcpStream::connect(dial_addr).await?;
        stream.set_nodelay(options.nodelay)?;
        Ok(stream)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Tcp
    }

    fn target(&self) -> String {
        self.address.clone()
    }
}

/// In-process dialer: every dial creates a `tokio::io::duplex` pipe and hands
/// the far end to the paired [`DuplexAcceptor`].
#[derive(Debug)]
pub struct DuplexDialer {
    max_buf_size: usize,
    accepted: mpsc::UnboundedSender<DuplexStream>,
}

/// Receives the server ends of pipes dialed through a [`DuplexDialer`]
#[derive(Debug)]
pub struct DuplexAcceptor {
    incoming: mpsc::UnboundedReceiver<DuplexStream>,
}

impl DuplexDialer {
    pub fn pair(max_buf_size: usize) -> (Self, DuplexAcceptor) {
        let (accepted, incoming) = mpsc::unbounded_channel();
        (
            Self {
                max_buf_size,
                accepted,
            },
            DuplexAcceptor { incoming },
        )
    }
}

impl DuplexAcceptor {
    /// Wait for the next dialed pipe; `None` once the dialer is gone
    pub async fn accept(&mut self) -> Option<DuplexStream> {
        self.incoming.recv().await
    }
}

#[async_trait]
impl Dialer for DuplexDialer {
    type Stream = DuplexStream;

    async fn dial(&self, _options: &LinkOptions) -> Result<DuplexStream, TransportError> {
        let (client, server) = tokio::io::duplex(self.max_buf_size);
        self.accepted.send(server).map_err(|_| TransportError::Io {
            kind: std::io::ErrorKind::ConnectionRefused,
            message: "loopback acceptor dropped".to_string(),
        })?;
        Ok(client)
    }

    fn kind(&self) -> TransportKind {
        TransportKind::Loopback
    }

    fn target(&self) -> String {
        "loopback".to_string()
    }
}

/// Byte link over a dialed stream
pub struct StreamLink<D: Dialer> {
    dialer: D,
    options: LinkOptions,
    reader: Mutex<Option<ReadHalf<D::Stream>>>,
    writer: Mutex<Option<WriteHalf<D::Stream>>>,
}

impl StreamLink<TcpDialer> {
    /// Byte link to a TCP address with default options
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(TcpDialer::new(address), LinkOptions::default())
    }
}

impl<D: Dialer> StreamLink<D> {
    pub fn new(dialer: D, options: LinkOptions) -> Self {
        Self {
            dialer,
            options,
            reader: Mutex::new(None),
            writer: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &LinkOptions {
        &self.options
    }

    pub fn dialer(&self) -> &D {
        &self.dialer
    }

    /// Whether a stream is currently installed
    pub async fn has_stream(&self) -> bool {
        self.writer.lock().await.is_some()
    }

    /// Fails with `Unsupported` on a send-only link
    pub fn ensure_receivable(&self) -> Result<(), TransportError> {
        if self.options.send_only {
            return Err(TransportError::Unsupported("receive on a send-only link"));
        }
        Ok(())
    }

    /// Write the whole buffer and flush
    pub async fn send_bytes(&self, bytes: &[u8]) -> Result<(), TransportError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(TransportError::NotConnected)?;
        writer.write_all(bytes).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Read once into a fresh buffer; `None` signals the peer closed
    pub async fn receive_bytes(&self) -> Result<Option<Vec<u8>>, TransportError> {
        self.ensure_receivable()?;
        let mut guard = self.reader.lock().await;
        let reader = guard.as_mut().ok_or(TransportError::NotConnected)?;
        let mut buf = vec![0u8; self.options.buffer_size];
        let filled = reader.read(&mut buf).await?;
        if filled == 0 {
            return Ok(None);
        }
        buf.truncate(filled);
        Ok(Some(buf))
    }
}

#[async_trait]
impl<D: Dialer> Link for StreamLink<D> {
    async fn establish(&self) -> Result<(), TransportError> {
        let stream = self.dialer.dial(&self.options).await?;
        let (read_half, write_half) = tokio::io::split(stream);

        let previous = {
            let mut writer = self.writer.lock().await;
            let mut reader = self.reader.lock().await;
            *reader = Some(read_half);
            writer.replace(write_half)
        };
        if let Some(mut old) = previous {
            let _ = old.shutdown().await;
        }

        debug!("{} link established to {}", self.dialer.kind(), self.dialer.target());
        Ok(())
    }

    async fn teardown(&self) {
        if let Some(mut writer) = self.writer.lock().await.take() {
            if let Err(e) = writer.shutdown().await {
                debug!("Graceful shutdown of {} failed: {}", self.dialer.target(), e);
            }
        }
        self.reader.lock().await.take();
    }

    fn describe(&self) -> String {
        format!("{} {}", self.dialer.kind(), self.dialer.target())
    }
}

#[async_trait]
impl<D: Dialer> Outbound<Vec<u8>> for StreamLink<D> {
    async fn send_one(&self, message: &Vec<u8>) -> Result<(), TransportError> {
        self.send_bytes(message).await
    }
}

#[async_trait]
impl<D: Dialer> Duplex<Vec<u8>, Vec<u8>> for StreamLink<D> {
    async fn receive_one(&self) -> Result<Option<Vec<u8>>, TransportError> {
        self.receive_bytes().await
    }

    async fn exchange(&self, message: &Vec<u8>) -> Result<Vec<u8>, TransportError> {
        // Nothing goes on the wire when no reply could ever be read
        self.ensure_receivable()?;
        self.send_bytes(message).await?;
        self.receive_bytes().await?.ok_or(TransportError::PeerClosed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = LinkOptions::default();
        assert_eq!(options.buffer_size, 1024);
        assert!(options.nodelay);
        assert!(!options.send_only);
    }

    #[tokio::test]
    async fn test_send_without_stream_is_not_connected() {
        let (dialer, _acceptor) = DuplexDialer::pair(64);
        let link = StreamLink::new(dialer, LinkOptions::default());
        assert_eq!(
            link.send_bytes(b"hi").await,
            Err(TransportError::NotConnected)
        );
        assert_eq!(link.receive_bytes().await, Err(TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_loopback_send_and_receive() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let link = StreamLink::new(dialer, LinkOptions::default());
        link.establish().await.unwrap();

        let mut server = acceptor.accept().await.unwrap();
        link.send_one(&b"ping".to_vec()).await.unwrap();
        let mut buf = [0u8; 4];
        server.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"ping");

        server.write_all(b"pong").await.unwrap();
        assert_eq!(link.receive_one().await.unwrap(), Some(b"pong".to_vec()));
    }

    #[tokio::test]
    async fn test_receive_returns_none_when_peer_closes() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let link = StreamLink::new(dialer, LinkOptions::default());
        link.establish().await.unwrap();
        drop(acceptor.accept().await.unwrap());

        assert_eq!(link.receive_one().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_receive_respects_buffer_size() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let options = LinkOptions {
            buffer_size: 3,
            ..Default::default()
        };
        let link = StreamLink::new(dialer, options);
        link.establish().await.unwrap();
        let mut server = acceptor.accept().await.unwrap();
        server.write_all(b"abcdef").await.unwrap();

        assert_eq!(link.receive_one().await.unwrap(), Some(b"abc".to_vec()));
        assert_eq!(link.receive_one().await.unwrap(), Some(b"def".to_vec()));
    }

    #[tokio::test]
    async fn test_send_only_link_rejects_receive() {
        let (dialer, _acceptor) = DuplexDialer::pair(64);
        let options = LinkOptions {
            send_only: true,
            ..Default::default()
        };
        let link = StreamLink::new(dialer, options);
        let err = link.receive_one().await.unwrap_err();
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_send_only_exchange_writes_nothing() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let options = LinkOptions {
            send_only: true,
            ..Default::default()
        };
        let link = StreamLink::new(dialer, options);
        link.establish().await.unwrap();
        let mut server = acceptor.accept().await.unwrap();

        let err = link.exchange(&b"ping".to_vec()).await.unwrap_err();
        assert!(matches!(err, TransportError::Unsupported(_)));

        link.teardown().await;
        let mut received = Vec::new();
        server.read_to_end(&mut received).await.unwrap();
        assert!(received.is_empty());
    }

    #[tokio::test]
    async fn test_teardown_drops_stream() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let link = StreamLink::new(dialer, LinkOptions::default());
        link.establish().await.unwrap();
        let mut server = acceptor.accept().await.unwrap();
        assert!(link.has_stream().await);

        link.teardown().await;
        assert!(!link.has_stream().await);
        let mut buf = [0u8; 1];
        assert_eq!(server.read(&mut buf).await.unwrap(), 0);

        // Second teardown is harmless
        link.teardown().await;
    }

    #[tokio::test]
    async fn test_reestablish_replaces_stream() {
        let (dialer, mut acceptor) = DuplexDialer::pair(64);
        let link = StreamLink::new(dialer, LinkOptions::default());
        link.establish().await.unwrap();
        let mut first = acceptor.accept().await.unwrap();
        link.establish().await.unwrap();
        let mut second = acceptor.accept().await.unwrap();

        let mut buf = [0u8; 1];
        assert_eq!(first.read(&mut buf).await.unwrap(), 0);
        link.send_bytes(b"x").await.unwrap();
        second.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"x");
    }

    #[tokio::test]
    async fn test_dial_fails_when_acceptor_dropped() {
        let (dialer, acceptor) = DuplexDialer::pair(64);
        drop(acceptor);
        let link = StreamLink::new(dialer, LinkOptions::default());
        assert!(matches!(
            link.establish().await,
            Err(TransportError::Io { .. })
        ));
    }

    #[tokio::test]
    async fn test_tcp_link_roundtrip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 5];
            stream.read_exact(&mut buf).await.unwrap();
            stream.write_all(&buf).await.unwrap();
        });

        let link = StreamLink::tcp(format!("tcp://{}", addr));
        link.establish().await.unwrap();
        let reply = link.exchange(&b"hello".to_vec()).await.unwrap();
        assert_eq!(reply, b"hello".to_vec());
        assert!(link.describe().starts_with("TCP"));
    }
}
