//! String links: a byte link plus a text encoding
//!
//! Outbound strings are encoded before hitting the stream, inbound buffers
//! are decoded after every receive. A buffer that does not decode surfaces as
//! [`TransportError::Encoding`], which the listener reports and moves past.

use crate::transport::abstraction::{Duplex, Link, Outbound, TransportError};
use crate::transport::encoding::TextEncoding;
use crate::transport::stream::{Dialer, LinkOptions, StreamLink, TcpDialer};
use async_trait::async_trait;

pub struct TextLink<D: Dialer> {
    inner: StreamLink<D>,
    encoding: TextEncoding,
}

impl TextLink<TcpDialer> {
    /// UTF-8 string link to a TCP address
    pub fn tcp(address: impl Into<String>) -> Self {
        Self::new(StreamLink::tcp(address), TextEncoding::Utf8)
    }
}

impl<D: Dialer> TextLink<D> {
    pub fn new(inner: StreamLink<D>, encoding: TextEncoding) -> Self {
        Self { inner, encoding }
    }

    pub fn with_options(dialer: D, options: LinkOptions, encoding: TextEncoding) -> Self {
        Self::new(StreamLink::new(dialer, options), encoding)
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    pub fn bytes(&self) -> &StreamLink<D> {
        &self.inner
    }
}

#[async_trait]
impl<D: Dialer> Link for TextLink<D> {
    async fn establish(&self) -> Result<(), TransportError> {
        self.inner.establish().await
    }

    async fn teardown(&self) {
        self.inner.teardown().await
    }

    fn describe(&self) -> String {
        format!("{} ({})", self.inner.describe(), self.encoding)
    }
}

#[async_trait]
impl<D: Dialer> Outbound<String> for TextLink<D> {
    async fn send_one(&self, message: &String) -> Result<(), TransportError> {
        let bytes = self
            .encoding
            .encode(message)
            .map_err(|e| TransportError::Encoding(e.to_string()))?;
        self.inner.send_bytes(&bytes).await
    }
}

#[async_trait]
impl<D: Dialer> Duplex<String, String> for TextLink<D> {
    async fn receive_one(&self) -> Result<Option<String>, TransportError> {
        match self.inner.receive_bytes().await? {
            Some(bytes) => self
                .encoding
                .decode(&bytes)
                .map(Some)
                .map_err(|e| TransportError::Encoding(e.to_string())),
            None => Ok(None),
        }
    }

    async fn exchange(&self, message: &String) -> Result<String, TransportError> {
        self.inner.ensure_receivable()?;
        self.send_one(message).await?;
        self.receive_one().await?.ok_or(TransportError::PeerClosed)
    }
}
