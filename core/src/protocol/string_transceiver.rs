//! StringTransceiver: validated request/response over a string channel
//!
//! Every attempt reconnects if needed, sends the request, reads one reply and
//! checks it against a [`Framing`]. Transport failures and rejected replies
//! are both retried after `retry_delay`; running out of attempts yields
//! [`Reply::Exhausted`] instead of an error.

use super::framing::Framing;
use crate::connection::{ConnectionFault, RetryPolicy, Transceiver, EVENT_CAPACITY};
use crate::transport::{Duplex, TransportError};
use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Default bound on each send and each receive
pub const DEFAULT_IO_TIMEOUT: Duration = Duration::from_secs(5);

/// Outcome of a validated exchange
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// A reply that passed every framing check
    Valid(String),
    /// Every attempt failed at the transport or validation step
    Exhausted { attempts: u32 },
}

impl Reply {
    pub fn is_valid(&self) -> bool {
        matches!(self, Reply::Valid(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Reply::Valid(text) => Some(text),
            Reply::Exhausted { .. } => None,
        }
    }

    pub fn into_string(self) -> Option<String> {
        match self {
            Reply::Valid(text) => Some(text),
            Reply::Exhausted { .. } => None,
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reply::Valid(text) => write!(f, "{}", text),
            Reply::Exhausted { attempts } => write!(f, "<no valid reply after {} attempt(s)>", attempts),
        }
    }
}

/// Raised after every `communicate`, including failed ones
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommunicationEvent {
    pub request: String,
    pub reply: Reply,
}

/// The transceiver capabilities the string protocol relies on
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TextChannel: Send + Sync {
    fn is_connected(&self) -> bool;

    async fn reconnect(&self, policy: &RetryPolicy) -> Result<(), ConnectionFault>;

    async fn send_text(&self, message: &str) -> Result<(), TransportError>;

    /// `Ok(None)` when the peer closed the connection
    async fn receive_text(&self) -> Result<Option<String>, TransportError>;

    fn set_connected(&self, connected: bool);
}

#[async_trait]
impl<L> TextChannel for Transceiver<String, String, L>
where
    L: Duplex<String, String>,
{
    fn is_connected(&self) -> bool {
        Transceiver::is_connected(self)
    }

    async fn reconnect(&self, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        self.connect(policy).await
    }

    async fn send_text(&self, message: &str) -> Result<(), TransportError> {
        self.link().send_one(&message.to_owned()).await
    }

    async fn receive_text(&self) -> Result<Option<String>, TransportError> {
        self.link().receive_one().await
    }

    fn set_connected(&self, connected: bool) {
        self.connector().mark_connected(connected);
    }
}

pub struct StringTransceiver<C: TextChannel> {
    channel: Arc<C>,
    reconnect_policy: RetryPolicy,
    io_timeout: Duration,
    events: broadcast::Sender<CommunicationEvent>,
}

impl<C: TextChannel> StringTransceiver<C> {
    pub fn new(channel: Arc<C>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            channel,
            reconnect_policy: RetryPolicy::default().with_attempts(1),
            io_timeout: DEFAULT_IO_TIMEOUT,
            events,
        }
    }

    /// Policy for the single reconnect made before an attempt
    pub fn with_reconnect_policy(mut self, policy: RetryPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_io_timeout(mut self, io_timeout: Duration) -> Self {
        self.io_timeout = io_timeout;
        self
    }

    pub fn channel(&self) -> &Arc<C> {
        &self.channel
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommunicationEvent> {
        self.events.subscribe()
    }

    /// Send `message` and return the first reply accepted by `framing`
    pub async fn communicate(
        &self,
        message: &str,
        attempts: u32,
        retry_delay: Duration,
        framing: &Framing,
    ) -> Reply {
        let mut accepted = None;

        for attempt in 1..=attempts {
            debug!("Communicate attempt {}/{}: {:?}", attempt, attempts, message);

            if !self.channel.is_connected() {
                if let Err(fault) = self.channel.reconnect(&self.reconnect_policy).await {
                    warn!("Reconnect before attempt {} failed: {}", attempt, fault);
                    continue;
                }
            }

            if let Err(err) = self.bounded(self.channel.send_text(message)).await {
                warn!("Send failed on attempt {}: {}", attempt, err);
                self.pause(attempt, attempts, retry_delay).await;
                continue;
            }
            info!("Message sent: {:?}", message);

            let received = match self.bounded(self.channel.receive_text()).await {
                Ok(Some(text)) => text,
                Ok(None) => {
                    warn!("Peer closed before replying on attempt {}", attempt);
                    self.pause(attempt, attempts, retry_delay).await;
                    continue;
                }
                Err(err) => {
                    warn!("Receive failed on attempt {}: {}", attempt, err);
                    self.pause(attempt, attempts, retry_delay).await;
                    continue;
                }
            };
            info!("Response received: {:?}", received);

            match framing.check(&received) {
                Ok(()) => {
                    accepted = Some(received);
                    break;
                }
                Err(rejection) => {
                    warn!("Reply rejected on attempt {}: {}", attempt, rejection);
                    self.pause(attempt, attempts, retry_delay).await;
                }
            }
        }

        let reply = match accepted {
            Some(text) => Reply::Valid(text),
            None => Reply::Exhausted { attempts },
        };
        self.channel.set_connected(reply.is_valid());
        let _ = self.events.send(CommunicationEvent {
            request: message.to_string(),
            reply: reply.clone(),
        });
        reply
    }

    async fn bounded<R>(
        &self,
        step: impl std::future::Future<Output = Result<R, TransportError>>,
    ) -> Result<R, TransportError> {
        tokio::time::timeout(self.io_timeout, step)
            .await
            .unwrap_or(Err(TransportError::Timeout(self.io_timeout)))
    }

    async fn pause(&self, attempt: u32, attempts: u32, retry_delay: Duration) {
        if attempt < attempts {
            tokio::time::sleep(retry_delay).await;
        }
    }
}
