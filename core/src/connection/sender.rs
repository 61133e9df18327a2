//! Sender: one-way delivery on top of a [`Connector`]

use super::connector::Connector;
use super::fault::ConnectionFault;
use super::retry::{self, Operation, RetryPolicy};
use super::state::ConnectionEvent;
use crate::transport::Outbound;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::debug;

pub struct Sender<T, L>
where
    T: Send + Sync,
    L: Outbound<T>,
{
    connector: Connector<L>,
    _message: PhantomData<fn(&T)>,
}

impl<T, L> Sender<T, L>
where
    T: Send + Sync,
    L: Outbound<T>,
{
    pub fn new(link: L) -> Self {
        Self {
            connector: Connector::new(link),
            _message: PhantomData,
        }
    }

    pub fn connector(&self) -> &Connector<L> {
        &self.connector
    }

    pub fn link(&self) -> &Arc<L> {
        self.connector.link()
    }

    pub fn is_connected(&self) -> bool {
        self.connector.is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.connector.subscribe()
    }

    pub async fn connect(&self, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        self.connector.connect(policy).await
    }

    pub async fn disconnect(&self) {
        self.connector.disconnect().await
    }

    /// Deliver `message`, trying `policy.attempts() + 1` times
    pub async fn send(&self, message: &T, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        let link = self.connector.link().as_ref();
        retry::execute(Operation::Send, policy, self.connector.state(), move |attempt| {
            debug!("Sending message to {} (attempt {})", link.describe(), attempt);
            link.send_one(message)
        })
        .await?;
        debug!("Message sent to {}", link.describe());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Link, TransportError};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Records sent messages, failing the first `failures` sends
    #[derive(Default)]
    struct RecordingLink {
        failures: Mutex<u32>,
        sent: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Link for RecordingLink {
        async fn establish(&self) -> Result<(), TransportError> {
            Ok(())
        }

        async fn teardown(&self) {}

        fn describe(&self) -> String {
            "recording".to_string()
        }
    }

    #[async_trait]
    impl Outbound<String> for RecordingLink {
        async fn send_one(&self, message: &String) -> Result<(), TransportError> {
            let mut failures = self.failures.lock();
            if *failures > 0 {
                *failures -= 1;
                return Err(TransportError::PeerReset("reset".to_string()));
            }
            self.sent.lock().push(message.clone());
            Ok(())
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn test_send_marks_connected() {
        let sender = Sender::new(RecordingLink::default());
        let mut events = sender.subscribe();

        sender.send(&"hello".to_string(), &policy(0)).await.unwrap();

        assert!(sender.is_connected());
        assert_eq!(*sender.link().sent.lock(), vec!["hello".to_string()]);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Established);
    }

    #[tokio::test]
    async fn test_send_tries_attempts_plus_one() {
        let link = RecordingLink::default();
        *link.failures.lock() = 2;
        let sender = Sender::new(link);

        sender.send(&"late".to_string(), &policy(2)).await.unwrap();
        assert_eq!(*sender.link().sent.lock(), vec!["late".to_string()]);
    }

    #[tokio::test]
    async fn test_send_exhaustion_rethrows_transport_error() {
        let link = RecordingLink::default();
        *link.failures.lock() = 10;
        let sender = Sender::new(link);
        sender.connect(&policy(1)).await.unwrap();
        let mut events = sender.subscribe();

        let fault = sender.send(&"lost".to_string(), &policy(1)).await.unwrap_err();

        assert_eq!(fault.attempts_made, 2);
        assert!(matches!(fault.last_error(), Some(TransportError::PeerReset(_))));
        assert!(!sender.is_connected());
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Lost);
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
        assert_eq!(*sender.link().failures.lock(), 8);
    }
}
