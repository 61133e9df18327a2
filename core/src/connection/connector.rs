//! Connector: owns the connection state and the retried connect

use super::fault::ConnectionFault;
use super::retry::{self, Operation, RetryPolicy};
use super::state::{ConnectionEvent, ConnectionState};
use crate::transport::Link;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::info;

pub struct Connector<L: Link> {
    link: Arc<L>,
    state: Arc<ConnectionState>,
}

impl<L: Link> Connector<L> {
    pub fn new(link: L) -> Self {
        Self {
            link: Arc::new(link),
            state: Arc::new(ConnectionState::new()),
        }
    }

    pub fn link(&self) -> &Arc<L> {
        &self.link
    }

    pub(crate) fn state(&self) -> &Arc<ConnectionState> {
        &self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state.is_connected()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.state.subscribe()
    }

    /// Try `policy.attempts()` times to establish the link
    pub async fn connect(&self, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        let link = self.link.as_ref();
        info!("Connecting to {}", link.describe());
        retry::execute(Operation::Connect, policy, &self.state, move |_| {
            link.establish()
        })
        .await
    }

    /// Tear the link down and mark the state disconnected; idempotent
    pub async fn disconnect(&self) {
        self.link.teardown().await;
        if self.state.set_connected(false) {
            info!("Disconnected from {}", self.link.describe());
        }
    }

    /// Override the connected flag without touching the link
    pub(crate) fn mark_connected(&self, connected: bool) {
        self.state.set_connected(connected);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::TransportError;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use tokio::sync::broadcast::error::TryRecvError;

    /// Replays scripted establish results, then succeeds
    struct ScriptedLink {
        script: Mutex<VecDeque<Result<(), TransportError>>>,
        establishes: AtomicU32,
        teardowns: AtomicU32,
    }

    impl ScriptedLink {
        fn new(script: Vec<Result<(), TransportError>>) -> Self {
            Self {
                script: Mutex::new(script.into()),
                establishes: AtomicU32::new(0),
                teardowns: AtomicU32::new(0),
            }
        }

        fn always_failing() -> Self {
            Self::new(vec![Err(TransportError::NotConnected); 64])
        }
    }

    #[async_trait]
    impl Link for ScriptedLink {
        async fn establish(&self) -> Result<(), TransportError> {
            self.establishes.fetch_add(1, Ordering::SeqCst);
            self.script.lock().pop_front().unwrap_or(Ok(()))
        }

        async fn teardown(&self) {
            self.teardowns.fetch_add(1, Ordering::SeqCst);
        }

        fn describe(&self) -> String {
            "scripted".to_string()
        }
    }

    fn policy(attempts: u32) -> RetryPolicy {
        RetryPolicy::new(attempts, Duration::from_millis(1), Duration::from_millis(100)).unwrap()
    }

    #[tokio::test]
    async fn test_connect_exhaustion_tries_exactly_n_times() {
        for attempts in 1..=4 {
            let connector = Connector::new(ScriptedLink::always_failing());
            let mut events = connector.subscribe();

            let fault = connector.connect(&policy(attempts)).await.unwrap_err();

            assert_eq!(connector.link().establishes.load(Ordering::SeqCst), attempts);
            assert_eq!(fault.attempts_made, attempts);
            assert_eq!(fault.last_error(), Some(&TransportError::NotConnected));
            assert!(!connector.is_connected());
            // Never connected, so no lost transition either
            assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
        }
    }

    #[tokio::test]
    async fn test_connect_success_on_last_attempt() {
        let connector = Connector::new(ScriptedLink::new(vec![
            Err(TransportError::NotConnected),
            Err(TransportError::Timeout(Duration::from_millis(1))),
            Ok(()),
        ]));
        let mut events = connector.subscribe();

        connector.connect(&policy(3)).await.unwrap();

        assert!(connector.is_connected());
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Established);
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_failed_reconnect_fires_lost_once() {
        let connector = Connector::new(ScriptedLink::new(vec![Ok(())]));
        connector.connect(&policy(1)).await.unwrap();
        let mut events = connector.subscribe();

        *connector.link().script.lock() = vec![Err(TransportError::NotConnected); 3].into();
        connector.connect(&policy(3)).await.unwrap_err();

        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Lost);
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }

    #[tokio::test]
    async fn test_zero_attempts_raises_without_trying() {
        let connector = Connector::new(ScriptedLink::new(vec![]));
        let fault = connector.connect(&policy(0)).await.unwrap_err();
        assert_eq!(fault.attempts_made, 0);
        assert_eq!(connector.link().establishes.load(Ordering::SeqCst), 0);
        assert!(!connector.is_connected());
    }

    #[tokio::test]
    async fn test_disconnect_twice_raises_lost_once() {
        let connector = Connector::new(ScriptedLink::new(vec![]));
        connector.connect(&policy(1)).await.unwrap();
        let mut events = connector.subscribe();

        connector.disconnect().await;
        connector.disconnect().await;

        assert_eq!(connector.link().teardowns.load(Ordering::SeqCst), 2);
        assert_eq!(events.try_recv().unwrap(), ConnectionEvent::Lost);
        assert_eq!(events.try_recv(), Err(TryRecvError::Empty));
    }
}
