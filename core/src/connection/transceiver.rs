//! Transceiver: request/response plus optional background listening
//!
//! Wraps a [`Sender`] and adds `communicate` (send, then receive one reply)
//! and a toggleable listener that surfaces unsolicited inbound messages as
//! [`ListenEvent`]s. The listener is (re)started after every successful
//! `connect` while listening is enabled, and stopped by `disconnect`,
//! `set_listening(false)`, a peer close, or dropping the transceiver.
//!
//! Do not mix listening with `communicate` on the same instance: both race for
//! the same receive half and replies may be delivered to either side.

use super::connector::Connector;
use super::fault::ConnectionFault;
use super::listener::{self, ListenEvent, ListenSlot, ListenerContext};
use super::retry::{self, Operation, RetryPolicy};
use super::sender::Sender;
use super::state::ConnectionEvent;
use super::EVENT_CAPACITY;
use crate::transport::Duplex;
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};

pub struct Transceiver<T, U, L>
where
    T: Send + Sync + 'static,
    U: Clone + Send + 'static,
    L: Duplex<T, U>,
{
    sender: Sender<T, L>,
    slot: Arc<Mutex<ListenSlot>>,
    events: broadcast::Sender<ListenEvent<U>>,
    _reply: PhantomData<fn() -> U>,
}

impl<T, U, L> Transceiver<T, U, L>
where
    T: Send + Sync + 'static,
    U: Clone + Send + 'static,
    L: Duplex<T, U>,
{
    pub fn new(link: L) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender: Sender::new(link),
            slot: Arc::new(Mutex::new(ListenSlot::default())),
            events,
            _reply: PhantomData,
        }
    }

    pub fn sender(&self) -> &Sender<T, L> {
        &self.sender
    }

    pub fn connector(&self) -> &Connector<L> {
        self.sender.connector()
    }

    pub fn link(&self) -> &Arc<L> {
        self.sender.link()
    }

    pub fn is_connected(&self) -> bool {
        self.sender.is_connected()
    }

    pub fn subscribe_connection(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.sender.subscribe()
    }

    pub fn subscribe_listen(&self) -> broadcast::Receiver<ListenEvent<U>> {
        self.events.subscribe()
    }

    /// Connect, restarting the listener afterwards if listening is enabled
    pub async fn connect(&self, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        self.halt_listener().await;
        self.sender.connect(policy).await?;

        let mut slot = self.slot.lock();
        if slot.enabled {
            self.start_locked(&mut slot);
        }
        Ok(())
    }

    /// Stop the listener (keeping the intent) and disconnect
    pub async fn disconnect(&self) {
        self.halt_listener().await;
        self.sender.disconnect().await;
    }

    pub async fn send(&self, message: &T, policy: &RetryPolicy) -> Result<(), ConnectionFault> {
        self.sender.send(message, policy).await
    }

    /// Send `message` and wait for exactly one reply, trying
    /// `policy.attempts() + 1` times
    pub async fn communicate(&self, message: &T, policy: &RetryPolicy) -> Result<U, ConnectionFault> {
        let link = self.link().as_ref();
        let reply = retry::execute(
            Operation::Communicate,
            policy,
            self.connector().state(),
            move |attempt| {
                debug!("Communicating with {} (attempt {})", link.describe(), attempt);
                link.exchange(message)
            },
        )
        .await?;
        debug!("Reply received from {}", link.describe());
        Ok(reply)
    }

    /// Whether listening has been requested
    pub fn listening(&self) -> bool {
        self.slot.lock().enabled
    }

    /// Whether a listening loop is currently running
    pub fn is_listener_running(&self) -> bool {
        self.slot.lock().is_running()
    }

    /// Enable or disable listening.
    ///
    /// Enabling while connected starts the loop at once; while disconnected it
    /// only records the intent. Disabling cancels the loop and returns after
    /// it has exited. Setting the current value is a no-op.
    pub async fn set_listening(&self, enabled: bool) {
        if enabled {
            let mut slot = self.slot.lock();
            if slot.enabled {
                return;
            }
            slot.enabled = true;
            if self.is_connected() {
                self.start_locked(&mut slot);
            } else {
                debug!("Listening requested while disconnected; deferring until connect");
            }
            return;
        }

        let running = {
            let mut slot = self.slot.lock();
            if !slot.enabled && !slot.is_running() {
                return;
            }
            slot.enabled = false;
            slot.running.take()
        };
        if let Some(listener) = running {
            listener.stop().await;
            info!("Listening stopped on {}", self.link().describe());
        }
    }

    fn start_locked(&self, slot: &mut ListenSlot) {
        let context = ListenerContext {
            link: Arc::clone(self.link()),
            state: Arc::clone(self.connector().state()),
            events: self.events.clone(),
            slot: Arc::clone(&self.slot),
        };
        listener::start_locked::<T, U, L>(slot, &context);
    }

    /// Stop any running loop without touching the intent
    async fn halt_listener(&self) {
        let running = self.slot.lock().running.take();
        if let Some(listener) = running {
            listener.stop().await;
        }
    }
}

impl<T, U, L> Drop for Transceiver<T, U, L>
where
    T: Send + Sync + 'static,
    U: Clone + Send + 'static,
    L: Duplex<T, U>,
{
    fn drop(&mut self) {
        if let Some(listener) = self.slot.lock().running.take() {
            listener.cancel();
        }
    }
}
