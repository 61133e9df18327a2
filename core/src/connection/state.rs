//! Connected/disconnected flag with lifecycle notifications

use parking_lot::Mutex;
use std::fmt;
use tokio::sync::broadcast;
use tracing::info;

use super::EVENT_CAPACITY;

/// Lifecycle notifications raised on state transitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionEvent {
    Established,
    Lost,
}

impl fmt::Display for ConnectionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionEvent::Established => write!(f, "ConnectionEstablished"),
            ConnectionEvent::Lost => write!(f, "ConnectionLost"),
        }
    }
}

/// Boolean connection flag.
///
/// Only transitions publish an event; setting the current value again is a
/// no-op. The event is sent while the flag's lock is held so subscribers see
/// transitions in the order they happened.
pub struct ConnectionState {
    connected: Mutex<bool>,
    events: broadcast::Sender<ConnectionEvent>,
}

impl ConnectionState {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connected: Mutex::new(false),
            events,
        }
    }

    pub fn is_connected(&self) -> bool {
        *self.connected.lock()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.events.subscribe()
    }

    /// Returns `true` when the value actually changed
    pub(crate) fn set_connected(&self, connected: bool) -> bool {
        let mut current = self.connected.lock();
        if *current == connected {
            return false;
        }
        *current = connected;

        let event = if connected {
            ConnectionEvent::Established
        } else {
            ConnectionEvent::Lost
        };
        info!("Connection state changed: {}", event);
        // No subscribers is fine
        let _ = self.events.send(event);
        true
    }
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionState")
            .field("connected", &self.is_connected())
            .finish()
    }
}
