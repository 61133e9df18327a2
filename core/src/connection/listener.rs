//! Background listening loop
//!
//! A listener is an owned tokio task plus the [`CancellationToken`] that stops
//! it. The loop receives until cancelled, the peer closes, the connection is
//! reset, or the link turns out unable to receive at all. Any other receive
//! error is reported and the loop carries on.

use super::state::ConnectionState;
use crate::transport::{Duplex, TransportError};
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Notifications raised by the listening loop
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListenEvent<U> {
    /// Unsolicited inbound payload
    MessageReceived(U),
    /// Receive failed; the loop keeps running
    ListenError(TransportError),
    /// Peer closed or reset the connection; the loop has ended
    ListenDisconnected,
}

impl<U> fmt::Display for ListenEvent<U> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ListenEvent::MessageReceived(_) => write!(f, "MessageReceived"),
            ListenEvent::ListenError(err) => write!(f, "ListenError {{ error: {} }}", err),
            ListenEvent::ListenDisconnected => write!(f, "ListenDisconnected"),
        }
    }
}

/// Handle to a running loop
pub(crate) struct Listener {
    generation: u64,
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Listener {
    /// Signal the loop to stop; safe to call repeatedly
    pub(crate) fn cancel(&self) {
        self.token.cancel();
    }

    /// Cancel and wait until the loop has exited
    pub(crate) async fn stop(self) {
        self.token.cancel();
        if let Err(e) = self.handle.await {
            if e.is_panic() {
                warn!("Listener task panicked: {}", e);
            }
        }
    }
}

/// Listening intent plus the loop currently serving it
#[derive(Default)]
pub(crate) struct ListenSlot {
    pub(crate) enabled: bool,
    pub(crate) running: Option<Listener>,
    generation: u64,
}

impl ListenSlot {
    pub(crate) fn is_running(&self) -> bool {
        self.running.is_some()
    }
}

/// Everything a loop needs, cloned into the spawned task
pub(crate) struct ListenerContext<L, U> {
    pub(crate) link: Arc<L>,
    pub(crate) state: Arc<ConnectionState>,
    pub(crate) events: broadcast::Sender<ListenEvent<U>>,
    pub(crate) slot: Arc<Mutex<ListenSlot>>,
}

impl<L, U> Clone for ListenerContext<L, U> {
    fn clone(&self) -> Self {
        Self {
            link: Arc::clone(&self.link),
            state: Arc::clone(&self.state),
            events: self.events.clone(),
            slot: Arc::clone(&self.slot),
        }
    }
}

/// Start a loop into `slot` unless one is already running.
///
/// The caller holds the slot lock; the spawned task only takes it again on
/// its own peer-disconnect path.
pub(crate) fn start_locked<T, U, L>(slot: &mut ListenSlot, context: &ListenerContext<L, U>)
where
    T: Send + Sync + 'static,
    U: Clone + Send + 'static,
    L: Duplex<T, U>,
{
    if slot.running.is_some() {
        return;
    }
    slot.generation += 1;
    let generation = slot.generation;
    let token = CancellationToken::new();
    let handle = tokio::spawn(listen_loop::<T, U, L>(
        context.clone(),
        generation,
        token.clone(),
    ));
    debug!("Listener {} started on {}", generation, context.link.describe());
    slot.running = Some(Listener {
        generation,
        token,
        handle,
    });
}

async fn listen_loop<T, U, L>(context: ListenerContext<L, U>, generation: u64, token: CancellationToken)
where
    T: Send + Sync + 'static,
    U: Clone + Send + 'static,
    L: Duplex<T, U>,
{
    loop {
        // Fresh receive per pass; only cancellation bounds it
        let received = tokio::select! {
            biased;
            _ = token.cancelled() => break,
            received = context.link.receive_one() => received,
        };

        match received {
            Ok(Some(payload)) => {
                let _ = context.events.send(ListenEvent::MessageReceived(payload));
            }
            Ok(None) => {
                peer_gone(&context, generation, &token, "closed");
                break;
            }
            Err(TransportError::Cancelled) => break,
            Err(err) if err.is_peer_disconnect() => {
                peer_gone(&context, generation, &token, "reset");
                break;
            }
            Err(err) if !err.is_retryable() => {
                // Receiving can never work on this link; report once and stop
                warn!("Listener stopped: {}", err);
                if !token.is_cancelled() {
                    release_slot(&context, generation);
                    let _ = context.events.send(ListenEvent::ListenError(err));
                    token.cancel();
                }
                break;
            }
            Err(err) => {
                warn!("Listener receive failed: {}", err);
                let _ = context.events.send(ListenEvent::ListenError(err));
                tokio::task::yield_now().await;
            }
        }
    }
    debug!("Listener {} exited", generation);
}

fn peer_gone<L, U>(
    context: &ListenerContext<L, U>,
    generation: u64,
    token: &CancellationToken,
    how: &str,
) {
    // An external stop raced the receive; it owns the shutdown
    if token.is_cancelled() {
        return;
    }
    info!("Peer {} the connection while listening", how);
    context.state.set_connected(false);
    release_slot(context, generation);
    let _ = context.events.send(ListenEvent::ListenDisconnected);
    token.cancel();
}

/// Clear the slot and the listening intent if the slot still holds this loop
fn release_slot<L, U>(context: &ListenerContext<L, U>, generation: u64) {
    let mut slot = context.slot.lock();
    if slot
        .running
        .as_ref()
        .map_or(false, |listener| listener.generation == generation)
    {
        // Dropping our own JoinHandle detaches; no self-join
        slot.running = None;
        slot.enabled = false;
    }
}
