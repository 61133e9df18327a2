// Connection module: state, retry policy and the connector/sender/transceiver layering

pub mod connector;
pub mod fault;
pub mod listener;
pub mod retry;
pub mod sender;
pub mod state;
pub mod transceiver;

/// Capacity of every broadcast event channel; slow subscribers see `Lagged`
pub const EVENT_CAPACITY: usize = 64;

pub use connector::Connector;
pub use fault::{ConnectionFault, PolicyError};
pub use listener::ListenEvent;
pub use retry::{Operation, RetryPolicy};
pub use sender::Sender;
pub use state::{ConnectionEvent, ConnectionState};
pub use transceiver::Transceiver;
