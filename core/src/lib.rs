// Tether Core: persistent connections over byte and text streams
//
// Layering, bottom up: transport links (establish/teardown/send/receive),
// connection state + retry policy, Connector -> Sender -> Transceiver, and
// the validated string protocol on top.

pub mod connection;
pub mod protocol;
pub mod transport;

pub use connection::{
    ConnectionEvent, ConnectionFault, ConnectionState, Connector, ListenEvent, Operation,
    PolicyError, RetryPolicy, Sender, Transceiver,
};
pub use protocol::{CommunicationEvent, Framing, Reply, StringTransceiver, TextChannel};
pub use transport::{
    Duplex, Link, LinkOptions, Outbound, StreamLink, TcpDialer, TextEncoding, TextLink,
    TransportError,
};

/// Transceiver exchanging raw byte chunks over TCP
pub type ByteTransceiver = Transceiver<Vec<u8>, Vec<u8>, StreamLink<TcpDialer>>;

/// Transceiver exchanging encoded text over TCP
pub type TextTransceiver = Transceiver<String, String, TextLink<TcpDialer>>;
