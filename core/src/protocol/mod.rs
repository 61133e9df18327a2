//! String request/response protocol on top of a [`crate::connection::Transceiver`]

pub mod framing;
pub mod string_transceiver;

pub use framing::{Framing, FramingError, Rejection};
pub use string_transceiver::{
    CommunicationEvent, Reply, StringTransceiver, TextChannel, DEFAULT_IO_TIMEOUT,
};
