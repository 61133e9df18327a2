// Transport module: byte and string links over dialed streams

pub mod abstraction;
pub mod encoding;
pub mod stream;
pub mod text;

pub use abstraction::{Duplex, Link, Outbound, TransportError, TransportKind};
pub use encoding::{EncodingError, TextEncoding};
pub use stream::{
    Dialer, DuplexAcceptor, DuplexDialer, LinkOptions, StreamLink, TcpDialer,
    DEFAULT_BUFFER_SIZE,
};
pub use text::TextLink;
