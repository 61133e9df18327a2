//! Errors produced by the retrying connection layers

use crate::transport::TransportError;
use thiserror::Error;

/// Raised once every attempt of a retried operation has failed.
///
/// `source` carries the transport error of the final attempt; it is `None`
/// only when no attempt was made at all.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message} (after {attempts_made} attempt(s))")]
pub struct ConnectionFault {
    pub message: String,
    pub attempts_made: u32,
    #[source]
    pub source: Option<TransportError>,
}

impl ConnectionFault {
    pub fn exhausted(attempts_made: u32, last: TransportError) -> Self {
        Self {
            message: last.to_string(),
            attempts_made,
            source: Some(last),
        }
    }

    pub fn without_attempt(message: impl Into<String>, attempts_made: u32) -> Self {
        Self {
            message: message.into(),
            attempts_made,
            source: None,
        }
    }

    /// The transport error of the last attempt, if any
    pub fn last_error(&self) -> Option<&TransportError> {
        self.source.as_ref()
    }
}

/// Rejected retry parameters
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PolicyError {
    #[error("Per-attempt timeout must be greater than zero")]
    ZeroTimeout,
}
