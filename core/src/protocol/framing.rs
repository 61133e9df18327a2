//! Reply framing checks: optional fixed header plus inclusive length bounds

use thiserror::Error;

/// Framing parameters rejected before any attempt is made
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum FramingError {
    #[error("Minimum length {min} exceeds maximum length {max}")]
    InvertedBounds { min: usize, max: usize },
}

/// Why a reply failed validation
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum Rejection {
    #[error("Reply too short: {length} < {min}")]
    TooShort { length: usize, min: usize },
    #[error("Reply too long: {length} > {max}")]
    TooLong { length: usize, max: usize },
    #[error("Header mismatch: expected {expected:?}")]
    HeaderMismatch { expected: String },
}

/// Validation rules for string replies.
///
/// Lengths count characters, not bytes. The header comparison is an exact,
/// case-sensitive prefix match; an empty header disables it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Framing {
    expected_header: String,
    min_length: usize,
    max_length: usize,
}

impl Framing {
    pub fn new(
        expected_header: impl Into<String>,
        min_length: usize,
        max_length: usize,
    ) -> Result<Self, FramingError> {
        if min_length > max_length {
            return Err(FramingError::InvertedBounds {
                min: min_length,
                max: max_length,
            });
        }
        Ok(Self {
            expected_header: expected_header.into(),
            min_length,
            max_length,
        })
    }

    /// No header and no length bounds; every received reply passes
    pub fn any() -> Self {
        Self {
            expected_header: String::new(),
            min_length: 0,
            max_length: usize::MAX,
        }
    }

    pub fn expected_header(&self) -> &str {
        &self.expected_header
    }

    pub fn min_length(&self) -> usize {
        self.min_length
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    pub fn check(&self, reply: &str) -> Result<(), Rejection> {
        let length = reply.chars().count();
        if length < self.min_length {
            return Err(Rejection::TooShort {
                length,
                min: self.min_length,
            });
        }
        if length > self.max_length {
            return Err(Rejection::TooLong {
                length,
                max: self.max_length,
            });
        }
        if !self.expected_header.is_empty() && !reply.starts_with(&self.expected_header) {
            return Err(Rejection::HeaderMismatch {
                expected: self.expected_header.clone(),
            });
        }
        Ok(())
    }
}

impl Default for Framing {
    fn default() -> Self {
        Self::any()
    }
}
