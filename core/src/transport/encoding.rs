//! Text encodings for string links

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EncodingError {
    #[error("Character {ch:?} at index {index} is not representable in {encoding}")]
    Unrepresentable {
        ch: char,
        index: usize,
        encoding: TextEncoding,
    },
    #[error("Invalid {encoding} byte sequence at offset {offset}")]
    InvalidBytes { offset: usize, encoding: TextEncoding },
    #[error("Unknown encoding: {0}")]
    Unknown(String),
}

/// Encoding applied to outbound and inbound strings
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextEncoding {
    #[default]
    #[serde(rename = "utf-8", alias = "utf8")]
    Utf8,
    /// 7-bit ASCII; anything above 0x7F is rejected
    #[serde(rename = "ascii")]
    Ascii,
    /// ISO-8859-1; every byte maps to the code point of the same value
    #[serde(rename = "latin-1", alias = "latin1")]
    Latin1,
}

impl TextEncoding {
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, EncodingError> {
        match self {
            TextEncoding::Utf8 => Ok(text.as_bytes().to_vec()),
            TextEncoding::Ascii => self.encode_narrow(text, 0x7F),
            TextEncoding::Latin1 => self.encode_narrow(text, 0xFF),
        }
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<String, EncodingError> {
        match self {
            TextEncoding::Utf8 => std::str::from_utf8(bytes)
                .map(str::to_owned)
                .map_err(|e| EncodingError::InvalidBytes {
                    offset: e.valid_up_to(),
                    encoding: *self,
                }),
            TextEncoding::Ascii => match bytes.iter().position(|b| !b.is_ascii()) {
                Some(offset) => Err(EncodingError::InvalidBytes {
                    offset,
                    encoding: *self,
                }),
                None => Ok(bytes.iter().map(|&b| b as char).collect()),
            },
            TextEncoding::Latin1 => Ok(bytes.iter().map(|&b| b as char).collect()),
        }
    }

    fn encode_narrow(&self, text: &str, max: u32) -> Result<Vec<u8>, EncodingError> {
        text.chars()
            .enumerate()
            .map(|(index, ch)| {
                if (ch as u32) <= max {
                    Ok(ch as u32 as u8)
                } else {
                    Err(EncodingError::Unrepresentable {
                        ch,
                        index,
                        encoding: *self,
                    })
                }
            })
            .collect()
    }
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextEncoding::Utf8 => write!(f, "utf-8"),
            TextEncoding::Ascii => write!(f, "ascii"),
            TextEncoding::Latin1 => write!(f, "latin-1"),
        }
    }
}

impl FromStr for TextEncoding {
    type Err = EncodingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "utf8" | "utf-8" => Ok(TextEncoding::Utf8),
            "ascii" | "us-ascii" => Ok(TextEncoding::Ascii),
            "latin1" | "latin-1" | "iso-8859-1" => Ok(TextEncoding::Latin1),
            other => Err(EncodingError::Unknown(other.to_string())),
        }
    }
}
