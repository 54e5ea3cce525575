//! Outbound payload encoding
//!
//! Operators type payloads either as hex pairs (`41 42 0d`) or as plain
//! text. Hex input is bounded to [`MAX_PAYLOAD_LEN`] bytes.

use log::warn;

/// Largest payload sent in a single hex message
pub const MAX_PAYLOAD_LEN: usize = 30;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("hex input has an odd number of digits ({0})")]
    OddLength(usize),

    #[error("invalid hex pair '{pair}' at byte {index}")]
    InvalidPair { pair: String, index: usize },
}

/// Operator-supplied message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Payload {
    /// Hex digit pairs, whitespace ignored
    Hex(String),
    /// Raw text, sent as its UTF-8 bytes
    Text(String),
}

impl Payload {
    /// Bytes to put on the wire
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        match self {
            Payload::Hex(input) => encode(input),
            Payload::Text(text) => Ok(text.as_bytes().to_vec()),
        }
    }
}

/// Decode a hex string into at most [`MAX_PAYLOAD_LEN`] bytes.
///
/// Whitespace (including newlines) is stripped first. Empty input gives an
/// empty payload. Every pair must be valid hex, including pairs beyond the
/// length limit.
pub fn encode(input: &str) -> Result<Vec<u8>, CodecError> {
    let digits: String = input.chars().filter(|c| !c.is_whitespace()).collect();
    if digits.len() % 2 != 0 {
        return Err(CodecError::OddLength(digits.len()));
    }

    let mut bytes = hex::decode(&digits).map_err(|_| first_invalid_pair(&digits))?;
    if bytes.len() > MAX_PAYLOAD_LEN {
        warn!(
            "Payload of {} bytes truncated to {}",
            bytes.len(),
            MAX_PAYLOAD_LEN
        );
        bytes.truncate(MAX_PAYLOAD_LEN);
    }
    Ok(bytes)
}

fn first_invalid_pair(digits: &str) -> CodecError {
    let chars: Vec<char> = digits.chars().collect();
    let (index, pair) = chars
        .chunks(2)
        .enumerate()
        .find(|(_, pair)| !pair.iter().all(|c| c.is_ascii_hexdigit()))
        .map(|(index, pair)| (index, pair.iter().collect::<String>()))
        .unwrap_or_default();
    CodecError::InvalidPair { pair, index }
}
