//! Newline-delimited JSON framing.
//!
//! Every message is one JSON object on its own line. The codec is
//! transport-agnostic: callers read and write whole lines.

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

/// Maximum encoded message size (64 KiB), including the trailing newline.
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024;

/// Errors raised while framing or parsing a message.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("Message too large: {size} bytes (max: {max})")]
    MessageTooLarge { size: usize, max: usize },

    #[error("Malformed message: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed message: {0}")]
    InvalidUtf8(#[from] std::str::Utf8Error),
}

/// Encodes a message as a single newline-terminated line.
pub fn encode<T: Serialize>(msg: &T) -> Result<String, CodecError> {
    let mut line = serde_json::to_string(msg)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line (with or without its terminator), enforcing `max` bytes.
pub fn decode<T: DeserializeOwned>(line: &str, max: usize) -> Result<T, CodecError> {
    if line.len() > max {
        return Err(CodecError::MessageTooLarge {
            size: line.len(),
            max,
        });
    }
    Ok(serde_json::from_str(line.trim_end_matches(['\r', '\n']))?)
}

/// Decodes one raw line read off the wire, enforcing `max` bytes before
/// looking at the contents.
pub fn decode_bytes<T: DeserializeOwned>(line: &[u8], max: usize) -> Result<T, CodecError> {
    if line.len() > max {
        return Err(CodecError::MessageTooLarge {
            size: line.len(),
            max,
        });
    }
    let text = std::str::from_utf8(line)?;
    Ok(serde_json::from_str(text.trim_end_matches(['\r', '\n']))?)
}
