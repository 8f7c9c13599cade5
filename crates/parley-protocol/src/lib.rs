//! parley protocol - wire protocol for client/server communication
//!
//! This crate provides the message types exchanged between the terminal
//! client and the daemon, protocol versioning, and the newline-delimited
//! JSON codec that frames them on a byte stream.

pub mod codec;
pub mod message;
pub mod version;

pub use codec::{decode, decode_bytes, encode, CodecError, MAX_MESSAGE_SIZE};
pub use message::{ClientMessage, ErrorCode, MessageType, ServerMessage};
pub use version::{ProtocolVersion, VersionError};
