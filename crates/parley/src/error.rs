//! Error types for the parley client.
//!
//! **Panic-Free Policy:** This module follows the project's panic-free guidelines.
//! No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, or `todo!()`.

use std::io;
use thiserror::Error;

use parley_protocol::{CodecError, ErrorCode};

// ============================================================================
// Client Error Type
// ============================================================================

/// Errors that end a client connection.
#[derive(Error, Debug)]
pub enum ClientError {
    /// Could not reach the server.
    #[error("Failed to connect to {server}: {reason}")]
    Connection { server: String, reason: String },

    /// The server refused the hello (name taken, server full, ...).
    #[error("Server rejected the connection ({code}): {message}")]
    Rejected { code: ErrorCode, message: String },

    /// The server speaks an incompatible protocol major version.
    #[error("Protocol version mismatch: client {client_version}, server {server_version}")]
    VersionMismatch {
        client_version: String,
        server_version: String,
    },

    /// The server sent something out of sequence.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The server closed the connection during the handshake.
    #[error("Server closed the connection")]
    Closed,

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A connection task panicked or was aborted.
    #[error("Connection task failed: {0}")]
    Task(String),
}

/// Convenience result alias for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
