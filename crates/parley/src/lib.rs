//! parley client - terminal chat client library
//!
//! - `client` - TCP connection, hello handshake and paired read/write tasks
//! - `input` - Parsing of `/join`, `/part`, `/msg`, `/quit`, `/help` and plain text
//! - `render` - One-line formatting of server events
//! - `cli` - The `parley` binary's entry point

pub mod cli;
pub mod client;
pub mod error;
pub mod input;
pub mod render;

pub use client::{ChatClient, ClientConfig};
pub use error::{ClientError, Result};
