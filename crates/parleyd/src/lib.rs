//! parley daemon - channel registry and broadcast server
//!
//! This crate provides the server side of parley:
//! - `registry` - Channels, the channel registry and the user registry
//! - `session` - Per-connection state machine (hello, commands, cleanup)
//! - `sink` - Non-blocking delivery of server frames to one client
//! - `server` - TCP listener and per-connection reader/writer tasks
//! - `config` - TOML configuration with defaults
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       parleyd daemon                        │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   ChatServer    │────▶│        ServerState          │   │
//! │  │  (TcpListener)  │     │  UserRegistry               │   │
//! │  └────────┬────────┘     │  ChannelRegistry ─▶ Channel │   │
//! │           │              └──────────────▲──────────────┘   │
//! │           │ connections                 │ join/part/send   │
//! │           ▼                             │                   │
//! │  ┌─────────────────┐                    │                   │
//! │  │    Session      │────────────────────┘                   │
//! │  │  (per client)   │──▶ EventSink ──▶ writer task ──▶ TCP   │
//! │  └─────────────────┘                                        │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod cli;
pub mod config;
pub mod registry;
pub mod server;
pub mod session;
pub mod sink;
