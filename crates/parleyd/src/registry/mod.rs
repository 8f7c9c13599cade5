//! Process-wide membership state.
//!
//! [`ServerState`] owns the two registries and is constructed once at
//! startup, then shared as `Arc<ServerState>` with every session.
//!
//! # Locking
//!
//! ```text
//! UserRegistry lock      ChannelRegistry lock
//!   (user map)             (channel map)
//!                               │ clone Arc<Channel>, release
//!                               ▼
//!                          Channel lock (membership)
//!                               │ held during join/part
//!                               ▼
//!                          User index lock (joined channels)
//! ```
//!
//! Locks are taken top to bottom only, and never two channel locks at once.

mod channel;
mod channels;
mod error;
mod users;

pub use channel::Channel;
pub use channels::ChannelRegistry;
pub use error::RegistryError;
pub use users::{User, UserRegistry};

/// Both registries, shared by all sessions.
#[derive(Debug, Default)]
pub struct ServerState {
    users: UserRegistry,
    channels: ChannelRegistry,
}

impl ServerState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn users(&self) -> &UserRegistry {
        &self.users
    }

    pub fn channels(&self) -> &ChannelRegistry {
        &self.channels
    }
}
