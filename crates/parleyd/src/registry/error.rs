//! Registry and channel errors.

use parley_core::{ChannelName, UserName};
use parley_protocol::ErrorCode;
use thiserror::Error;

/// Errors that can occur during registry and channel operations.
///
/// Every variant ends the session that triggered it; see
/// [`crate::session::SessionError`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegistryError {
    /// Hello with a name that is already logged in.
    #[error("user {0} is already logged in")]
    NameConflict(UserName),

    /// Part or chat message for a channel nobody ever joined.
    #[error("no such channel {0}")]
    ChannelNotFound(ChannelName),

    #[error("user {user} is already in channel {channel}")]
    AlreadyMember { user: UserName, channel: ChannelName },

    #[error("user {user} is not in channel {channel}")]
    NotAMember { user: UserName, channel: ChannelName },
}

impl RegistryError {
    /// Wire code reported to the client before the session closes.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::NameConflict(_) => ErrorCode::NameConflict,
            Self::ChannelNotFound(_) => ErrorCode::ChannelNotFound,
            Self::AlreadyMember { .. } => ErrorCode::AlreadyMember,
            Self::NotAMember { .. } => ErrorCode::NotAMember,
        }
    }
}
