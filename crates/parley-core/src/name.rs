//! Validated names for users and channels.
//!
//! Both kinds share one rule set: non-empty, at most [`MAX_NAME_LEN`]
//! characters, and free of whitespace and control characters. Names
//! deserialize through the same validation, so a bad name on the wire is
//! rejected while the message is being parsed.

use std::borrow::Borrow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{DomainError, DomainResult};

/// Longest accepted name, counted in characters.
pub const MAX_NAME_LEN: usize = 64;

/// Which kind of name failed validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    User,
    Channel,
}

impl fmt::Display for NameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::User => write!(f, "user"),
            Self::Channel => write!(f, "channel"),
        }
    }
}

fn validate(kind: NameKind, value: String) -> DomainResult<String> {
    let reason = if value.is_empty() {
        Some("must not be empty")
    } else if value.chars().count() > MAX_NAME_LEN {
        Some("longer than 64 characters")
    } else if value.chars().any(|c| c.is_whitespace() || c.is_control()) {
        Some("must not contain whitespace or control characters")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(DomainError::InvalidName {
            kind,
            value,
            reason,
        }),
        None => Ok(value),
    }
}

macro_rules! name_type {
    ($(#[$meta:meta])* $name:ident, $kind:expr) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Validates and wraps a name.
            pub fn new(value: impl Into<String>) -> DomainResult<Self> {
                validate($kind, value.into()).map(Self)
            }

            /// Returns the underlying string reference.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl TryFrom<String> for $name {
            type Error = DomainError;

            fn try_from(value: String) -> DomainResult<Self> {
                Self::new(value)
            }
        }

        impl TryFrom<&str> for $name {
            type Error = DomainError;

            fn try_from(value: &str) -> DomainResult<Self> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(name: $name) -> String {
                name.0
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }

        impl Borrow<str> for $name {
            fn borrow(&self) -> &str {
                &self.0
            }
        }
    };
}

name_type!(
    /// Unique name of a connected user.
    UserName,
    NameKind::User
);

name_type!(
    /// Name of a chat room.
    ChannelName,
    NameKind::Channel
);
