//! Domain-specific error types following panic-free policy.

use crate::name::NameKind;
use thiserror::Error;

/// Errors that can occur in domain operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A user or channel name failed validation
    #[error("Invalid {kind} name {value:?}: {reason}")]
    InvalidName {
        kind: NameKind,
        value: String,
        reason: &'static str,
    },
}

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;
