//! Error types for identity parsing.

use thiserror::Error;

/// Errors that can occur when parsing identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum NamingError {
    /// The identifier string is empty.
    #[error("infra uuid cannot be empty")]
    Empty,

    /// The identifier is longer than allowed.
    #[error("infra uuid too long: {len} characters (max {max})")]
    TooLong { len: usize, max: usize },

    /// The identifier contains characters outside `[a-z0-9]`.
    #[error("infra uuid contains invalid character '{0}'")]
    InvalidCharacter(char),
}
