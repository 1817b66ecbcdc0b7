//! Error types for identifier parsing and validation.

use thiserror::Error;

/// Errors that can occur when parsing or validating identifiers.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    /// The identifier string is empty.
    #[error("identifier cannot be empty")]
    Empty,

    /// The label contains a character that is not allowed.
    #[error("invalid character {ch:?} in {kind}")]
    InvalidCharacter { kind: &'static str, ch: char },

    /// The label exceeds the maximum length.
    #[error("{kind} too long: {actual} > {max}")]
    TooLong {
        kind: &'static str,
        max: usize,
        actual: usize,
    },

    /// A numeric identifier could not be parsed.
    #[error("invalid numeric id: {0}")]
    InvalidNumber(String),
}

impl IdError {
    /// Returns true if this error indicates the input was empty.
    pub fn is_empty(&self) -> bool {
        matches!(self, IdError::Empty)
    }
}
