//! Codec Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Field-level type drift is deliberately absent from this list: it never
//! produces an error, it degrades to the target type's default value.

use derive_more::{Display, Error};

/// A codec error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for codec operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The entity could not be flattened into a key-value mapping (its wire
    /// encoding failed, or was not an object).
    #[display("entity cannot be flattened into a mapping: {_0}")]
    Serialization(#[error(not(source))] &'static str),
    /// The wire value is not an object and therefore has no fields.
    #[display("expected an object")]
    NotAnObject,
    /// A strictly-decoded field (binary payloads) held a malformed value.
    #[display("invalid value for field: {_0}")]
    Decode(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
