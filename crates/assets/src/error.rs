//! Asset Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use reel_remote::ErrorKind as RemoteErrorKind;

/// An asset error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for asset operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
/// Kinds are cloneable so that one failed download can be reported to every
/// caller that was waiting on it.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Downloading the asset failed.
    #[display("remote error: {_0}")]
    Remote(RemoteErrorKind),
    /// The payload is not an image in any recognised format.
    #[display("not a recognised image: {_0}")]
    Undecodable(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Remote(kind) => kind.is_retryable(),
            Self::Undecodable(_) => false,
        }
    }
}
