//! Sync Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Failures from the crates the engine
//! drives are kept as children in the error tree.

use derive_more::{Display, Error};

/// A sync error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sync operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Classifies the origin of a sync failure.
///
/// ### Operational Errors
/// - [`ErrorKind::PageInFlight`]
/// - [`ErrorKind::ProbeEndpoint`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Remote`]
/// - [`ErrorKind::Store`]
/// - [`ErrorKind::Assets`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// Fetching or decoding a listing page failed.
    #[display("remote listing request failed")]
    Remote,
    /// Reading or writing the entity store failed.
    #[display("entity store operation failed")]
    Store,
    /// Downloading artwork failed.
    #[display("artwork download failed")]
    Assets,
    /// Another page is still loading; at most one page fetch runs at a time.
    #[display("page {_0} is still loading")]
    PageInFlight(#[error(not(source))] i64),
    /// The connectivity probe target has no host or port to dial.
    #[display("cannot probe connectivity of {_0}")]
    ProbeEndpoint(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote | Self::PageInFlight(_))
    }
}
