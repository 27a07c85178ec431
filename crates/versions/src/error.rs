//! Version Ledger Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Store implementations raise the
//! low-level kinds; the ledger raises [`ErrorKind::Database`] on top of them,
//! so callers only ever have to match on one kind to know a ledger call failed.

use derive_more::{Display, Error};

/// A ledger error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for ledger and store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// A ledger operation was rejected by the backing store.
    #[display("database I/O error")]
    Database,
    /// Could not open (or keep open) a connection to the backing store.
    #[display("database connection error")]
    Connection,
    /// A statement or query failed to execute.
    #[display("database query error")]
    Query,
    /// Stored or supplied data could not be represented.
    #[display("invalid data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection)
    }
}
