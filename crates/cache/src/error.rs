//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No cache entry has been written under this name.
    #[display("cache entry not found: {_0}")]
    NotFound(#[error(not(source))] String),
    /// The entry was written by a different version and must be regenerated.
    #[display("cache entry {name} was written by version {found}, expected {expected}")]
    VersionMismatch {
        #[error(not(source))]
        name: String,
        #[error(not(source))]
        found: String,
        #[error(not(source))]
        expected: String,
    },
    /// Entry exists but its contents could not be (de)serialized.
    #[display("invalid cache data: {_0}")]
    InvalidData(#[error(not(source))] String),
    /// Entry names must be a single, plain file name.
    #[display("invalid cache entry name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Reading or writing the entry failed.
    #[display("cache storage error: {_0}")]
    Storage(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Storage(_))
    }

    /// Returns `true` if the entry should be thrown away and rebuilt.
    pub fn is_stale(&self) -> bool {
        matches!(self, Self::NotFound(_) | Self::VersionMismatch { .. } | Self::InvalidData(_))
    }
}
