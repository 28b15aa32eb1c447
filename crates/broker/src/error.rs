//! Broker Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction. Errors from the storage, codec and
//! cache layers are kept as children of the broker error.

use derive_more::{Display, Error};
use quire_cache::error::{Error as CacheError, ErrorKind as CacheErrorKind};
use quire_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use std::path::PathBuf;

/// A broker error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for broker operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The kind of artifact an error is about.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    #[display("metadata")]
    Metadata,
    #[display("bibliography data")]
    Bibdata,
    #[display("document")]
    Document,
    #[display("cache entry")]
    Cache,
}

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The artifact does not exist. Carries the citekey, cache name or
    /// document reference that was asked for.
    #[display("{_0} not found: {_1}")]
    NotFound(#[error(not(source))] Artifact, #[error(not(source))] String),
    /// The artifact exists but could not be decoded.
    #[display("malformed {_0}: {_1}")]
    Malformed(#[error(not(source))] Artifact, #[error(not(source))] String),
    /// The record cannot be written in the repository's format. Carries the
    /// citekey.
    #[display("cannot encode {_0}: {_1}")]
    Unencodable(#[error(not(source))] Artifact, #[error(not(source))] String),
    /// The cache entry was written by another version and must be regenerated.
    #[display("cache entry {name} was written by version {found}, running {expected}")]
    VersionMismatch {
        #[error(not(source))]
        name: String,
        #[error(not(source))]
        found: String,
        #[error(not(source))]
        expected: String,
    },
    /// A repository or document root is missing and creation was not requested.
    #[display("repository not initialized: {} is missing", _0.display())]
    NotInitialized(#[error(not(source))] PathBuf),
    /// The target of a rename is already taken.
    #[display("already exists: {}", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Citekeys must be usable verbatim as a single file name.
    #[display("invalid citekey: {_0:?}")]
    InvalidCitekey(#[error(not(source))] String),
    /// Cache names must be usable verbatim as a single file name.
    #[display("invalid cache name: {_0:?}")]
    InvalidName(#[error(not(source))] String),
    /// Unknown scheme, a path escaping the document root, or an external
    /// path where only broker-managed documents are allowed.
    #[display("invalid document reference {_0}: {_1}")]
    InvalidReference(#[error(not(source))] String, #[error(not(source))] &'static str),
    /// Any other filesystem failure.
    #[display("I/O error")]
    Io,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io)
    }

    /// Returns `true` for the "does not exist" family, which callers usually
    /// report differently from damage or misuse.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(..))
    }

    /// Wrap a storage error, naming the artifact and key it concerns.
    #[track_caller]
    pub(crate) fn storage(err: StorageError, artifact: Artifact, key: &str) -> Error {
        let kind = match &*err {
            StorageErrorKind::NotFound(_) => Self::NotFound(artifact, key.to_string()),
            StorageErrorKind::AlreadyExists(path) => Self::AlreadyExists(path.clone()),
            _ => Self::Io,
        };
        err.raise(kind)
    }

    /// Wrap a cache store error.
    #[track_caller]
    pub(crate) fn cache(err: CacheError, name: &str) -> Error {
        let kind = match &*err {
            CacheErrorKind::NotFound(_) => Self::NotFound(Artifact::Cache, name.to_string()),
            CacheErrorKind::VersionMismatch { name, found, expected } => Self::VersionMismatch {
                name: name.clone(),
                found: found.clone(),
                expected: expected.clone(),
            },
            CacheErrorKind::InvalidData(_) => Self::Malformed(Artifact::Cache, name.to_string()),
            CacheErrorKind::InvalidName(_) => Self::InvalidName(name.to_string()),
            CacheErrorKind::Storage(_) => Self::Io,
        };
        err.raise(kind)
    }
}
