//! Version-stamped cache files.
//!
//! The cache holds data that can always be rebuilt from the repository
//! (search indexes, decoded record snapshots). It is not a source of truth.
//! Every entry is written together with the version string of the code that
//! produced it, and an entry is only ever handed back to code running the
//! exact same version. Anything else is reported as
//! [`VersionMismatch`](error::ErrorKind::VersionMismatch) so the caller can
//! regenerate it instead of trusting data in a foreign layout.

pub mod error;
mod store;

pub use crate::store::CacheStore;
