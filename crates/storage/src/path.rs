//! Path validation for store-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a store-relative path and returns its normalized form.
///
/// Rejects anything that would resolve outside the store root once `..`
/// components are applied, Windows prefixes, NUL bytes, and paths that
/// normalize to nothing. Leading `/` and `.` components are dropped, so
/// `"/doc.pdf"` is treated the same as `"doc.pdf"`.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use quire_storage::validate_path;
/// assert!(validate_path("meta/Page99.json").is_ok());
/// assert!(validate_path("papers/../Page99.pdf").is_ok()); // (never leaves root)
/// assert!(validate_path("../outside.pdf").is_err());
/// assert!(validate_path("a/../../b").is_err());
/// assert!(validate_path("a\0b").is_err());
/// assert_eq!(
///     validate_path("wrong/.././papers//./Page99.pdf/").unwrap(),
///     Path::new("papers/Page99.pdf")
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let path = path.as_ref();
    let mut components = Vec::new();
    for component in path.components() {
        match component {
            Component::Normal(s) => {
                // NUL passes through Path::components() on Unix but truncates
                // in the underlying syscalls.
                if s.as_encoded_bytes().contains(&0) {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
                components.push(s)
            },
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
            Component::ParentDir => {
                if components.pop().is_none() {
                    exn::bail!(ErrorKind::InvalidPath(path.to_path_buf()));
                }
            },
        }
    }
    match components.is_empty() {
        true => exn::bail!(ErrorKind::InvalidPath(path.to_path_buf())),
        false => Ok(components.into_iter().collect()),
    }
}
