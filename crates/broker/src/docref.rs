//! Document references.
//!
//! A reference is either `docsdir://<name>`, a file already inside the
//! document root, or anything else, taken as a path to an external file.

use crate::error::{Error, ErrorKind, Result};
use quire_storage::validate_path;
use std::fmt::{self, Display};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const DOCSDIR_SCHEME: &str = "docsdir";

/// A parsed document reference.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum DocRef {
    /// A file inside the document root, by normalized relative path.
    Internal(PathBuf),
    /// A file anywhere else on the filesystem, by path as given.
    External(PathBuf),
}

impl DocRef {
    /// Reference to a file inside the document root.
    pub fn internal(name: impl AsRef<Path>) -> Result<Self> {
        let name = name.as_ref();
        match validate_path(name) {
            Ok(name) => Ok(Self::Internal(name)),
            Err(err) => Err(err.raise(ErrorKind::InvalidReference(
                format!("{DOCSDIR_SCHEME}://{}", name.display()),
                "path leaves the document root",
            ))),
        }
    }

    pub fn is_internal(&self) -> bool {
        matches!(self, Self::Internal(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Internal(path) | Self::External(path) => path,
        }
    }

    /// Extension of the referenced file name, without the dot.
    pub fn extension(&self) -> Option<&str> {
        self.path().extension().and_then(|e| e.to_str())
    }
}

// RFC 3986: ALPHA *( ALPHA / DIGIT / "+" / "-" / "." )
fn is_scheme(s: &str) -> bool {
    let mut chars = s.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}

impl FromStr for DocRef {
    type Err = Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() {
            exn::bail!(ErrorKind::InvalidReference(String::new(), "empty reference"));
        }
        match s.split_once("://") {
            Some((DOCSDIR_SCHEME, name)) => Self::internal(name),
            Some((scheme, _)) if is_scheme(scheme) => {
                exn::bail!(ErrorKind::InvalidReference(s.to_string(), "unsupported scheme"))
            },
            _ => Ok(Self::External(PathBuf::from(s))),
        }
    }
}

impl Display for DocRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Internal(path) => {
                // Always '/'-separated, whatever the platform.
                let parts: Vec<_> = path.components().map(|c| c.as_os_str().to_string_lossy()).collect();
                write!(f, "{DOCSDIR_SCHEME}://{}", parts.join("/"))
            },
            Self::External(path) => write!(f, "{}", path.display()),
        }
    }
}
