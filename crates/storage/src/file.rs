use std::path::PathBuf;
use time::OffsetDateTime;

/// File metadata returned by [`LocalStore::stat`](crate::LocalStore::stat)
/// and [`LocalStore::list`](crate::LocalStore::list).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Relative path from the store root
    pub path: PathBuf,
    /// File size in bytes
    pub size: u64,
    /// Last modified timestamp
    pub modified: OffsetDateTime,
}
impl FileInfo {
    pub fn new(path: impl Into<PathBuf>, size: u64, modified: OffsetDateTime) -> Self {
        Self { path: path.into(), size, modified }
    }
}
