use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use quire_storage::LocalStore;
use quire_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::instrument;

#[derive(Serialize)]
struct Stamped<'a, T: ?Sized> {
    version: &'a str,
    data: &'a T,
}

// The payload stays untyped until the version has been checked, so a layout
// change between versions surfaces as a mismatch and not as a decode error.
#[derive(Deserialize)]
struct RawStamped {
    version: String,
    data: serde_json::Value,
}

/// Named cache entries stored as files in a single directory.
///
/// # Examples
///
/// ```no_run
/// use quire_cache::CacheStore;
/// use std::collections::HashMap;
///
/// # fn example() -> quire_cache::error::Result<()> {
/// let cache = CacheStore::open("/path/to/repository/.cache", "1.2.0")?;
/// cache.push("index", &HashMap::from([("Page99", 3)]))?;
/// let index: HashMap<String, u32> = cache.pull("index")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct CacheStore {
    store: LocalStore,
    version: String,
}
impl CacheStore {
    pub const EXTENSION: &str = "json";

    pub fn new(store: LocalStore, version: impl Into<String>) -> Self {
        Self { store, version: version.into() }
    }

    /// Open (creating if needed) a cache directory stamped with `version`.
    pub fn open(dir: impl AsRef<Path>, version: impl Into<String>) -> Result<Self> {
        let dir = dir.as_ref();
        let store = LocalStore::open(dir, true).or_raise(|| ErrorKind::Storage(dir.display().to_string()))?;
        Ok(Self::new(store, version))
    }

    /// Version that entries are stamped with and checked against.
    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn dir(&self) -> &Path {
        self.store.root()
    }

    /// File name, relative to the cache directory, for the entry `name`.
    ///
    /// Names must be a single plain path component: no separators, no `.`
    /// or `..`, no NUL bytes.
    pub fn file_name(name: &str) -> Result<PathBuf> {
        let valid = !name.is_empty()
            && !name.contains(['/', '\\', '\0'])
            && name != "."
            && name != ".."
            && quire_storage::validate_path(name).is_ok();
        match valid {
            true => Ok(PathBuf::from(format!("{name}.{}", Self::EXTENSION))),
            false => exn::bail!(ErrorKind::InvalidName(name.to_string())),
        }
    }

    /// Write `data` under `name`, replacing any previous entry.
    #[instrument(level = "debug", skip(self, data), fields(version = %self.version))]
    pub fn push<T: Serialize + ?Sized>(&self, name: &str, data: &T) -> Result<()> {
        let path = Self::file_name(name)?;
        let stamped = Stamped { version: &self.version, data };
        let raw = serde_json::to_vec(&stamped).or_raise(|| ErrorKind::InvalidData(name.to_string()))?;
        self.store.write(&path, &raw).map_err(|e| Self::storage_error(e, name))
    }

    /// Read the entry `name`.
    ///
    /// Fails with [`NotFound`](ErrorKind::NotFound) when there is no entry,
    /// [`VersionMismatch`](ErrorKind::VersionMismatch) when it was written
    /// under any other version string, and
    /// [`InvalidData`](ErrorKind::InvalidData) when its contents do not
    /// decode into `T`.
    #[instrument(level = "debug", skip(self), fields(version = %self.version))]
    pub fn pull<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let path = Self::file_name(name)?;
        let raw = self.store.read(&path).map_err(|e| Self::storage_error(e, name))?;
        let stamped: RawStamped = serde_json::from_slice(&raw).or_raise(|| ErrorKind::InvalidData(name.to_string()))?;
        if stamped.version != self.version {
            tracing::debug!(name, found = %stamped.version, "Discarding cache entry from another version");
            exn::bail!(ErrorKind::VersionMismatch {
                name: name.to_string(),
                found: stamped.version,
                expected: self.version.clone(),
            });
        }
        serde_json::from_value(stamped.data).or_raise(|| ErrorKind::InvalidData(name.to_string()))
    }

    /// Delete the entry `name`. Returns `false` if there was nothing to delete.
    pub fn remove(&self, name: &str) -> Result<bool> {
        let path = Self::file_name(name)?;
        match self.store.delete(&path) {
            Ok(()) => Ok(true),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(false),
            Err(e) => Err(Self::storage_error(e, name)),
        }
    }

    fn storage_error(err: StorageError, name: &str) -> Error {
        let kind = match &*err {
            StorageErrorKind::NotFound(_) => ErrorKind::NotFound(name.to_string()),
            other => ErrorKind::Storage(other.to_string()),
        };
        err.raise(kind)
    }
}
