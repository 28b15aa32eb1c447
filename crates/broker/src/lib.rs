//! Citekey-addressed storage for a bibliography repository.
//!
//! Each entry in a repository is identified by a caller-chosen *citekey* and
//! is made of up to three files: metadata, bibliography data, and an optional
//! attached document. An entry only counts as present once its bibliography
//! data has been written; see [`Broker::exists`]. Alongside the entries the
//! repository keeps a version-stamped cache for derived data (search indexes,
//! record snapshots) that is discarded whenever the running version changes.
//!
//! Two interchangeable implementations of [`Broker`] are provided:
//!
//! - [`DataBroker`] goes to disk for every call.
//! - [`DataCache`] wraps a [`DataBroker`] and memoizes decoded records,
//!   checking file modification times so that edits made outside the process
//!   are still picked up.
//!
//! ```no_run
//! use quire_broker::{Broker, DataBroker};
//! use quire_codec::{BibEntry, Fields, Metadata, Value};
//!
//! # fn main() -> quire_broker::error::Result<()> {
//! let broker = DataBroker::new("papers", "papers/doc", true)?;
//! let metadata = Metadata::from([("tags".to_string(), Value::from(vec!["search"]))]);
//! let fields = Fields::from([("title".to_string(), Value::from("The PageRank Citation Ranking"))]);
//! broker.push("Page99", &metadata, &BibEntry::from([("Page99".to_string(), fields)]))?;
//! assert!(broker.exists("Page99", true));
//! broker.add_doc("Page99", "/home/me/Downloads/pagerank.pdf")?;
//! # Ok(())
//! # }
//! ```

mod databroker;
mod datacache;
mod docref;
pub mod error;
mod paths;

pub use crate::databroker::{DataBroker, Listing, ListingEntry, Options};
pub use crate::datacache::{BIBDATA_MEMO, DataCache, METADATA_MEMO};
pub use crate::docref::{DOCSDIR_SCHEME, DocRef};
pub use crate::paths::{BIBDATA_DIR, CACHE_DIR, METADATA_DIR, Paths, validate_citekey};
use crate::error::Result;
use quire_codec::{BibEntry, Metadata};
use quire_config::Config;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use time::OffsetDateTime;

/// Version string that cache entries are stamped with unless overridden
/// through [`Options::version`].
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Operations shared by every broker implementation.
///
/// All operations are synchronous and hit the local filesystem directly (or
/// an in-process memo of it). No locking is done between processes.
pub trait Broker: Sized {
    /// Open a repository.
    ///
    /// Fails with [`NotInitialized`](error::ErrorKind::NotInitialized) when
    /// either root (or the metadata/bibliography areas) is missing, unless
    /// [`Options::create`] is set, in which case they are created.
    fn with_options(repository: impl AsRef<Path>, documents: impl AsRef<Path>, options: Options) -> Result<Self>;

    fn new(repository: impl AsRef<Path>, documents: impl AsRef<Path>, create: bool) -> Result<Self> {
        Self::with_options(repository, documents, Options::default().create(create))
    }

    fn from_config(config: &Config) -> Result<Self> {
        Self::with_options(&config.repository, config.documents(), Options::from_config(config))
    }

    fn paths(&self) -> &Paths;

    /// Release the broker, persisting anything held in memory.
    fn close(self) -> Result<()> {
        Ok(())
    }

    // =========================================================================
    // Metadata and bibliography data
    // =========================================================================

    /// Write `metadata` for `citekey`, replacing what was there.
    fn push_metadata(&self, citekey: &str, metadata: &Metadata) -> Result<()>;

    /// Read the metadata for `citekey`.
    ///
    /// Returns [`NotFound`](error::ErrorKind::NotFound) when there is no
    /// metadata file and [`Malformed`](error::ErrorKind::Malformed) when it
    /// does not decode.
    fn pull_metadata(&self, citekey: &str) -> Result<Metadata>;

    /// Write `bibentry` for `citekey`, replacing what was there.
    fn push_bibentry(&self, citekey: &str, bibentry: &BibEntry) -> Result<()>;

    /// Read the bibliography data for `citekey`. Errors as for
    /// [`pull_metadata`](Self::pull_metadata).
    fn pull_bibentry(&self, citekey: &str) -> Result<BibEntry>;

    /// Write both artifacts, metadata first.
    fn push(&self, citekey: &str, metadata: &Metadata, bibentry: &BibEntry) -> Result<()> {
        self.push_metadata(citekey, metadata)?;
        self.push_bibentry(citekey, bibentry)
    }

    /// Delete the metadata and bibliography files of `citekey`. Files that
    /// are already gone are not an error. Documents are left alone.
    fn remove(&self, citekey: &str) -> Result<()>;

    /// Whether `citekey` is present.
    ///
    /// With `meta_check` both the metadata and the bibliography file must
    /// exist; without it only the bibliography file is looked at. Never
    /// fails: anything unreadable or invalid counts as absent.
    fn exists(&self, citekey: &str, meta_check: bool) -> bool;

    fn metadata_modified(&self, citekey: &str) -> Result<OffsetDateTime>;

    fn bibdata_modified(&self, citekey: &str) -> Result<OffsetDateTime>;

    /// Citekeys that have a metadata file, sorted.
    fn citekeys(&self) -> Result<Vec<String>>;

    fn listing(&self) -> Result<Listing>;

    /// Decode raw bibliography bytes, or `None` if they don't decode.
    fn verify(&self, raw: &[u8]) -> Option<BibEntry>;

    // =========================================================================
    // Documents
    // =========================================================================

    /// Whether `reference` uses the `docsdir://` scheme.
    fn in_docsdir(&self, reference: &str) -> bool {
        matches!(reference.parse::<DocRef>(), Ok(DocRef::Internal(_)))
    }

    /// Filesystem path a reference points to.
    fn real_docpath(&self, reference: &str) -> Result<PathBuf>;

    /// Copy a document into the document root as `<citekey>.<ext>`, the
    /// extension taken from the source. Replaces any document already stored
    /// under that name; the source is never removed. Returns the
    /// `docsdir://` reference of the stored copy.
    fn add_doc(&self, citekey: &str, reference: &str) -> Result<DocRef>;

    /// Delete a `docsdir://` document. External paths are refused.
    fn remove_doc(&self, reference: &str) -> Result<()>;

    /// Move a `docsdir://` document to `<new_citekey>.<ext>`. Fails without
    /// touching the disk if the destination is taken or the reference is
    /// external.
    fn rename_doc(&self, reference: &str, new_citekey: &str) -> Result<DocRef>;

    // =========================================================================
    // Cache
    // =========================================================================

    /// Store `value` under `name`, stamped with the running version.
    fn push_cache<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()>;

    /// Load the value stored under `name`.
    ///
    /// Fails with [`VersionMismatch`](error::ErrorKind::VersionMismatch) when
    /// it was stored by any other version.
    fn pull_cache<T: DeserializeOwned>(&self, name: &str) -> Result<T>;
}
