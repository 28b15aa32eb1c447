//! Memoizing broker.
//!
//! [`DataCache`] wraps a [`DataBroker`] and keeps decoded metadata and
//! bibliography records in memory, keyed by citekey and tagged with the
//! modification time of the file they were decoded from. A pull first stats
//! the file; when the time still matches the memo is returned without
//! reading or decoding anything. The memos are saved to the repository cache
//! as `metacache` and `bibcache` on [`flush`](DataCache::flush) or
//! [`close`](Broker::close), and loaded again on open. A memo that is missing,
//! damaged or stamped by another version is silently started over.

use crate::error::{ErrorKind, Result};
use crate::paths::validate_citekey;
use crate::{Broker, DataBroker, DocRef, Listing, Options, Paths};
use quire_codec::{BibEntry, Metadata};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};
use time::OffsetDateTime;
use tracing::instrument;

/// Cache entry name of the persisted metadata memo.
pub const METADATA_MEMO: &str = "metacache";
/// Cache entry name of the persisted bibliography memo.
pub const BIBDATA_MEMO: &str = "bibcache";

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Entry<T> {
    #[serde(with = "time::serde::rfc3339")]
    modified: OffsetDateTime,
    value: T,
}

#[derive(Debug)]
struct State<T> {
    entries: HashMap<String, Entry<T>>,
    dirty: bool,
}

#[derive(Debug)]
struct Memo<T> {
    name: &'static str,
    state: Mutex<State<T>>,
}
impl<T> Memo<T>
where
    T: Clone + Serialize + DeserializeOwned,
{
    fn load(broker: &DataBroker, name: &'static str) -> Self {
        let entries = match broker.pull_cache::<HashMap<String, Entry<T>>>(name) {
            Ok(entries) => {
                tracing::debug!(name, entries = entries.len(), "Loaded memo");
                entries
            },
            Err(err) => {
                match &*err {
                    ErrorKind::NotFound(..) => tracing::debug!(name, "No memo stored"),
                    ErrorKind::VersionMismatch { found, .. } => {
                        tracing::info!(name, found = %found, "Discarding memo from another version")
                    },
                    _ => tracing::warn!(name, error = %&*err, "Discarding unreadable memo"),
                }
                HashMap::new()
            },
        };
        Self { name, state: Mutex::new(State { entries, dirty: false }) }
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn get(&self, citekey: &str, modified: OffsetDateTime) -> Option<T> {
        let state = self.state();
        let entry = state.entries.get(citekey)?;
        (entry.modified == modified).then(|| entry.value.clone())
    }

    fn insert(&self, citekey: &str, modified: OffsetDateTime, value: T) {
        let mut state = self.state();
        state.entries.insert(citekey.to_string(), Entry { modified, value });
        state.dirty = true;
    }

    fn forget(&self, citekey: &str) {
        let mut state = self.state();
        if state.entries.remove(citekey).is_some() {
            state.dirty = true;
        }
    }

    fn flush(&self, broker: &DataBroker) -> Result<()> {
        let mut state = self.state();
        if state.dirty {
            broker.push_cache(self.name, &state.entries)?;
            state.dirty = false;
            tracing::debug!(name = self.name, entries = state.entries.len(), "Saved memo");
        }
        Ok(())
    }
}

/// A [`DataBroker`] with in-memory memoization of decoded records.
///
/// Behaves exactly like the broker it wraps; only the cost of repeated pulls
/// differs.
#[derive(Debug)]
pub struct DataCache {
    broker: DataBroker,
    metadata: Memo<Metadata>,
    bibdata: Memo<BibEntry>,
}

impl DataCache {
    /// Wrap an already open broker, loading any saved memos.
    pub fn wrap(broker: DataBroker) -> Self {
        let metadata = Memo::load(&broker, METADATA_MEMO);
        let bibdata = Memo::load(&broker, BIBDATA_MEMO);
        Self { broker, metadata, bibdata }
    }

    pub fn broker(&self) -> &DataBroker {
        &self.broker
    }

    /// Save the memos to the repository cache if they changed since the last
    /// save.
    pub fn flush(&self) -> Result<()> {
        self.metadata.flush(&self.broker)?;
        self.bibdata.flush(&self.broker)
    }
}

impl Broker for DataCache {
    #[instrument(skip_all, fields(repository = %repository.as_ref().display(), documents = %documents.as_ref().display()))]
    fn with_options(repository: impl AsRef<Path>, documents: impl AsRef<Path>, options: Options) -> Result<Self> {
        Ok(Self::wrap(DataBroker::with_options(repository, documents, options)?))
    }

    fn paths(&self) -> &Paths {
        self.broker.paths()
    }

    fn close(self) -> Result<()> {
        self.flush()?;
        self.broker.close()
    }

    // Pushes only drop the memo entry; pulls memoize what the codec reads back.
    fn push_metadata(&self, citekey: &str, metadata: &Metadata) -> Result<()> {
        self.metadata.forget(citekey);
        self.broker.push_metadata(citekey, metadata)
    }

    fn pull_metadata(&self, citekey: &str) -> Result<Metadata> {
        let citekey = validate_citekey(citekey)?;
        let modified = self.broker.metadata_modified(citekey)?;
        if let Some(metadata) = self.metadata.get(citekey, modified) {
            tracing::trace!(citekey, "Metadata memo hit");
            return Ok(metadata);
        }
        let metadata = self.broker.pull_metadata(citekey)?;
        self.metadata.insert(citekey, modified, metadata.clone());
        Ok(metadata)
    }

    fn push_bibentry(&self, citekey: &str, bibentry: &BibEntry) -> Result<()> {
        self.bibdata.forget(citekey);
        self.broker.push_bibentry(citekey, bibentry)
    }

    fn pull_bibentry(&self, citekey: &str) -> Result<BibEntry> {
        let citekey = validate_citekey(citekey)?;
        let modified = self.broker.bibdata_modified(citekey)?;
        if let Some(bibentry) = self.bibdata.get(citekey, modified) {
            tracing::trace!(citekey, "Bibliography memo hit");
            return Ok(bibentry);
        }
        let bibentry = self.broker.pull_bibentry(citekey)?;
        self.bibdata.insert(citekey, modified, bibentry.clone());
        Ok(bibentry)
    }

    fn remove(&self, citekey: &str) -> Result<()> {
        self.broker.remove(citekey)?;
        self.metadata.forget(citekey);
        self.bibdata.forget(citekey);
        Ok(())
    }

    fn exists(&self, citekey: &str, meta_check: bool) -> bool {
        self.broker.exists(citekey, meta_check)
    }

    fn metadata_modified(&self, citekey: &str) -> Result<OffsetDateTime> {
        self.broker.metadata_modified(citekey)
    }

    fn bibdata_modified(&self, citekey: &str) -> Result<OffsetDateTime> {
        self.broker.bibdata_modified(citekey)
    }

    fn citekeys(&self) -> Result<Vec<String>> {
        self.broker.citekeys()
    }

    fn listing(&self) -> Result<Listing> {
        self.broker.listing()
    }

    fn verify(&self, raw: &[u8]) -> Option<BibEntry> {
        self.broker.verify(raw)
    }

    fn real_docpath(&self, reference: &str) -> Result<PathBuf> {
        self.broker.real_docpath(reference)
    }

    fn add_doc(&self, citekey: &str, reference: &str) -> Result<DocRef> {
        self.broker.add_doc(citekey, reference)
    }

    fn remove_doc(&self, reference: &str) -> Result<()> {
        self.broker.remove_doc(reference)
    }

    fn rename_doc(&self, reference: &str, new_citekey: &str) -> Result<DocRef> {
        self.broker.rename_doc(reference, new_citekey)
    }

    fn push_cache<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.broker.push_cache(name, value)
    }

    fn pull_cache<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.broker.pull_cache(name)
    }
}
