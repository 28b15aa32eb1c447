use crate::error::{Artifact, ErrorKind, Result};
use crate::paths::{BIBDATA_DIR, CACHE_DIR, METADATA_DIR, Paths, validate_citekey};
use crate::{Broker, DocRef, VERSION};
use exn::ResultExt;
use quire_cache::CacheStore;
use quire_codec::{BibEntry, CodecHandle, JsonEnDecoder, Metadata};
use quire_config::Config;
use quire_storage::LocalStore;
use quire_storage::error::{Error as StorageError, ErrorKind as StorageErrorKind};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// Settings for opening a broker.
#[derive(Debug, Clone)]
pub struct Options {
    /// Create missing roots and areas instead of failing.
    pub create: bool,
    /// Version string cache entries are stamped with and checked against.
    pub version: String,
    /// Encoder/decoder for metadata and bibliography files. Its extensions
    /// decide the file names.
    pub codec: CodecHandle,
}
impl Default for Options {
    fn default() -> Self {
        Self { create: false, version: VERSION.to_string(), codec: Arc::new(JsonEnDecoder) }
    }
}
impl Options {
    pub fn from_config(config: &Config) -> Self {
        let options = Self::default().create(config.create);
        match &config.cache_version {
            Some(version) => options.version(version.clone()),
            None => options,
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    pub fn codec(mut self, codec: CodecHandle) -> Self {
        self.codec = codec;
        self
    }
}

/// A citekey and the modification time of one of its files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingEntry {
    pub citekey: String,
    pub modified: OffsetDateTime,
}

/// Everything in the metadata and bibliography areas, each sorted by citekey.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub metadata: Vec<ListingEntry>,
    pub bibdata: Vec<ListingEntry>,
}

/// Broker that reads and writes straight through to the filesystem.
#[derive(Debug, Clone)]
pub struct DataBroker {
    paths: Paths,
    repository: LocalStore,
    documents: LocalStore,
    cache: CacheStore,
    codec: CodecHandle,
}

impl DataBroker {
    /// Version string this broker's cache entries are stamped with.
    pub fn version(&self) -> &str {
        self.cache.version()
    }

    fn init_error(err: StorageError, path: &Path) -> crate::error::Error {
        let kind = match &*err {
            StorageErrorKind::NotFound(_) | StorageErrorKind::NotADirectory(_) => {
                ErrorKind::NotInitialized(path.to_path_buf())
            },
            _ => ErrorKind::Io,
        };
        err.raise(kind)
    }

    fn read(&self, path: &Path, artifact: Artifact, citekey: &str) -> Result<Vec<u8>> {
        self.repository.read(path).map_err(|e| ErrorKind::storage(e, artifact, citekey))
    }

    fn write(&self, path: &Path, raw: &[u8], artifact: Artifact, citekey: &str) -> Result<()> {
        self.repository.write(path, raw).map_err(|e| ErrorKind::storage(e, artifact, citekey))
    }

    fn modified(&self, path: &Path, artifact: Artifact, citekey: &str) -> Result<OffsetDateTime> {
        let info = self.repository.stat(path).map_err(|e| ErrorKind::storage(e, artifact, citekey))?;
        Ok(info.modified)
    }

    fn delete_if_present(&self, path: &Path, artifact: Artifact, citekey: &str) -> Result<()> {
        match self.repository.delete(path) {
            Ok(()) => Ok(()),
            Err(e) if matches!(&*e, StorageErrorKind::NotFound(_)) => Ok(()),
            Err(e) => Err(ErrorKind::storage(e, artifact, citekey)),
        }
    }

    fn list(&self, dir: &str, artifact: Artifact) -> Result<Vec<ListingEntry>> {
        let files = self.repository.list(Some(Path::new(dir))).map_err(|e| ErrorKind::storage(e, artifact, dir))?;
        Ok(files
            .into_iter()
            .filter_map(|file| {
                let citekey = self.paths.citekey_of(&file.path, dir)?.to_string();
                Some(ListingEntry { citekey, modified: file.modified })
            })
            .collect())
    }

    fn source_path(&self, doc: &DocRef, reference: &str) -> Result<PathBuf> {
        match doc {
            DocRef::Internal(name) => self
                .documents
                .absolute_path(name)
                .map_err(|e| ErrorKind::storage(e, Artifact::Document, reference)),
            DocRef::External(path) => {
                std::path::absolute(path).or_raise(|| ErrorKind::NotFound(Artifact::Document, reference.to_string()))
            },
        }
    }

    fn internal_only(doc: DocRef, reference: &str) -> Result<PathBuf> {
        match doc {
            DocRef::Internal(name) => Ok(name),
            DocRef::External(_) => exn::bail!(ErrorKind::InvalidReference(
                reference.to_string(),
                "external documents are not managed by the repository"
            )),
        }
    }
}

impl Broker for DataBroker {
    #[instrument(skip_all, fields(repository = %repository.as_ref().display(), documents = %documents.as_ref().display()))]
    fn with_options(repository: impl AsRef<Path>, documents: impl AsRef<Path>, options: Options) -> Result<Self> {
        let (repository_root, documents_root) = (repository.as_ref(), documents.as_ref());
        let repository =
            LocalStore::open(repository_root, options.create).map_err(|e| Self::init_error(e, repository_root))?;
        for dir in [METADATA_DIR, BIBDATA_DIR] {
            repository
                .ensure_dir(dir, options.create)
                .map_err(|e| Self::init_error(e, &repository.root().join(dir)))?;
        }
        let documents =
            LocalStore::open(documents_root, options.create).map_err(|e| Self::init_error(e, documents_root))?;
        // The cache area is disposable; it is created whenever the rest exists.
        repository.ensure_dir(CACHE_DIR, true).or_raise(|| ErrorKind::Io)?;
        let cache = CacheStore::new(
            LocalStore::open(repository.root().join(CACHE_DIR), false).or_raise(|| ErrorKind::Io)?,
            options.version,
        );
        let paths = Paths::new(repository.root(), documents.root(), options.codec.as_ref());
        Ok(Self { paths, repository, documents, cache, codec: options.codec })
    }

    fn paths(&self) -> &Paths {
        &self.paths
    }

    #[instrument(skip(self, metadata))]
    fn push_metadata(&self, citekey: &str, metadata: &Metadata) -> Result<()> {
        let citekey = validate_citekey(citekey)?;
        let raw = self
            .codec
            .encode_metadata(metadata)
            .or_raise(|| ErrorKind::Unencodable(Artifact::Metadata, citekey.to_string()))?;
        self.write(&self.paths.metadata_path(citekey), &raw, Artifact::Metadata, citekey)
    }

    #[instrument(skip(self))]
    fn pull_metadata(&self, citekey: &str) -> Result<Metadata> {
        let citekey = validate_citekey(citekey)?;
        let raw = self.read(&self.paths.metadata_path(citekey), Artifact::Metadata, citekey)?;
        self.codec
            .decode_metadata(&raw)
            .or_raise(|| ErrorKind::Malformed(Artifact::Metadata, citekey.to_string()))
    }

    #[instrument(skip(self, bibentry))]
    fn push_bibentry(&self, citekey: &str, bibentry: &BibEntry) -> Result<()> {
        let citekey = validate_citekey(citekey)?;
        let raw = self
            .codec
            .encode_bibdata(bibentry)
            .or_raise(|| ErrorKind::Unencodable(Artifact::Bibdata, citekey.to_string()))?;
        self.write(&self.paths.bibdata_path(citekey), &raw, Artifact::Bibdata, citekey)
    }

    #[instrument(skip(self))]
    fn pull_bibentry(&self, citekey: &str) -> Result<BibEntry> {
        let citekey = validate_citekey(citekey)?;
        let raw = self.read(&self.paths.bibdata_path(citekey), Artifact::Bibdata, citekey)?;
        self.codec
            .decode_bibdata(&raw)
            .or_raise(|| ErrorKind::Malformed(Artifact::Bibdata, citekey.to_string()))
    }

    #[instrument(skip(self))]
    fn remove(&self, citekey: &str) -> Result<()> {
        let citekey = validate_citekey(citekey)?;
        self.delete_if_present(&self.paths.metadata_path(citekey), Artifact::Metadata, citekey)?;
        self.delete_if_present(&self.paths.bibdata_path(citekey), Artifact::Bibdata, citekey)
    }

    fn exists(&self, citekey: &str, meta_check: bool) -> bool {
        let Ok(citekey) = validate_citekey(citekey) else {
            return false;
        };
        let present = |path: PathBuf| self.repository.exists(path).unwrap_or(false);
        let bib_exists = present(self.paths.bibdata_path(citekey));
        match meta_check {
            true => bib_exists && present(self.paths.metadata_path(citekey)),
            false => bib_exists,
        }
    }

    fn metadata_modified(&self, citekey: &str) -> Result<OffsetDateTime> {
        let citekey = validate_citekey(citekey)?;
        self.modified(&self.paths.metadata_path(citekey), Artifact::Metadata, citekey)
    }

    fn bibdata_modified(&self, citekey: &str) -> Result<OffsetDateTime> {
        let citekey = validate_citekey(citekey)?;
        self.modified(&self.paths.bibdata_path(citekey), Artifact::Bibdata, citekey)
    }

    fn citekeys(&self) -> Result<Vec<String>> {
        Ok(self.list(METADATA_DIR, Artifact::Metadata)?.into_iter().map(|entry| entry.citekey).collect())
    }

    fn listing(&self) -> Result<Listing> {
        Ok(Listing {
            metadata: self.list(METADATA_DIR, Artifact::Metadata)?,
            bibdata: self.list(BIBDATA_DIR, Artifact::Bibdata)?,
        })
    }

    fn verify(&self, raw: &[u8]) -> Option<BibEntry> {
        self.codec.decode_bibdata(raw).ok()
    }

    fn real_docpath(&self, reference: &str) -> Result<PathBuf> {
        let doc = reference.parse::<DocRef>()?;
        self.source_path(&doc, reference)
    }

    #[instrument(skip(self))]
    fn add_doc(&self, citekey: &str, reference: &str) -> Result<DocRef> {
        let citekey = validate_citekey(citekey)?;
        let source = reference.parse::<DocRef>()?;
        let target = DocRef::internal(self.paths.doc_path(citekey, source.extension()))?;
        if source == target {
            // Already stored under its own name.
            self.documents
                .stat(target.path())
                .map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))?;
            return Ok(target);
        }
        let copied = match &source {
            DocRef::Internal(name) => self.documents.copy(name, target.path()),
            DocRef::External(_) => self.documents.import(self.source_path(&source, reference)?, target.path()),
        };
        let bytes = copied.map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))?;
        tracing::debug!(document = %target, bytes, "Stored document");
        Ok(target)
    }

    #[instrument(skip(self))]
    fn remove_doc(&self, reference: &str) -> Result<()> {
        let name = Self::internal_only(reference.parse::<DocRef>()?, reference)?;
        self.documents.delete(&name).map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))
    }

    #[instrument(skip(self))]
    fn rename_doc(&self, reference: &str, new_citekey: &str) -> Result<DocRef> {
        let new_citekey = validate_citekey(new_citekey)?;
        let source = reference.parse::<DocRef>()?;
        let target = DocRef::internal(self.paths.doc_path(new_citekey, source.extension()))?;
        let name = Self::internal_only(source, reference)?;
        if name == target.path() {
            self.documents.stat(&name).map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))?;
            return Ok(target);
        }
        if self.documents.exists(target.path()).map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))? {
            exn::bail!(ErrorKind::AlreadyExists(self.paths.documents().join(target.path())));
        }
        self.documents
            .rename(&name, target.path())
            .map_err(|e| ErrorKind::storage(e, Artifact::Document, reference))?;
        Ok(target)
    }

    #[instrument(skip(self, value))]
    fn push_cache<T: Serialize + ?Sized>(&self, name: &str, value: &T) -> Result<()> {
        self.cache.push(name, value).map_err(|e| ErrorKind::cache(e, name))
    }

    #[instrument(skip(self))]
    fn pull_cache<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        self.cache.pull(name).map_err(|e| ErrorKind::cache(e, name))
    }
}
