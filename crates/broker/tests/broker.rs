//! Behaviour shared by every broker. Each scenario is run against both
//! [`DataBroker`] and [`DataCache`], which must be indistinguishable.

use quire_broker::error::{Artifact, ErrorKind};
use quire_broker::{Broker, DataBroker, DataCache, DocRef, Options};
use quire_codec::{BibEntry, EnDecoder, Fields, JsonEnDecoder, Metadata, Value};
use quire_config::Config;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;

struct Repo {
    _temp_dir: TempDir,
    root: PathBuf,
    docs: PathBuf,
}
impl Repo {
    fn new() -> Self {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("R");
        let docs = root.join("doc");
        Self { _temp_dir: temp_dir, root, docs }
    }

    fn open<B: Broker>(&self) -> B {
        B::new(&self.root, &self.docs, true).unwrap()
    }

    fn open_with<B: Broker>(&self, options: Options) -> B {
        B::with_options(&self.root, &self.docs, options.create(true)).unwrap()
    }
}

/// JSON codec that drops `_`-prefixed keys when decoding, so what is read
/// back differs from what was pushed.
#[derive(Debug)]
struct DropsPrivateKeys;

impl DropsPrivateKeys {
    fn public(metadata: Metadata) -> Metadata {
        metadata.into_iter().filter(|(key, _)| !key.starts_with('_')).collect()
    }
}

impl EnDecoder for DropsPrivateKeys {
    fn metadata_extension(&self) -> &str {
        "json"
    }

    fn bibdata_extension(&self) -> &str {
        "json"
    }

    fn encode_metadata(&self, metadata: &Metadata) -> quire_codec::error::Result<Vec<u8>> {
        JsonEnDecoder.encode_metadata(metadata)
    }

    fn decode_metadata(&self, raw: &[u8]) -> quire_codec::error::Result<Metadata> {
        JsonEnDecoder.decode_metadata(raw).map(Self::public)
    }

    fn encode_bibdata(&self, bibdata: &BibEntry) -> quire_codec::error::Result<Vec<u8>> {
        JsonEnDecoder.encode_bibdata(bibdata)
    }

    fn decode_bibdata(&self, raw: &[u8]) -> quire_codec::error::Result<BibEntry> {
        let bibdata = JsonEnDecoder.decode_bibdata(raw)?;
        Ok(bibdata.into_iter().map(|(key, fields)| (key, Self::public(fields))).collect())
    }
}

fn metadata() -> Metadata {
    Metadata::from([("title".to_string(), Value::from("T"))])
}

fn bibentry(citekey: &str) -> BibEntry {
    let fields = Fields::from([
        ("title".to_string(), Value::from("T")),
        ("year".to_string(), Value::from(1999_i64)),
        ("author".to_string(), Value::from(vec!["Page, Lawrence", "Brin, Sergey"])),
    ]);
    BibEntry::from([(citekey.to_string(), fields)])
}

fn never_pushed_is_absent<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    assert!(!broker.exists("k1", true));
    assert!(!broker.exists("k1", false));

    let err = broker.pull_metadata("k1").unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(Artifact::Metadata, k) if k == "k1"));
    let err = broker.pull_bibentry("k1").unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(Artifact::Bibdata, k) if k == "k1"));
}

fn entry_exists_once_bibdata_is_pushed<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();

    broker.push_metadata("k1", &metadata()).unwrap();
    assert!(!broker.exists("k1", true));
    assert!(!broker.exists("k1", false));

    broker.push_bibentry("k1", &bibentry("k1")).unwrap();
    assert!(broker.exists("k1", false));
    assert!(broker.exists("k1", true));

    assert_eq!(broker.pull_metadata("k1").unwrap(), metadata());
    assert_eq!(broker.pull_bibentry("k1").unwrap(), bibentry("k1"));
}

fn bibdata_alone_skips_meta_check<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    broker.push_bibentry("k1", &bibentry("k1")).unwrap();
    assert!(broker.exists("k1", false));
    assert!(!broker.exists("k1", true));
}

fn push_overwrites<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    broker.push("k1", &metadata(), &bibentry("k1")).unwrap();
    let updated = Metadata::from([("title".to_string(), Value::from("U")), ("notes".to_string(), Value::Null)]);
    broker.push_metadata("k1", &updated).unwrap();
    assert_eq!(broker.pull_metadata("k1").unwrap(), updated);

    // The second open sees what the first wrote.
    let other: B = repo.open();
    assert_eq!(other.pull_metadata("k1").unwrap(), updated);
    assert_eq!(other.pull_bibentry("k1").unwrap(), bibentry("k1"));
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Index {
    terms: Vec<String>,
    count: u32,
}

fn cache_round_trip<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    let index = Index { terms: vec!["pagerank".to_string(), "citation".to_string()], count: 2 };
    broker.push_cache("x", &index).unwrap();
    assert_eq!(broker.pull_cache::<Index>("x").unwrap(), index);

    broker.push_cache("y", "plain string").unwrap();
    assert_eq!(broker.pull_cache::<String>("y").unwrap(), "plain string");

    let err = broker.pull_cache::<Index>("never").unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(Artifact::Cache, name) if name == "never"));
}

fn cache_version_mismatch<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    broker.push_cache("x", &vec![1, 2, 3]).unwrap();

    let bumped = B::with_options(&repo.root, &repo.docs, Options::default().version("0.0.0")).unwrap();
    let err = bumped.pull_cache::<Vec<i32>>("x").unwrap_err();
    assert!(
        matches!(&*err, ErrorKind::VersionMismatch { name, found, expected }
            if name == "x" && found == quire_broker::VERSION && expected == "0.0.0")
    );
    assert!(!err.is_retryable());

    // Nothing was damaged by the failed pull.
    assert_eq!(broker.pull_cache::<Vec<i32>>("x").unwrap(), vec![1, 2, 3]);
}

fn add_doc_copies<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    fs::write(repo.docs.join("Name.pdf"), b"%PDF-1.4").unwrap();

    let stored = broker.add_doc("k1", "docsdir://Name.pdf").unwrap();
    assert_eq!(stored, DocRef::Internal(PathBuf::from("k1.pdf")));
    assert!(repo.docs.join("k1.pdf").is_file());
    assert!(repo.docs.join("Name.pdf").is_file());
    assert_eq!(broker.real_docpath("docsdir://k1.pdf").unwrap(), repo.docs.join("k1.pdf"));

    broker.remove_doc("docsdir://Name.pdf").unwrap();
    assert!(!repo.docs.join("Name.pdf").exists());
    assert_eq!(fs::read(repo.docs.join("k1.pdf")).unwrap(), b"%PDF-1.4");

    let err = broker.remove_doc("docsdir://Name.pdf").unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(Artifact::Document, _)));
}

fn references_stay_in_the_document_root<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    fs::write(repo.root.join("secret.txt"), b"keep").unwrap();

    for reference in ["docsdir://../secret.txt", "docsdir://a/../../secret.txt", "smb://host/x.pdf", ""] {
        let err = broker.remove_doc(reference).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidReference(..)), "{reference}");
        let err = broker.add_doc("k1", reference).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidReference(..)), "{reference}");
    }
    assert!(repo.root.join("secret.txt").is_file());
}

fn remove_entry<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    broker.push("k1", &metadata(), &bibentry("k1")).unwrap();
    broker.push("k2", &metadata(), &bibentry("k2")).unwrap();
    assert_eq!(broker.citekeys().unwrap(), vec!["k1", "k2"]);

    broker.remove("k1").unwrap();
    assert!(!broker.exists("k1", false));
    assert!(broker.pull_bibentry("k1").unwrap_err().is_not_found());
    assert!(broker.exists("k2", true));
    assert_eq!(broker.citekeys().unwrap(), vec!["k2"]);
}

fn rename_doc<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();
    let source = repo.root.join("download.djvu");
    fs::write(&source, b"AT&T").unwrap();

    let stored = broker.add_doc("k1", source.to_str().unwrap()).unwrap();
    let renamed = broker.rename_doc(&stored.to_string(), "k2").unwrap();
    assert_eq!(renamed.to_string(), "docsdir://k2.djvu");
    assert!(!repo.docs.join("k1.djvu").exists());
    assert!(repo.docs.join("k2.djvu").is_file());
    assert!(source.is_file());
}

fn unwritable_records_are_refused<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open();

    let err = broker.push_bibentry("k1", &BibEntry::new()).unwrap_err();
    assert!(matches!(&*err, ErrorKind::Unencodable(Artifact::Bibdata, k) if k == "k1"));
    let err = broker.pull_bibentry("k1").unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotFound(Artifact::Bibdata, _)));
    assert!(!broker.exists("k1", false));

    let scored = Metadata::from([("score".to_string(), Value::from(f64::INFINITY))]);
    broker.push_metadata("k1", &metadata()).unwrap();
    let err = broker.push_metadata("k1", &scored).unwrap_err();
    assert!(matches!(&*err, ErrorKind::Unencodable(Artifact::Metadata, k) if k == "k1"));
    // The earlier record is untouched.
    assert_eq!(broker.pull_metadata("k1").unwrap(), metadata());
}

fn pull_returns_what_was_read_back<B: Broker>() {
    let repo = Repo::new();
    let broker: B = repo.open_with(Options::default().codec(Arc::new(DropsPrivateKeys)));
    let pushed = Metadata::from([("title".to_string(), Value::from("T")), ("_draft".to_string(), Value::from(true))]);
    let mut bibdata = bibentry("k1");
    bibdata["k1"].insert("_note".to_string(), Value::from("local"));

    broker.push("k1", &pushed, &bibdata).unwrap();
    for _ in 0..2 {
        assert_eq!(broker.pull_metadata("k1").unwrap(), metadata());
        assert_eq!(broker.pull_bibentry("k1").unwrap(), bibentry("k1"));
    }
}

macro_rules! for_each_broker {
    ($($scenario:ident),* $(,)?) => {
        mod data_broker {
            use super::*;
            $(#[test] fn $scenario() { super::$scenario::<DataBroker>() })*
        }
        mod data_cache {
            use super::*;
            $(#[test] fn $scenario() { super::$scenario::<DataCache>() })*
        }
    };
}

for_each_broker!(
    never_pushed_is_absent,
    entry_exists_once_bibdata_is_pushed,
    bibdata_alone_skips_meta_check,
    push_overwrites,
    cache_round_trip,
    cache_version_mismatch,
    add_doc_copies,
    references_stay_in_the_document_root,
    remove_entry,
    rename_doc,
    unwritable_records_are_refused,
    pull_returns_what_was_read_back,
);

#[test]
fn test_not_initialized_without_create() {
    let repo = Repo::new();
    let err = DataBroker::new(&repo.root, &repo.docs, false).unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotInitialized(path) if *path == repo.root));
    let err = DataCache::new(&repo.root, &repo.docs, false).unwrap_err();
    assert!(matches!(&*err, ErrorKind::NotInitialized(_)));
    assert!(!repo.root.exists());

    // Creation is idempotent, after which plain opens work.
    let _: DataBroker = repo.open();
    let _: DataBroker = repo.open();
    DataBroker::new(&repo.root, &repo.docs, false).unwrap();
}

#[test]
fn test_broker_and_cache_share_a_repository() {
    let repo = Repo::new();
    let cache: DataCache = repo.open();
    cache.push("k1", &metadata(), &bibentry("k1")).unwrap();
    cache.close().unwrap();

    let broker: DataBroker = repo.open();
    assert_eq!(broker.pull_metadata("k1").unwrap(), metadata());
    // The memos live in the cache area under their own names.
    assert!(broker.pull_cache::<serde_json::Value>(quire_broker::METADATA_MEMO).is_ok());
}

#[test]
fn test_from_config() {
    let repo = Repo::new();
    let config = Config { documents: Some(repo.docs.clone()), create: true, ..Config::new(&repo.root) };
    let broker = DataCache::from_config(&config).unwrap();
    assert_eq!(broker.paths().repository(), repo.root);
    assert_eq!(broker.paths().documents(), repo.docs);
}
