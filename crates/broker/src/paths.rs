//! On-disk layout of a repository.
//!
//! ```text
//! <repository>/
//! ├── meta/<citekey>.<ext>     # metadata, one file per citekey
//! ├── bib/<citekey>.<ext>      # bibliography data, one file per citekey
//! └── .cache/<name>.json       # version-stamped cache entries
//! <documents>/
//! └── <citekey>.<ext>          # attached document, extension kept from the source
//! ```
//!
//! Nothing here touches the filesystem.

use crate::error::{ErrorKind, Result};
use quire_cache::CacheStore;
use quire_codec::EnDecoder;
use std::path::{Path, PathBuf};

pub const METADATA_DIR: &str = "meta";
pub const BIBDATA_DIR: &str = "bib";
pub const CACHE_DIR: &str = ".cache";

/// Check that a citekey can be used verbatim as a file stem.
///
/// Citekeys are opaque; only what would break the file layout is refused:
/// the empty string, path separators, NUL bytes, and `.`/`..`.
pub fn validate_citekey(citekey: &str) -> Result<&str> {
    let valid = !citekey.is_empty() && !citekey.contains(['/', '\\', '\0']) && citekey != "." && citekey != "..";
    match valid {
        true => Ok(citekey),
        false => exn::bail!(ErrorKind::InvalidCitekey(citekey.to_string())),
    }
}

/// Resolves citekeys and cache names to paths.
///
/// Metadata, bibliography and cache paths are relative to the repository
/// root, document paths to the document root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    repository: PathBuf,
    documents: PathBuf,
    metadata_ext: String,
    bibdata_ext: String,
}
impl Paths {
    pub fn new(repository: impl Into<PathBuf>, documents: impl Into<PathBuf>, codec: &dyn EnDecoder) -> Self {
        Self {
            repository: repository.into(),
            documents: documents.into(),
            metadata_ext: codec.metadata_extension().to_string(),
            bibdata_ext: codec.bibdata_extension().to_string(),
        }
    }

    pub fn repository(&self) -> &Path {
        &self.repository
    }

    pub fn documents(&self) -> &Path {
        &self.documents
    }

    pub fn metadata_path(&self, citekey: &str) -> PathBuf {
        Path::new(METADATA_DIR).join(format!("{citekey}.{}", self.metadata_ext))
    }

    pub fn bibdata_path(&self, citekey: &str) -> PathBuf {
        Path::new(BIBDATA_DIR).join(format!("{citekey}.{}", self.bibdata_ext))
    }

    /// Document file name for `citekey`. `ext` may be given with or without
    /// its leading dot; `None` or an empty extension gives the bare citekey.
    pub fn doc_path(&self, citekey: &str, ext: Option<&str>) -> PathBuf {
        match ext.map(|e| e.trim_start_matches('.')).filter(|e| !e.is_empty()) {
            Some(ext) => PathBuf::from(format!("{citekey}.{ext}")),
            None => PathBuf::from(citekey),
        }
    }

    pub fn cache_path(&self, name: &str) -> PathBuf {
        Path::new(CACHE_DIR).join(format!("{name}.{}", CacheStore::EXTENSION))
    }

    /// Citekey stored at a metadata or bibliography file name, if the name
    /// carries the expected extension.
    pub(crate) fn citekey_of<'a>(&self, file: &'a Path, dir: &str) -> Option<&'a str> {
        let ext = match dir {
            METADATA_DIR => &self.metadata_ext,
            _ => &self.bibdata_ext,
        };
        let name = file.file_name()?.to_str()?;
        name.strip_suffix(ext.as_str())?.strip_suffix('.').filter(|stem| validate_citekey(stem).is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quire_codec::JsonEnDecoder;
    use rstest::rstest;

    fn paths() -> Paths {
        Paths::new("/repo", "/repo/doc", &JsonEnDecoder)
    }

    #[test]
    fn test_artifact_paths() {
        let paths = paths();
        assert_eq!(paths.metadata_path("Page99"), PathBuf::from("meta/Page99.json"));
        assert_eq!(paths.bibdata_path("Page99"), PathBuf::from("bib/Page99.json"));
        assert_eq!(paths.cache_path("metacache"), PathBuf::from(".cache/metacache.json"));
        // Dotted citekeys are kept whole.
        assert_eq!(
            paths.metadata_path("10.1371_journal.pone.0038236"),
            PathBuf::from("meta/10.1371_journal.pone.0038236.json")
        );
    }

    #[rstest]
    #[case(Some("pdf"), "Larry99.pdf")]
    #[case(Some(".pdf"), "Larry99.pdf")]
    #[case(Some("tar.gz"), "Larry99.tar.gz")]
    #[case(Some(""), "Larry99")]
    #[case(None, "Larry99")]
    fn test_doc_path(#[case] ext: Option<&str>, #[case] expected: &str) {
        assert_eq!(paths().doc_path("Larry99", ext), PathBuf::from(expected));
    }

    #[rstest]
    #[case("Page99", true)]
    #[case("10.1371_journal.pone.0038236", true)]
    #[case("Doe:2020 (draft)", true)]
    #[case("", false)]
    #[case(".", false)]
    #[case("..", false)]
    #[case("a/b", false)]
    #[case("a\\b", false)]
    #[case("a\0b", false)]
    fn test_validate_citekey(#[case] citekey: &str, #[case] valid: bool) {
        assert_eq!(validate_citekey(citekey).is_ok(), valid);
    }

    #[test]
    fn test_citekey_of() {
        let paths = paths();
        assert_eq!(paths.citekey_of(Path::new("meta/Page99.json"), METADATA_DIR), Some("Page99"));
        assert_eq!(paths.citekey_of(Path::new("bib/a.b.json"), BIBDATA_DIR), Some("a.b"));
        assert_eq!(paths.citekey_of(Path::new("meta/Page99.yaml"), METADATA_DIR), None);
        assert_eq!(paths.citekey_of(Path::new("meta/.json"), METADATA_DIR), None);
        assert_eq!(paths.citekey_of(Path::new("meta/.tmpX1b2"), METADATA_DIR), None);
    }
}
