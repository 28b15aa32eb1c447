//! Local filesystem store.
//!
//! Synchronous, blocking file operations confined to a root directory. Each
//! call opens and closes its own handles; nothing is held between calls.

use crate::error::{ErrorKind, Result};
use crate::{FileInfo, path::validate as validate_path};
use std::fs::{self, File, Metadata};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;

/// A directory on the local filesystem that files are read from and written
/// to by relative path.
///
/// # Examples
///
/// ```no_run
/// use quire_storage::LocalStore;
/// use std::path::Path;
///
/// # fn example() -> quire_storage::error::Result<()> {
/// let store = LocalStore::open("/path/to/repository", true)?;
/// store.write(Path::new("meta/Page99.json"), b"{}")?;
/// assert!(store.exists(Path::new("meta/Page99.json"))?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Debug)]
pub struct LocalStore {
    root: PathBuf,
}
impl LocalStore {
    /// Open a store rooted at `root`.
    ///
    /// Relative roots are resolved against the current directory. When the
    /// root is missing it is created if `create` is set, otherwise
    /// [`NotFound`](ErrorKind::NotFound) is returned. A root that exists but
    /// is not a directory is always rejected.
    pub fn open(root: impl AsRef<Path>, create: bool) -> Result<Self> {
        let root = std::path::absolute(root.as_ref()).map_err(|e| ErrorKind::from_io(e, root.as_ref()))?;
        match fs::metadata(&root) {
            Ok(meta) if meta.is_dir() => {},
            Ok(_) => exn::bail!(ErrorKind::NotADirectory(root)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                fs::create_dir_all(&root).map_err(|e| ErrorKind::from_io(e, &root))?;
                tracing::info!(root = %root.display(), "Created store root");
            },
            Err(e) => exn::bail!(ErrorKind::from_io(e, &root)),
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the absolute path for a relative store path.
    ///
    /// Validates the path and joins it with the root directory.
    pub fn absolute_path(&self, path: impl AsRef<Path>) -> Result<PathBuf> {
        let validated = validate_path(path.as_ref())?;
        Ok(self.root.join(validated))
    }

    /// Check that `dir` exists as a directory under the root, creating it
    /// (and any parents) when `create` is set.
    pub fn ensure_dir(&self, dir: impl AsRef<Path>, create: bool) -> Result<()> {
        let abs_path = self.absolute_path(dir.as_ref())?;
        match fs::metadata(&abs_path) {
            Ok(meta) if meta.is_dir() => Ok(()),
            Ok(_) => exn::bail!(ErrorKind::NotADirectory(dir.as_ref().to_path_buf())),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && create => {
                Ok(fs::create_dir_all(&abs_path).map_err(|e| ErrorKind::from_io(e, dir.as_ref()))?)
            },
            Err(e) => exn::bail!(ErrorKind::from_io(e, dir.as_ref())),
        }
    }

    /// Check if a regular file exists. Directories do not count.
    pub fn exists(&self, path: impl AsRef<Path>) -> Result<bool> {
        let abs_path = self.absolute_path(path.as_ref())?;
        match fs::metadata(&abs_path) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => exn::bail!(ErrorKind::from_io(e, path.as_ref())),
        }
    }

    /// Read file contents.
    pub fn read(&self, path: impl AsRef<Path>) -> Result<Vec<u8>> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        Ok(fs::read(&abs_path).map_err(|e| ErrorKind::from_io(e, path))?)
    }

    /// Write file contents, replacing any existing file.
    ///
    /// The data lands in a temporary file next to the target first and is
    /// renamed over it, so readers never observe a half-written file.
    /// Parent directories are created as needed.
    pub fn write(&self, path: impl AsRef<Path>, data: &[u8]) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        let mut temp = self.temp_for(&abs_path, path)?;
        temp.write_all(data).map_err(|e| ErrorKind::from_io(e, path))?;
        Self::persist(temp, &abs_path, path)
    }

    /// Copy a file from anywhere on the filesystem into the store.
    ///
    /// `source` is used as given (it is not confined to the root). A failed
    /// copy leaves the destination untouched.
    pub fn import(&self, source: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<u64> {
        let (source, to) = (source.as_ref(), to.as_ref());
        let abs_path = self.absolute_path(to)?;
        let mut reader = File::open(source).map_err(|e| ErrorKind::from_io(e, source))?;
        if !reader.metadata().map_err(|e| ErrorKind::from_io(e, source))?.is_file() {
            exn::bail!(ErrorKind::NotFound(source.to_path_buf()));
        }
        let mut temp = self.temp_for(&abs_path, to)?;
        let copied = std::io::copy(&mut reader, &mut temp).map_err(|e| ErrorKind::from_io(e, to))?;
        Self::persist(temp, &abs_path, to)?;
        Ok(copied)
    }

    /// Copy a file to another location within the store.
    pub fn copy(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<u64> {
        let from = self.absolute_path(from.as_ref())?;
        self.import(from, to)
    }

    /// Rename/move a file within the store, overwriting the destination.
    pub fn rename(&self, from: impl AsRef<Path>, to: impl AsRef<Path>) -> Result<()> {
        let (from, to) = (from.as_ref(), to.as_ref());
        let from_path = self.absolute_path(from)?;
        let to_path = self.absolute_path(to)?;
        if !fs::metadata(&from_path).map_err(|e| ErrorKind::from_io(e, from))?.is_file() {
            exn::bail!(ErrorKind::NotFound(from.to_path_buf()));
        }
        if let Some(parent) = to_path.parent() {
            fs::create_dir_all(parent).map_err(|e| ErrorKind::from_io(e, to))?;
        }
        Ok(fs::rename(&from_path, &to_path).map_err(|e| ErrorKind::from_io(e, to))?)
    }

    /// Delete a file.
    pub fn delete(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        Ok(fs::remove_file(&abs_path).map_err(|e| ErrorKind::from_io(e, path))?)
    }

    /// Get file metadata without reading contents.
    pub fn stat(&self, path: impl AsRef<Path>) -> Result<FileInfo> {
        let path = path.as_ref();
        let abs_path = self.absolute_path(path)?;
        let metadata = fs::metadata(&abs_path).map_err(|e| ErrorKind::from_io(e, path))?;
        if !metadata.is_file() {
            exn::bail!(ErrorKind::NotFound(path.to_path_buf()));
        }
        Self::metadata(path, metadata)
    }

    /// List the regular files directly inside `dir` (or the root), sorted by
    /// path.
    ///
    /// A directory that does not exist lists as empty.
    pub fn list(&self, dir: Option<&Path>) -> Result<Vec<FileInfo>> {
        let (abs_dir, rel_dir) = match dir {
            Some(dir) => (self.absolute_path(dir)?, validate_path(dir)?),
            None => (self.root.clone(), PathBuf::new()),
        };
        let entries = match fs::read_dir(&abs_dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => exn::bail!(ErrorKind::from_io(e, &rel_dir)),
        };
        let mut files = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| ErrorKind::from_io(e, &rel_dir))?;
            let relative = rel_dir.join(entry.file_name());
            let metadata = entry.metadata().map_err(|e| ErrorKind::from_io(e, &relative))?;
            // Subdirectories and broken symlinks are skipped.
            if metadata.is_file() {
                files.push(Self::metadata(&relative, metadata)?);
            }
        }
        files.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(files)
    }

    fn metadata(path: &Path, metadata: Metadata) -> Result<FileInfo> {
        let modified = metadata.modified().map_err(ErrorKind::Io)?.into();
        Ok(FileInfo::new(path, metadata.len(), modified))
    }

    fn temp_for(&self, abs_path: &Path, path: &Path) -> Result<NamedTempFile> {
        let parent = abs_path.parent().unwrap_or(&self.root);
        fs::create_dir_all(parent).map_err(|e| ErrorKind::from_io(e, path))?;
        Ok(NamedTempFile::new_in(parent).map_err(|e| ErrorKind::from_io(e, path))?)
    }

    fn persist(temp: NamedTempFile, abs_path: &Path, path: &Path) -> Result<()> {
        temp.as_file().sync_all().map_err(|e| ErrorKind::from_io(e, path))?;
        temp.persist(abs_path).map_err(|e| ErrorKind::from_io(e.error, path))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (tempfile::TempDir, LocalStore) {
        let temp_dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(temp_dir.path(), false).unwrap();
        (temp_dir, store)
    }

    #[test]
    fn test_open_missing_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("repo");
        let err = LocalStore::open(&root, false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(!root.exists());
        let store = LocalStore::open(&root, true).unwrap();
        assert!(root.is_dir());
        assert_eq!(store.root(), root);
        // Creating again is a no-op.
        assert!(LocalStore::open(&root, true).is_ok());
    }

    #[test]
    fn test_open_rejects_file_root() {
        let temp_dir = tempfile::tempdir().unwrap();
        let root = temp_dir.path().join("file");
        fs::write(&root, b"data").unwrap();
        let err = LocalStore::open(&root, true).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotADirectory(_)));
    }

    #[test]
    fn test_absolute_path() {
        let (temp_dir, store) = store();
        let expected = temp_dir.path().join("doc/Page99.pdf");
        assert_eq!(store.absolute_path("doc/Page99.pdf").unwrap(), expected);
        assert!(store.absolute_path("../etc/passwd").is_err());
    }

    #[test]
    fn test_ensure_dir() {
        let (temp_dir, store) = store();
        let err = store.ensure_dir("meta", false).unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        store.ensure_dir("meta", true).unwrap();
        assert!(temp_dir.path().join("meta").is_dir());
        store.ensure_dir("meta", false).unwrap();
    }

    #[test]
    fn test_write_and_read() {
        let (_temp_dir, store) = store();
        store.write("bib/Page99.json", b"first").unwrap();
        store.write("bib/Page99.json", b"second").unwrap();
        assert_eq!(store.read("bib/Page99.json").unwrap(), b"second");
        // No temporary files are left behind.
        assert_eq!(store.list(Some(Path::new("bib"))).unwrap().len(), 1);
    }

    #[test]
    fn test_read_missing() {
        let (_temp_dir, store) = store();
        let err = store.read("meta/nothing.json").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(p) if p == Path::new("meta/nothing.json")));
    }

    #[test]
    fn test_exists_ignores_directories() {
        let (_temp_dir, store) = store();
        assert!(!store.exists("meta").unwrap());
        store.ensure_dir("meta", true).unwrap();
        assert!(!store.exists("meta").unwrap());
        store.write("meta/k.json", b"{}").unwrap();
        assert!(store.exists("meta/k.json").unwrap());
    }

    #[test]
    fn test_import_and_copy() {
        let (temp_dir, store) = store();
        let outside = tempfile::tempdir().unwrap();
        let source = outside.path().join("paper.pdf");
        fs::write(&source, b"%PDF-1.4").unwrap();
        assert_eq!(store.import(&source, "Larry99.pdf").unwrap(), 8);
        assert!(source.exists());
        store.copy("Larry99.pdf", "Page99.pdf").unwrap();
        assert_eq!(fs::read(temp_dir.path().join("Page99.pdf")).unwrap(), b"%PDF-1.4");
        assert!(store.exists("Larry99.pdf").unwrap());
    }

    #[test]
    fn test_import_missing_source_leaves_no_target() {
        let (_temp_dir, store) = store();
        let err = store.import("/definitely/not/here.pdf", "k.pdf").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        assert!(!store.exists("k.pdf").unwrap());
        assert!(store.list(None).unwrap().is_empty());
    }

    #[test]
    fn test_rename_and_delete() {
        let (_temp_dir, store) = store();
        store.write("old.pdf", b"data").unwrap();
        store.rename("old.pdf", "sub/new.pdf").unwrap();
        assert!(!store.exists("old.pdf").unwrap());
        assert_eq!(store.read("sub/new.pdf").unwrap(), b"data");
        store.delete("sub/new.pdf").unwrap();
        let err = store.delete("sub/new.pdf").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
        let err = store.rename("old.pdf", "other.pdf").unwrap_err();
        assert!(matches!(&*err, ErrorKind::NotFound(_)));
    }

    #[test]
    fn test_stat() {
        let (_temp_dir, store) = store();
        store.write("meta/k.json", b"Hello, world!").unwrap();
        let info = store.stat("meta/k.json").unwrap();
        assert_eq!(info.path, PathBuf::from("meta/k.json"));
        assert_eq!(info.size, 13);
        assert!(store.stat("meta").is_err());
    }

    #[test]
    fn test_list() {
        let (_temp_dir, store) = store();
        assert!(store.list(Some(Path::new("meta"))).unwrap().is_empty());
        store.write("meta/b.json", b"{}").unwrap();
        store.write("meta/a.json", b"{}").unwrap();
        store.write("meta/nested/c.json", b"{}").unwrap();
        let paths: Vec<_> = store.list(Some(Path::new("meta"))).unwrap().into_iter().map(|f| f.path).collect();
        assert_eq!(paths, vec![PathBuf::from("meta/a.json"), PathBuf::from("meta/b.json")]);
    }

    #[test]
    fn test_path_security() {
        let (_temp_dir, store) = store();
        assert!(store.read("../etc/passwd").is_err());
        assert!(store.read("doc/../../passwd").is_err());
        assert!(store.write("../escape.pdf", b"data").is_err());
        assert!(store.delete("../../file").is_err());
        assert!(store.import("/etc/hostname", "../escape").is_err());
    }
}
