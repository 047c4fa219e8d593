//! The [`CacheStore`] handle.

use crate::engine::{self, Engine};
use crate::error::{ErrorKind, Result};
use crate::{Backend, Insert, Namespace};
use exn::{OptionExt, ResultExt};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::instrument;

/// An open store file.
///
/// Owns the engine handle exclusively; it is deliberately not `Clone`.
/// Dropping the store closes it, but [`close`](Self::close) can be called
/// first (any number of times) to close it deterministically.
pub struct CacheStore {
    path: PathBuf,
    backend: Backend,
    engine: Option<Box<dyn Engine>>,
    created: bool,
}

impl fmt::Debug for CacheStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheStore")
            .field("path", &self.path)
            .field("backend", &self.backend)
            .field("created", &self.created)
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl CacheStore {
    /// Open the store at `path`, creating it if needed.
    ///
    /// 1. A missing file (and missing parent directories) is created first,
    ///    failing with [`ErrorKind::StoreCreateFailed`].
    /// 2. The file is opened read-write with `backend`.
    /// 3. If that fails (corrupt file, another format, incompatible engine
    ///    version) the file is replaced by a fresh, empty store. Only if that
    ///    also fails does this return [`ErrorKind::StoreOpenFailed`].
    ///
    /// A file that another live handle has open is never replaced: that fails
    /// with [`ErrorKind::InUse`] instead.
    ///
    /// A freshly created store has no version marker; see
    /// [`was_created`](Self::was_created).
    #[instrument(skip(path), fields(path = %path.as_ref().display()))]
    pub fn open(path: impl AsRef<Path>, backend: Backend) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut created = false;
        if !path.exists() {
            touch(&path).or_raise(|| ErrorKind::StoreCreateFailed(path.clone()))?;
            created = true;
        }
        let engine = match engine::open(backend, &path) {
            Ok(engine) => engine,
            Err(err) if matches!(*err, ErrorKind::InUse(_)) => return Err(err),
            Err(err) => {
                let kind: &ErrorKind = &err;
                tracing::info!(path = %path.display(), error = %kind, "Store could not be opened; creating a new one in its place");
                created = true;
                engine::create(backend, &path).or_raise(|| ErrorKind::StoreOpenFailed(path.clone()))?
            },
        };
        Ok(Self { path, backend, engine: Some(engine), created })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Whether [`open`](Self::open) created this store file or replaced an
    /// unreadable one, and no version marker has been written since.
    pub fn was_created(&self) -> bool {
        self.created
    }

    pub fn is_closed(&self) -> bool {
        self.engine.is_none()
    }

    fn engine(&self) -> Result<&dyn Engine> {
        self.engine.as_deref().ok_or_raise(|| ErrorKind::Closed)
    }

    fn engine_mut(&mut self) -> Result<&mut (dyn Engine + 'static)> {
        self.engine.as_deref_mut().ok_or_raise(|| ErrorKind::Closed)
    }

    /// Fetch the bytes stored under `key`, if any.
    #[instrument(level = "trace", skip(self))]
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.engine()?.get(Namespace::Entries, key)
    }

    /// Store `value` under `key`, unless `key` is already present.
    ///
    /// The first write for a key wins: an existing entry is never replaced,
    /// even by a different value. See [`Insert`].
    #[instrument(level = "trace", skip(self, value), fields(value_size = value.len()))]
    pub fn insert(&mut self, key: &str, value: &[u8]) -> Result<Insert> {
        self.engine_mut()?.insert(Namespace::Entries, key, value)
    }

    /// Number of cache entries. The version marker is not counted.
    pub fn len(&self) -> Result<u64> {
        self.engine()?.len(Namespace::Entries)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// Read the version marker stored for `version`.
    ///
    /// Returns the marker's value, which for a valid store equals `version`.
    /// A value that is not UTF-8 cannot match any version and reads as absent.
    pub fn marker(&self, version: &str) -> Result<Option<String>> {
        let bytes = self.engine()?.get(Namespace::Meta, version)?;
        Ok(bytes.and_then(|bytes| String::from_utf8(bytes).ok()))
    }

    /// Write the version marker for `version`.
    pub fn set_marker(&mut self, version: &str) -> Result<Insert> {
        let inserted = self.engine_mut()?.insert(Namespace::Meta, version, version.as_bytes())?;
        self.created = false;
        Ok(inserted)
    }

    /// Throw away every entry by recreating the store file from scratch, then
    /// write the version marker for `version`.
    ///
    /// Also reopens a store that was previously closed.
    #[instrument(skip(self), fields(path = %self.path.display(), backend = %self.backend))]
    pub fn clear(&mut self, version: &str) -> Result<()> {
        if let Some(engine) = self.engine.take()
            && let Err(err) = engine.close()
        {
            // The file is about to be deleted anyway.
            let kind: &ErrorKind = &err;
            tracing::warn!(error = %kind, "Failed to close store before clearing it");
        }
        let engine = engine::create(self.backend, &self.path).or_raise(|| ErrorKind::ClearCacheFailed(self.path.clone()))?;
        self.engine = Some(engine);
        self.set_marker(version).or_raise(|| ErrorKind::ClearCacheFailed(self.path.clone()))?;
        tracing::info!(version, "Cache cleared");
        Ok(())
    }

    /// Close the engine. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        match self.engine.take() {
            Some(engine) => engine.close(),
            None => Ok(()),
        }
    }
}

impl Drop for CacheStore {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            let kind: &ErrorKind = &err;
            tracing::warn!(path = %self.path.display(), error = %kind, "Failed to close store");
        }
    }
}

/// Create an empty file (and its parent directories).
fn touch(path: &Path) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)?;
    }
    OpenOptions::new().write(true).create(true).truncate(false).open(path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};
    use tempfile::TempDir;

    #[fixture]
    fn dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[rstest]
    fn open_creates_missing_file(dir: TempDir) {
        for &backend in Backend::available() {
            let path = dir.path().join(format!("nested/{backend}.db"));
            let store = CacheStore::open(&path, backend).unwrap();
            assert!(path.exists());
            assert!(store.was_created());
            assert_eq!(store.len().unwrap(), 0);
            assert_eq!(store.get("anything").unwrap(), None);
            assert_eq!(store.marker("1.0").unwrap(), None);
        }
    }

    #[rstest]
    fn open_fails_when_file_cannot_be_created(dir: TempDir) {
        let blocker = dir.path().join("not-a-directory");
        fs::write(&blocker, b"").unwrap();
        let path = blocker.join("cache.db");
        for &backend in Backend::available() {
            let err = CacheStore::open(&path, backend).unwrap_err();
            assert_eq!(*err, ErrorKind::StoreCreateFailed(path.clone()));
        }
    }

    #[rstest]
    fn first_write_wins(dir: TempDir) {
        for &backend in Backend::available() {
            let mut store = CacheStore::open(dir.path().join(format!("{backend}.db")), backend).unwrap();
            assert_eq!(store.insert("a.flac::100::1000", b"first").unwrap(), Insert::Created);
            assert_eq!(store.insert("a.flac::100::1000", b"second").unwrap(), Insert::Exists);
            assert_eq!(store.get("a.flac::100::1000").unwrap().as_deref(), Some(&b"first"[..]));
            assert_eq!(store.len().unwrap(), 1);
        }
    }

    #[rstest]
    fn entries_survive_reopen(dir: TempDir) {
        for &backend in Backend::available() {
            let path = dir.path().join(format!("{backend}.db"));
            let mut store = CacheStore::open(&path, backend).unwrap();
            store.set_marker("1.0").unwrap();
            assert!(!store.was_created());
            store.insert("key", b"value").unwrap();
            store.close().unwrap();

            let store = CacheStore::open(&path, backend).unwrap();
            assert!(!store.was_created());
            assert_eq!(store.get("key").unwrap().as_deref(), Some(&b"value"[..]));
            assert_eq!(store.marker("1.0").unwrap().as_deref(), Some("1.0"));
        }
    }

    #[rstest]
    fn marker_does_not_share_namespace_with_entries(dir: TempDir) {
        for &backend in Backend::available() {
            let mut store = CacheStore::open(dir.path().join(format!("{backend}.db")), backend).unwrap();
            store.set_marker("1.0").unwrap();
            assert_eq!(store.get("1.0").unwrap(), None);
            assert_eq!(store.len().unwrap(), 0);
            assert_eq!(store.insert("1.0", b"payload").unwrap(), Insert::Created);
            assert_eq!(store.marker("1.0").unwrap().as_deref(), Some("1.0"));
        }
    }

    #[rstest]
    fn clear_discards_entries_and_writes_marker(dir: TempDir) {
        for &backend in Backend::available() {
            let mut store = CacheStore::open(dir.path().join(format!("{backend}.db")), backend).unwrap();
            store.set_marker("1.0").unwrap();
            store.insert("one", b"1").unwrap();
            store.insert("two", b"2").unwrap();

            store.clear("2.0").unwrap();
            assert_eq!(store.len().unwrap(), 0);
            assert_eq!(store.get("one").unwrap(), None);
            assert_eq!(store.marker("1.0").unwrap(), None);
            assert_eq!(store.marker("2.0").unwrap().as_deref(), Some("2.0"));
        }
    }

    #[rstest]
    fn corrupt_file_is_replaced(dir: TempDir) {
        for &backend in Backend::available() {
            let path = dir.path().join(format!("{backend}.db"));
            fs::write(&path, vec![0xA5; 8192]).unwrap();
            let mut store = CacheStore::open(&path, backend).unwrap();
            assert!(store.was_created());
            assert_eq!(store.len().unwrap(), 0);
            assert_eq!(store.insert("key", b"value").unwrap(), Insert::Created);
        }
    }

    #[cfg(feature = "redb")]
    #[rstest]
    fn store_open_elsewhere_is_left_alone(dir: TempDir) {
        let path = dir.path().join("cache.redb");
        let mut first = CacheStore::open(&path, Backend::Redb).unwrap();
        first.insert("key", b"value").unwrap();

        let err = CacheStore::open(&path, Backend::Redb).unwrap_err();
        assert_eq!(*err, ErrorKind::InUse(path.clone()));
        assert_eq!(first.get("key").unwrap().as_deref(), Some(&b"value"[..]));
        first.close().unwrap();

        let reopened = CacheStore::open(&path, Backend::Redb).unwrap();
        assert_eq!(reopened.get("key").unwrap().as_deref(), Some(&b"value"[..]));
    }

    #[rstest]
    fn close_is_idempotent(dir: TempDir) {
        for &backend in Backend::available() {
            let mut store = CacheStore::open(dir.path().join(format!("{backend}.db")), backend).unwrap();
            store.close().unwrap();
            store.close().unwrap();
            assert!(store.is_closed());
            assert_eq!(*store.get("key").unwrap_err(), ErrorKind::Closed);
            assert_eq!(*store.insert("key", b"value").unwrap_err(), ErrorKind::Closed);
        }
    }
}
