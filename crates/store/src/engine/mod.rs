//! Storage engines behind [`CacheStore`](crate::CacheStore).
//!
//! Every engine keeps the two [`Namespace`]s in separate tables of the same
//! file, and implements inserts as insert-if-absent.

#[cfg(feature = "redb")]
mod redb_engine;
#[cfg(feature = "sqlite")]
mod sqlite_engine;

use crate::error::Result;
use crate::{Backend, Insert, Namespace};
use std::path::Path;

/// A single open store file.
pub(crate) trait Engine: Send {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>>;

    /// Insert `value` under `key` unless the key already exists.
    fn insert(&mut self, ns: Namespace, key: &str, value: &[u8]) -> Result<Insert>;

    fn len(&self, ns: Namespace) -> Result<u64>;

    fn close(self: Box<Self>) -> Result<()>;
}

/// Open an existing store file, initialising it if it is empty.
pub(crate) fn open(backend: Backend, path: &Path) -> Result<Box<dyn Engine>> {
    match backend {
        #[cfg(feature = "redb")]
        Backend::Redb => Ok(Box::new(self::redb_engine::RedbEngine::open(path)?)),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(self::sqlite_engine::SqliteEngine::open(path)?)),
    }
}

/// Discard whatever is at `path` and start an empty store in its place.
pub(crate) fn create(backend: Backend, path: &Path) -> Result<Box<dyn Engine>> {
    match backend {
        #[cfg(feature = "redb")]
        Backend::Redb => Ok(Box::new(self::redb_engine::RedbEngine::create(path)?)),
        #[cfg(feature = "sqlite")]
        Backend::Sqlite => Ok(Box::new(self::sqlite_engine::SqliteEngine::create(path)?)),
    }
}

/// Remove a file, treating "already gone" as success.
fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => Err(err),
        _ => Ok(()),
    }
}
