//! redb storage engine.
//!
//! Layout:
//! - Table `entries`: cache key -> serialized result bytes
//! - Table `meta`: version marker (key and value are the same string)
//!
//! Every read runs in its own read transaction and every insert in its own
//! write transaction, so a committed insert is durable before it returns.

use super::{Engine, remove_if_exists};
use crate::error::{ErrorKind, Result};
use crate::{Insert, Namespace};
use exn::ResultExt;
use redb::{Database, DatabaseError, ReadableTable, ReadableTableMetadata, TableDefinition};
use std::path::Path;
use tracing::instrument;

const ENTRIES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("entries");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

fn table(ns: Namespace) -> TableDefinition<'static, &'static str, &'static [u8]> {
    match ns {
        Namespace::Entries => ENTRIES_TABLE,
        Namespace::Meta => META_TABLE,
    }
}

pub(crate) struct RedbEngine {
    db: Database,
}

impl RedbEngine {
    /// Open (or initialise, if the file is empty) a redb database.
    ///
    /// Files that are not redb databases, or were written by an incompatible
    /// file format version, are rejected by redb itself. A file some other
    /// handle has open fails with [`ErrorKind::InUse`].
    #[instrument(level = "trace")]
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let db = match Database::create(path) {
            Ok(db) => db,
            Err(DatabaseError::DatabaseAlreadyOpen) => exn::bail!(ErrorKind::InUse(path.to_path_buf())),
            Err(err) => return Err(err).or_raise(|| ErrorKind::Database),
        };
        let engine = Self { db };
        engine.create_tables()?;
        Ok(engine)
    }

    #[instrument(level = "trace")]
    pub(crate) fn create(path: &Path) -> Result<Self> {
        remove_if_exists(path).or_raise(|| ErrorKind::Database)?;
        Self::open(path)
    }

    /// Read transactions fail on tables that were never written, so make sure
    /// both exist up front.
    fn create_tables(&self) -> Result<()> {
        let txn = self.db.begin_write().or_raise(|| ErrorKind::Database)?;
        txn.open_table(ENTRIES_TABLE).or_raise(|| ErrorKind::Database)?;
        txn.open_table(META_TABLE).or_raise(|| ErrorKind::Database)?;
        txn.commit().or_raise(|| ErrorKind::Database)
    }
}

impl Engine for RedbEngine {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        let txn = self.db.begin_read().or_raise(|| ErrorKind::Database)?;
        let table = txn.open_table(table(ns)).or_raise(|| ErrorKind::Database)?;
        let value = table.get(key).or_raise(|| ErrorKind::Database)?;
        Ok(value.map(|guard| guard.value().to_vec()))
    }

    fn insert(&mut self, ns: Namespace, key: &str, value: &[u8]) -> Result<Insert> {
        let txn = self.db.begin_write().or_raise(|| ErrorKind::Database)?;
        let outcome = {
            let mut table = txn.open_table(table(ns)).or_raise(|| ErrorKind::Database)?;
            let exists = table.get(key).or_raise(|| ErrorKind::Database)?.is_some();
            if exists {
                Insert::Exists
            } else {
                table.insert(key, value).or_raise(|| ErrorKind::Database)?;
                Insert::Created
            }
        };
        txn.commit().or_raise(|| ErrorKind::Database)?;
        Ok(outcome)
    }

    fn len(&self, ns: Namespace) -> Result<u64> {
        let txn = self.db.begin_read().or_raise(|| ErrorKind::Database)?;
        let table = txn.open_table(table(ns)).or_raise(|| ErrorKind::Database)?;
        table.len().or_raise(|| ErrorKind::Database)
    }

    fn close(self: Box<Self>) -> Result<()> {
        // redb flushes on commit; dropping the handle releases its file lock.
        drop(self.db);
        Ok(())
    }
}
