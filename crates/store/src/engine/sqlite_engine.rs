//! SQLite storage engine.
//!
//! sqlx is async-only, so each engine owns a current-thread Tokio runtime and
//! blocks on it. The pool is limited to a single connection: the store is
//! single-writer and serialised by the caller's lock anyway.

use super::{Engine, remove_if_exists};
use crate::error::{ErrorKind, Result};
use crate::{Insert, Namespace};
use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::runtime::{Builder, Runtime};
use tracing::instrument;

const SCHEMA: &str = r#"
    CREATE TABLE IF NOT EXISTS entries (
        key   TEXT PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    ) WITHOUT ROWID;
    CREATE TABLE IF NOT EXISTS meta (
        key   TEXT PRIMARY KEY NOT NULL,
        value BLOB NOT NULL
    ) WITHOUT ROWID;
"#;

/// Files SQLite may leave next to the database depending on journal mode.
const SIDECARS: [&str; 3] = ["-journal", "-wal", "-shm"];

struct Queries {
    get: &'static str,
    insert: &'static str,
    count: &'static str,
}

fn queries(ns: Namespace) -> &'static Queries {
    const ENTRIES: Queries = Queries {
        get: "SELECT value FROM entries WHERE key = ?",
        insert: "INSERT OR IGNORE INTO entries (key, value) VALUES (?, ?)",
        count: "SELECT COUNT(*) FROM entries",
    };
    const META: Queries = Queries {
        get: "SELECT value FROM meta WHERE key = ?",
        insert: "INSERT OR IGNORE INTO meta (key, value) VALUES (?, ?)",
        count: "SELECT COUNT(*) FROM meta",
    };
    match ns {
        Namespace::Entries => &ENTRIES,
        Namespace::Meta => &META,
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

pub(crate) struct SqliteEngine {
    runtime: Runtime,
    pool: SqlitePool,
}

impl SqliteEngine {
    #[instrument(level = "trace")]
    pub(crate) fn open(path: &Path) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_all().build().or_raise(|| ErrorKind::Database)?;
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true)
            // Rollback journal instead of WAL: the store should stay a single
            // file between runs.
            .journal_mode(SqliteJournalMode::Delete)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(Duration::from_millis(1500));
        let pool = runtime
            .block_on(async {
                let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
                // Also the first real read of the file: anything that isn't a
                // SQLite database fails here.
                sqlx::query(SCHEMA).execute(&pool).await?;
                Ok::<_, sqlx::Error>(pool)
            })
            .or_raise(|| ErrorKind::Database)?;
        Ok(Self { runtime, pool })
    }

    #[instrument(level = "trace")]
    pub(crate) fn create(path: &Path) -> Result<Self> {
        remove_if_exists(path).or_raise(|| ErrorKind::Database)?;
        for suffix in SIDECARS {
            remove_if_exists(&sidecar(path, suffix)).or_raise(|| ErrorKind::Database)?;
        }
        Self::open(path)
    }
}

impl Engine for SqliteEngine {
    fn get(&self, ns: Namespace, key: &str) -> Result<Option<Vec<u8>>> {
        self.runtime
            .block_on(sqlx::query_scalar::<_, Vec<u8>>(queries(ns).get).bind(key).fetch_optional(&self.pool))
            .or_raise(|| ErrorKind::Database)
    }

    fn insert(&mut self, ns: Namespace, key: &str, value: &[u8]) -> Result<Insert> {
        let result = self
            .runtime
            .block_on(sqlx::query(queries(ns).insert).bind(key).bind(value).execute(&self.pool))
            .or_raise(|| ErrorKind::Database)?;
        Ok(match result.rows_affected() {
            0 => Insert::Exists,
            _ => Insert::Created,
        })
    }

    fn len(&self, ns: Namespace) -> Result<u64> {
        let count = self
            .runtime
            .block_on(sqlx::query_scalar::<_, i64>(queries(ns).count).fetch_one(&self.pool))
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::Database)
    }

    fn close(self: Box<Self>) -> Result<()> {
        let Self { runtime, pool } = *self;
        runtime.block_on(pool.close());
        Ok(())
    }
}
