//! The caching wrapper around an [`Analyzer`].

use crate::codec;
use crate::error::{ErrorKind, Result};
use crate::key::{CacheKey, KeyBuilder};
use crate::lock::LockGuard;
use crate::stats::CacheStats;
use crate::version::{self, Freshness};
use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::fs::File;
use std::path::{Path, PathBuf};
use tagstash_config::{Config, KeyStrategy};
use tagstash_store::{Backend, CacheStore, Insert};
use tracing::instrument;

/// An expensive file inspection whose results are worth caching.
pub trait Analyzer {
    /// The structured result. Must survive a serialize/deserialize round trip
    /// unchanged.
    type Output: Serialize + DeserializeOwned;
    /// Returned to the caller untouched; the cache never inspects it.
    type Error;

    /// Identifies the analyzer build. Any change invalidates every cached
    /// result, so bump it whenever `Output` or its meaning changes.
    fn version(&self) -> &str;

    fn analyze(&self, request: &Request<'_>) -> std::result::Result<Self::Output, Self::Error>;
}

/// Arguments to a single analysis, handed to the [`Analyzer`] as given.
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub path: &'a Path,
    /// Size of the file, for callers that already know it (or for streams).
    pub size_hint: Option<u64>,
    /// Name to report instead of `path`, e.g. for uploaded temp files.
    pub display_name: Option<&'a str>,
    /// An already-open handle to read from instead of opening `path`.
    pub handle: Option<&'a File>,
}

impl<'a> Request<'a> {
    pub fn new(path: &'a Path) -> Self {
        Self { path, size_hint: None, display_name: None, handle: None }
    }

    pub fn with_size_hint(mut self, size: u64) -> Self {
        self.size_hint = Some(size);
        self
    }

    pub fn with_display_name(mut self, name: &'a str) -> Self {
        self.display_name = Some(name);
        self
    }

    pub fn with_handle(mut self, handle: &'a File) -> Self {
        self.handle = Some(handle);
        self
    }
}

impl<'a> From<&'a Path> for Request<'a> {
    fn from(path: &'a Path) -> Self {
        Self::new(path)
    }
}

/// Where and how a [`CachingAnalyzer`] keeps its cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub store_path: PathBuf,
    pub lock_path: PathBuf,
    pub backend: Backend,
    pub key_strategy: KeyStrategy,
}

impl Options {
    /// Options using the preferred engine of this build and fingerprint keys.
    pub fn new(store_path: impl Into<PathBuf>, lock_path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store_path: store_path.into(),
            lock_path: lock_path.into(),
            backend: Backend::preferred().or_raise(|| ErrorKind::Config)?,
            key_strategy: KeyStrategy::default(),
        })
    }

    pub fn with_backend(mut self, backend: Backend) -> Self {
        self.backend = backend;
        self
    }

    pub fn with_key_strategy(mut self, strategy: KeyStrategy) -> Self {
        self.key_strategy = strategy;
        self
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        let backend = match &config.store.backend {
            Some(name) => Backend::from_name(name),
            None => Backend::preferred(),
        }
        .or_raise(|| ErrorKind::Config)?;
        Ok(Self {
            store_path: config.store.path.clone(),
            lock_path: config.lock_path(),
            backend,
            key_strategy: config.key.strategy,
        })
    }
}

/// Wraps an [`Analyzer`] with a persistent, write-through cache.
///
/// # Lifecycle
/// [`open`](Self::open) takes the lock, opens the store and drops any results
/// from another analyzer version; once it returns, the instance is serving.
/// [`close`](Self::close) (or dropping the instance) releases the store and
/// then the lock. Holding the lock for the whole lifetime means a second
/// instance on the same lock file, in this process or any other, blocks in
/// `open` until this one is gone.
///
/// # Store faults
/// After a successful `open`, the cache never makes an analysis fail. A store
/// read that errors or returns bytes that don't decode counts as a miss; a
/// failed write is skipped. Both are logged and counted in
/// [`CacheStats::faults`].
///
/// # Overwrites
/// The first result written for a key wins. If a key is somehow missed while
/// an entry exists for it (see above), the fresh result is returned but the
/// stored entry is left as it was.
pub struct CachingAnalyzer<A: Analyzer> {
    // Declaration order is drop order: store before lock.
    store: CacheStore,
    lock: LockGuard,
    keys: KeyBuilder,
    analyzer: A,
    stats: CacheStats,
}

impl<A: Analyzer> CachingAnalyzer<A> {
    /// Acquire the lock, open the store, and validate its version marker.
    ///
    /// Blocks while another instance holds the lock. On failure, anything
    /// acquired so far is released (store first, then lock).
    ///
    /// The lock file and the store file must be different files; using one
    /// path for both is [`ErrorKind::Config`].
    #[instrument(skip_all, fields(store = %options.store_path.display(), backend = %options.backend, version = analyzer.version()))]
    pub fn open(options: Options, analyzer: A) -> Result<Self> {
        if options.lock_path == options.store_path {
            exn::bail!(ErrorKind::Config);
        }
        let lock = LockGuard::acquire(&options.lock_path)?;
        let mut store = CacheStore::open(&options.store_path, options.backend).or_raise(|| ErrorKind::Store)?;
        if version::ensure_fresh(&mut store, analyzer.version())? != Freshness::Current {
            tracing::info!("Cache initialised for analyzer version");
        }
        Ok(Self {
            store,
            lock,
            keys: KeyBuilder::new(options.key_strategy),
            analyzer,
            stats: CacheStats::default(),
        })
    }

    pub fn from_config(config: &Config, analyzer: A) -> Result<Self> {
        Self::open(Options::from_config(config)?, analyzer)
    }

    /// Analyze a file, answering from the cache when possible.
    ///
    /// 1. Build a key for `request.path`; a missing file has none.
    /// 2. With a key, look it up. A hit is decoded and returned without
    ///    calling the analyzer.
    /// 3. Otherwise call the analyzer with `request`, unchanged. Its error,
    ///    if any, is returned as-is and nothing is stored.
    /// 4. With a key, store the result (first write wins).
    #[instrument(level = "debug", skip_all, fields(path = %request.path.display()))]
    pub fn analyze(&mut self, request: Request<'_>) -> std::result::Result<A::Output, A::Error> {
        let key = self.keys.build(request.path);
        match &key {
            Some(key) => {
                if let Some(cached) = self.lookup(key) {
                    self.stats.hits += 1;
                    tracing::debug!(%key, "Cache hit");
                    return Ok(cached);
                }
                self.stats.misses += 1;
                tracing::debug!(%key, "Cache miss");
            },
            None => {
                self.stats.bypassed += 1;
                tracing::debug!("No cache key for file; bypassing cache");
            },
        }
        let result = self.analyzer.analyze(&request)?;
        if let Some(key) = &key {
            self.save(key, &result);
        }
        Ok(result)
    }

    /// Shorthand for [`analyze`](Self::analyze) with only a path.
    pub fn analyze_path(&mut self, path: impl AsRef<Path>) -> std::result::Result<A::Output, A::Error> {
        self.analyze(Request::new(path.as_ref()))
    }

    fn lookup(&mut self, key: &CacheKey) -> Option<A::Output> {
        let bytes = match self.store.get(key.as_str()) {
            Ok(bytes) => bytes?,
            Err(err) => {
                self.stats.faults += 1;
                tracing::warn!(%key, error = ?err, "Cache read failed; treating as a miss");
                return None;
            },
        };
        match codec::decode(&bytes) {
            Ok(value) => Some(value),
            Err(err) => {
                self.stats.faults += 1;
                tracing::warn!(%key, error = ?err, "Cached entry is unreadable; treating as a miss");
                None
            },
        }
    }

    fn save(&mut self, key: &CacheKey, result: &A::Output) {
        let written = codec::encode(result)
            .and_then(|bytes| self.store.insert(key.as_str(), &bytes).or_raise(|| ErrorKind::Store));
        match written {
            Ok(Insert::Created) => self.stats.writes += 1,
            Ok(Insert::Exists) => {
                self.stats.ignored += 1;
                tracing::debug!(%key, "Entry already stored; keeping the existing value");
            },
            Err(err) => {
                self.stats.faults += 1;
                tracing::warn!(%key, error = ?err, "Cache write failed; result not cached");
            },
        }
    }

    /// Drop every cached result, keeping the store tied to the current
    /// analyzer version.
    pub fn clear_cache(&mut self) -> Result<()> {
        self.store.clear(self.analyzer.version()).or_raise(|| ErrorKind::Store)
    }

    /// Number of cached results.
    pub fn len(&self) -> Result<u64> {
        self.store.len().or_raise(|| ErrorKind::Store)
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn analyzer(&self) -> &A {
        &self.analyzer
    }

    pub fn key_strategy(&self) -> KeyStrategy {
        self.keys.strategy()
    }

    /// Close the store, then release the lock.
    ///
    /// The lock is released even if closing the store fails.
    #[instrument(skip_all, fields(store = %self.store.path().display()))]
    pub fn close(self) -> Result<()> {
        let Self { mut store, mut lock, stats, .. } = self;
        let closed = store.close().or_raise(|| ErrorKind::Store);
        drop(store);
        let released = lock.release();
        tracing::debug!(?stats, "Cache closed");
        closed?;
        released
    }
}
