//! Persistent, lock-protected cache in front of a file analyzer.
//!
//! Analyzing a media file (reading headers, walking tag frames, ...) is slow,
//! and the answer doesn't change until the file does. [`CachingAnalyzer`]
//! wraps any [`Analyzer`] and remembers its results in an embedded store on
//! disk, so repeated runs only pay for files that are new or modified.
//!
//! # Architecture
//! - [`KeyBuilder`] turns a path into a [`CacheKey`] (path, mtime and size by
//!   default).
//! - [`LockGuard`] holds an exclusive lock on a separate lock file for as long
//!   as the store is open, so only one process uses the store at a time.
//! - [`tagstash_store::CacheStore`] persists serialized results.
//! - [`ensure_fresh`] wipes the store whenever the analyzer version changes.
//!
//! ```no_run
//! use tagstash_cache::{Analyzer, CachingAnalyzer, Options, Request};
//!
//! struct Duration;
//!
//! impl Analyzer for Duration {
//!     type Output = u64;
//!     type Error = std::io::Error;
//!
//!     fn version(&self) -> &str {
//!         "1.0.0"
//!     }
//!
//!     fn analyze(&self, request: &Request<'_>) -> Result<u64, std::io::Error> {
//!         Ok(std::fs::metadata(request.path)?.len() / 44_100)
//!     }
//! }
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let options = Options::new("/tmp/tagstash.db", "/tmp/tagstash.lock").map_err(|e| format!("{e:?}"))?;
//! let mut cache = CachingAnalyzer::open(options, Duration).map_err(|e| format!("{e:?}"))?;
//! let _seconds = cache.analyze_path("file1.flac")?;
//! cache.close().map_err(|e| format!("{e:?}"))?;
//! # Ok(())
//! # }
//! ```

mod analyzer;
pub mod codec;
pub mod error;
mod key;
mod lock;
mod stats;
mod version;

pub use crate::analyzer::{Analyzer, CachingAnalyzer, Options, Request};
pub use crate::key::{CacheKey, KeyBuilder};
pub use crate::lock::LockGuard;
pub use crate::stats::CacheStats;
pub use crate::version::{Freshness, ensure_fresh};
pub use tagstash_config::{Config, KeyStrategy};
pub use tagstash_store::{Backend, CacheStore, Insert};
