//! Cache keys derived from file identity.

use std::fmt;
use std::fs::{self, File};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};
use tagstash_config::KeyStrategy;
use tracing::instrument;

/// Identifies one cached result.
///
/// Compared by exact string equality. The path is used exactly as given: no
/// canonicalisation, no separator or case folding, so `./a.flac` and `a.flac`
/// are different keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Builds [`CacheKey`]s according to a [`KeyStrategy`].
///
/// | Strategy      | Key                              |
/// |---------------|----------------------------------|
/// | `Fingerprint` | `{path}::{mtime}::{size}`        |
/// | `ContentHash` | `{path}::blake3:{hash}::{size}`  |
///
/// `mtime` is whole seconds since the Unix epoch, so with the default
/// strategy two different files with the same path, size and timestamp
/// collide. `ContentHash` avoids that at the cost of reading every file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeyBuilder {
    strategy: KeyStrategy,
}

impl KeyBuilder {
    pub fn new(strategy: KeyStrategy) -> Self {
        Self { strategy }
    }

    pub fn strategy(&self) -> KeyStrategy {
        self.strategy
    }

    /// Build the key for the file at `path`.
    ///
    /// Returns `None` when no key can be derived: the file doesn't exist, is
    /// not a regular file, can't be read, or its path is not valid UTF-8.
    /// Callers must then bypass the cache entirely.
    #[instrument(level = "trace", skip(self), fields(path = %path.display()))]
    pub fn build(&self, path: &Path) -> Option<CacheKey> {
        let Some(name) = path.to_str() else {
            tracing::debug!("Path is not valid UTF-8; no cache key");
            return None;
        };
        let metadata = fs::metadata(path).ok().filter(|metadata| metadata.is_file())?;
        let size = metadata.len();
        let key = match self.strategy {
            KeyStrategy::Fingerprint => {
                let modified = unix_seconds(metadata.modified().ok()?)?;
                format!("{name}::{modified}::{size}")
            },
            KeyStrategy::ContentHash => {
                let hash = hash_contents(path).ok()?;
                format!("{name}::blake3:{hash}::{size}")
            },
        };
        Some(CacheKey(key))
    }
}

/// Whole seconds since the Unix epoch, rounded down like `st_mtime`.
///
/// Any timestamp the filesystem can hold is accepted, including ones outside
/// the range of calendar types.
fn unix_seconds(time: SystemTime) -> Option<i64> {
    match time.duration_since(UNIX_EPOCH) {
        Ok(after) => i64::try_from(after.as_secs()).ok(),
        Err(err) => {
            let before = err.duration();
            let seconds = i64::try_from(before.as_secs()).ok()?;
            Some(if before.subsec_nanos() > 0 { -seconds - 1 } else { -seconds })
        },
    }
}

fn hash_contents(path: &Path) -> std::io::Result<String> {
    let mut hasher = blake3::Hasher::new();
    hasher.update_reader(File::open(path)?)?;
    Ok(hasher.finalize().to_hex().to_string())
}
