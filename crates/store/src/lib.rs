//! Embedded key-value store for the tagstash analysis cache.
//!
//! A [`CacheStore`] is a single file on disk holding two namespaces:
//! - **entries**: cache keys mapped to opaque, already-serialized results.
//! - **meta**: reserved bookkeeping (the version marker). Keeping it apart
//!   means no cache key can ever shadow the marker.
//!
//! The on-disk format is chosen with [`Backend`]. Engines are compiled in via
//! cargo features (`redb` by default, `sqlite` optionally).
//!
//! The store does no locking of its own beyond what the engine does: callers
//! are expected to hold an exclusive lock for as long as a store is open.

mod engine;
pub mod error;
mod store;

use crate::error::{ErrorKind, Result};
use exn::OptionExt;
use std::fmt;
use std::str::FromStr;

pub use crate::store::CacheStore;

/// A supported on-disk storage engine.
///
/// Variants gated behind feature flags (`redb`, `sqlite`) are only available
/// when the corresponding feature is enabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Pure-Rust embedded B-tree (`.redb`).
    #[cfg(feature = "redb")]
    Redb,
    /// SQLite database file.
    #[cfg(feature = "sqlite")]
    Sqlite,
}

const AVAILABLE: &[Backend] = &[
    #[cfg(feature = "redb")]
    Backend::Redb,
    #[cfg(feature = "sqlite")]
    Backend::Sqlite,
];

impl Backend {
    /// Every engine compiled into this build, in order of preference.
    pub fn available() -> &'static [Backend] {
        AVAILABLE
    }

    /// The first available engine.
    ///
    /// Fails with [`ErrorKind::ExtensionUnavailable`] when the crate was built
    /// with every engine feature disabled.
    pub fn preferred() -> Result<Self> {
        Self::available().first().copied().ok_or_raise(|| ErrorKind::ExtensionUnavailable)
    }

    /// Resolve an engine by name (case-insensitive).
    ///
    /// Fails with [`ErrorKind::DriverUnsupported`] if the name is unknown or
    /// names an engine that was not compiled in.
    pub fn from_name(name: impl AsRef<str>) -> Result<Self> {
        let name = name.as_ref();
        if Self::available().is_empty() {
            exn::bail!(ErrorKind::ExtensionUnavailable);
        }
        Self::available()
            .iter()
            .copied()
            .find(|backend| backend.aliases().iter().any(|alias| alias.eq_ignore_ascii_case(name)))
            .ok_or_raise(|| ErrorKind::DriverUnsupported(name.to_string()))
    }

    /// Canonical name, as accepted by [`Backend::from_name`].
    pub fn name(self) -> &'static str {
        self.aliases()[0]
    }

    fn aliases(self) -> &'static [&'static str] {
        match self {
            #[cfg(feature = "redb")]
            Self::Redb => &["redb"],
            #[cfg(feature = "sqlite")]
            Self::Sqlite => &["sqlite", "sqlite3"],
        }
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Backend {
    type Err = error::Error;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_name(s)
    }
}

/// Outcome of [`CacheStore::insert`].
///
/// Inserts never overwrite: the first value written under a key wins.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Insert {
    /// The key was absent and now holds the new value.
    Created,
    /// The key was already present; the stored value is unchanged.
    Exists,
}

/// Logical table inside a store file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Namespace {
    Entries,
    Meta,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn preferred_is_first_available() {
        let preferred = Backend::preferred().unwrap();
        assert_eq!(Some(&preferred), Backend::available().first());
    }

    #[rstest]
    #[case("gdbm")]
    #[case("db4")]
    #[case("")]
    fn unknown_backend_is_unsupported(#[case] name: &str) {
        let err = Backend::from_name(name).unwrap_err();
        assert_eq!(*err, ErrorKind::DriverUnsupported(name.to_string()));
    }

    #[test]
    fn backend_names_round_trip() {
        for backend in Backend::available() {
            assert_eq!(Backend::from_name(backend.name()).unwrap(), *backend);
            assert_eq!(backend.to_string().to_uppercase().parse::<Backend>().unwrap(), *backend);
        }
    }

    #[cfg(feature = "redb")]
    #[test]
    fn redb_is_preferred_when_enabled() {
        assert_eq!(Backend::preferred().unwrap(), Backend::Redb);
    }

    #[cfg(not(feature = "sqlite"))]
    #[test]
    fn disabled_backend_is_unsupported() {
        let err = Backend::from_name("sqlite").unwrap_err();
        assert_eq!(*err, ErrorKind::DriverUnsupported("sqlite".to_string()));
    }
}
