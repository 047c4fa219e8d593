//! Invalidation of stores written by a different analyzer version.

use crate::error::{ErrorKind, Result};
use exn::ResultExt;
use tagstash_store::CacheStore;
use tracing::instrument;

/// What [`ensure_fresh`] found.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Freshness {
    /// The store already carried the current version marker.
    Current,
    /// The store was created by this open; it only needed the marker.
    Created,
    /// The marker was missing or stale, and the store was wiped.
    Cleared,
}

/// Make sure `store` only holds results produced by analyzer `version`.
///
/// Reads the version marker; if it is absent or differs from `version`, the
/// store is cleared, which also writes the new marker. A store that was just
/// created (and is still empty) gets the marker written directly instead of
/// being recreated a second time. Must run once, right after the store is
/// opened and before it serves any lookups.
#[instrument(skip(store), fields(path = %store.path().display()))]
pub fn ensure_fresh(store: &mut CacheStore, version: &str) -> Result<Freshness> {
    if store.was_created() && store.is_empty().or_raise(|| ErrorKind::Store)? {
        store.set_marker(version).or_raise(|| ErrorKind::Store)?;
        return Ok(Freshness::Created);
    }
    let marker = store.marker(version).or_raise(|| ErrorKind::Store)?;
    if marker.as_deref() == Some(version) {
        return Ok(Freshness::Current);
    }
    tracing::info!(version, "Cache version marker missing or stale; clearing cache");
    store.clear(version).or_raise(|| ErrorKind::Store)?;
    Ok(Freshness::Cleared)
}
