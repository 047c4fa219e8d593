/// Counters kept by a [`CachingAnalyzer`](crate::CachingAnalyzer) over its
/// lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Lookups answered from the store.
    pub hits: u64,
    /// Lookups that fell through to the analyzer.
    pub misses: u64,
    /// Requests for which no key could be built (e.g. missing file).
    pub bypassed: u64,
    /// Results written to the store.
    pub writes: u64,
    /// Writes skipped because the key was already present.
    pub ignored: u64,
    /// Store or codec failures that were degraded to a miss or a skipped write.
    pub faults: u64,
}

impl CacheStats {
    pub fn lookups(&self) -> u64 {
        self.hits + self.misses
    }

    /// Fraction of lookups answered from the store, `0.0` before any lookup.
    pub fn hit_ratio(&self) -> f64 {
        match self.lookups() {
            0 => 0.0,
            lookups => self.hits as f64 / lookups as f64,
        }
    }
}
