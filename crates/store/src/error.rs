//! Store Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A store error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Construction Errors
/// - [`ErrorKind::ExtensionUnavailable`]
/// - [`ErrorKind::DriverUnsupported`]
/// - [`ErrorKind::StoreCreateFailed`]
/// - [`ErrorKind::StoreOpenFailed`]
/// - [`ErrorKind::InUse`]
///
/// ### Operational Errors
/// - [`ErrorKind::ClearCacheFailed`]
/// - [`ErrorKind::Database`]
/// - [`ErrorKind::Closed`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// This build was compiled without any storage engine.
    #[display("no storage engine compiled into this build")]
    ExtensionUnavailable,
    /// The requested storage engine is unknown, or not enabled in this build.
    #[display("unsupported storage engine: {_0}")]
    DriverUnsupported(#[error(not(source))] String),
    /// The store file did not exist and could not be created.
    #[display("failed to create store file: {}", _0.display())]
    StoreCreateFailed(#[error(not(source))] PathBuf),
    /// Neither the existing store nor a fresh replacement could be opened.
    #[display("failed to open store file: {}", _0.display())]
    StoreOpenFailed(#[error(not(source))] PathBuf),
    /// Another live handle holds the store file open. The file is left alone.
    #[display("store file is already open elsewhere: {}", _0.display())]
    InUse(#[error(not(source))] PathBuf),
    /// The store could not be recreated while clearing it.
    #[display("failed to clear cache/recreate store file: {}", _0.display())]
    ClearCacheFailed(#[error(not(source))] PathBuf),
    /// An already-open engine failed a read or a write.
    #[display("database error")]
    Database,
    /// The store has been closed.
    #[display("store is closed")]
    Closed,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database | Self::InUse(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ErrorKind::ExtensionUnavailable, "no storage engine compiled into this build")]
    #[case(ErrorKind::DriverUnsupported("gdbm".to_string()), "unsupported storage engine: gdbm")]
    #[case(ErrorKind::StoreOpenFailed(PathBuf::from("/tmp/cache.db")), "failed to open store file: /tmp/cache.db")]
    #[case(ErrorKind::InUse(PathBuf::from("/tmp/cache.db")), "store file is already open elsewhere: /tmp/cache.db")]
    fn error_kind_display(#[case] kind: ErrorKind, #[case] expected: &str) {
        assert_eq!(kind.to_string(), expected);
    }

    #[test]
    fn error_kind_retryable() {
        assert!(ErrorKind::Database.is_retryable());
        assert!(ErrorKind::InUse(PathBuf::from("x")).is_retryable());
        assert!(!ErrorKind::Closed.is_retryable());
        assert!(!ErrorKind::ClearCacheFailed(PathBuf::from("x")).is_retryable());
    }
}
