//! Cache Error Types
//!
//! This module provides structured errors using `exn` for automatic location
//! tracking and error tree construction.
//!
//! Errors raised by the wrapped [`Analyzer`](crate::Analyzer) never show up
//! here: they are handed back to the caller as-is.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A cache error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
///
/// ### Lock Errors
/// - [`ErrorKind::LockFileCreateFailed`]
/// - [`ErrorKind::LockFileNotWritable`]
/// - [`ErrorKind::LockFailed`]
///
/// ### Dependency Errors
/// - [`ErrorKind::Store`] - inspect the child frame for the
///   [`tagstash_store::error::ErrorKind`].
/// - [`ErrorKind::Config`]
#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("failed to create lock file: {}", _0.display())]
    LockFileCreateFailed(#[error(not(source))] PathBuf),
    #[display("lock file is not writable: {}", _0.display())]
    LockFileNotWritable(#[error(not(source))] PathBuf),
    /// The OS refused the lock itself (not contention, which just blocks).
    #[display("failed to lock: {}", _0.display())]
    LockFailed(#[error(not(source))] PathBuf),
    /// Opening, validating, clearing or closing the store failed.
    #[display("cache store error")]
    Store,
    /// A result could not be encoded, or stored bytes could not be decoded.
    #[display("invalid cache data")]
    InvalidData,
    /// The configuration names something this build can't provide.
    #[display("invalid cache configuration")]
    Config,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
