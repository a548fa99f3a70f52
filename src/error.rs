//! Error types for the reorganization orchestrator.
//!
//! Mirrors the error-kind taxonomy from the design: usage errors (bad CLI
//! combinations), skip-worthy errors (version mismatch, missing extension),
//! precondition failures (no PK, no cluster key, conflicting trigger), and
//! fatal lock-acquire errors. Recoverable conditions (lock retry, drain
//! waiting) are handled inline by their respective loops and never surface
//! as `ReorgError`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ReorgError>;

/// Top-level error type for one orchestration run.
#[derive(Debug, Error)]
pub enum ReorgError {
    /// Bad CLI combination (e.g. `--all` with `--table`). Fatal, no DB activity.
    #[error("usage error: {0}")]
    Usage(String),

    /// Underlying database error (connection, query execution).
    #[error("database error: {0}")]
    Database(#[from] postgres::Error),

    /// This database should be skipped (version mismatch, missing extension).
    /// Not fatal to the overall run; the all-databases driver continues.
    #[error("skipped: {0}")]
    Skip(String),

    /// Target-precondition failure: no primary key, no cluster key in
    /// cluster mode, or a conflicting trigger. Fatal for this table run.
    #[error("precondition failed: {0}")]
    Precondition(String),

    /// Lock acquisition failed in a way that isn't a retryable cancellation
    /// (SQLSTATE other than `57014`). The session is considered compromised.
    #[error("lock acquisition failed: {0}")]
    LockFatal(String),
}

impl ReorgError {
    /// True if this error should cause the current database to be skipped
    /// rather than aborting the whole run (see the all-databases driver).
    #[must_use]
    pub const fn is_skip(&self) -> bool {
        matches!(self, Self::Skip(_))
    }
}
