//! Error types for the signature pool system.
//!
//! [`SignatureError`] is the single error type returned across the
//! repository, pool, and domain service. Stream processing never surfaces
//! these: the processor swallows and logs them, passing lines through.

use thiserror::Error;

/// Errors that can occur in signature pool operations.
#[derive(Debug, Error)]
pub enum SignatureError {
    /// `SQLite` database error.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Connection pool error.
    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    /// JSON serialization/deserialization error.
    #[error("serde error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Schema migration failed.
    #[error("migration error: {message}")]
    Migration {
        /// Describes which migration failed and why.
        message: String,
    },

    /// Requested signature was not found.
    #[error("signature not found: {0}")]
    NotFound(String),

    /// A signature with the same content hash already exists.
    #[error("signature already exists: {0}")]
    Duplicate(String),

    /// Caller-supplied input was rejected.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Selection was attempted on an empty (or filtered-empty) pool.
    #[error("signature pool is empty")]
    PoolEmpty,

    /// The batch insert behind an import failed. Carries the partial
    /// outcome so callers can still report totals and duplicate counts.
    #[error("batch import failed: {source}")]
    BatchImportFailed {
        result: crate::types::BatchImportResult,
        #[source]
        source: Box<SignatureError>,
    },
}

/// Convenience type alias for signature pool results.
pub type Result<T> = std::result::Result<T, SignatureError>;

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
