//! Package-level constants and compiled configuration defaults.

/// Current version of the sigpool workspace.
pub const VERSION: &str = "0.1.0";

/// Package name.
pub const NAME: &str = "sigpool";

/// Default pool cache time-to-live, in seconds.
pub const DEFAULT_POOL_CACHE_TTL_SECS: u64 = 300;

/// Default cap on signatures loaded into the pool snapshot.
pub const DEFAULT_POOL_CACHE_MAX_SIZE: i64 = 1000;

/// Default collector length gate: values of this length or shorter are
/// discarded.
pub const DEFAULT_SIGNATURE_MIN_LENGTH: usize = 350;
