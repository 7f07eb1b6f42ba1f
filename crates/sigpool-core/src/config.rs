//! Process-wide configuration with environment overrides.
//!
//! Loading flow:
//! 1. Start with compiled defaults ([`SigpoolConfig::default`])
//! 2. Apply environment variable overrides
//!
//! Each env var has strict parsing rules; invalid values are silently
//! ignored so a typo falls back to the default instead of failing startup.

use std::time::Duration;

use tracing::debug;

use crate::constants::{
    DEFAULT_POOL_CACHE_MAX_SIZE, DEFAULT_POOL_CACHE_TTL_SECS, DEFAULT_SIGNATURE_MIN_LENGTH,
};
use crate::types::SignatureSource;

/// Process-wide tunables for the signature pool system.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SigpoolConfig {
    /// Pool snapshot time-to-live.
    pub pool_cache_ttl: Duration,
    /// Cap on signatures loaded into the pool snapshot.
    pub pool_cache_max_size: i64,
    /// Default collector length gate for new collectors.
    pub signature_min_length: usize,
    /// Source tag applied to collector-drained imports.
    pub collector_default_source: SignatureSource,
}

impl Default for SigpoolConfig {
    fn default() -> Self {
        Self {
            pool_cache_ttl: Duration::from_secs(DEFAULT_POOL_CACHE_TTL_SECS),
            pool_cache_max_size: DEFAULT_POOL_CACHE_MAX_SIZE,
            signature_min_length: DEFAULT_SIGNATURE_MIN_LENGTH,
            collector_default_source: SignatureSource::Collected,
        }
    }
}

impl SigpoolConfig {
    /// Compiled defaults with environment overrides applied.
    #[must_use]
    pub fn from_env() -> Self {
        let mut config = Self::default();
        apply_env_overrides(&mut config);
        config
    }
}

/// Apply environment variable overrides to a config.
///
/// - `POOL_CACHE_TTL` — snapshot TTL in seconds (1..=86400)
/// - `POOL_CACHE_MAX_SIZE` — snapshot row cap (1..=100000)
/// - `SIGNATURE_MIN_LENGTH` — collector length gate (0..=10000)
/// - `COLLECTOR_DEFAULT_SOURCE` — one of `collected`/`imported`/`manual`
pub fn apply_env_overrides(config: &mut SigpoolConfig) {
    if let Some(secs) = read_env_i64("POOL_CACHE_TTL", 1, 86_400) {
        config.pool_cache_ttl = Duration::from_secs(secs as u64);
    }
    if let Some(size) = read_env_i64("POOL_CACHE_MAX_SIZE", 1, 100_000) {
        config.pool_cache_max_size = size;
    }
    if let Some(len) = read_env_i64("SIGNATURE_MIN_LENGTH", 0, 10_000) {
        config.signature_min_length = len as usize;
    }
    if let Ok(raw) = std::env::var("COLLECTOR_DEFAULT_SOURCE") {
        match raw.parse::<SignatureSource>() {
            Ok(source) => config.collector_default_source = source,
            Err(_) => debug!(value = %raw, "ignoring invalid COLLECTOR_DEFAULT_SOURCE"),
        }
    }
}

/// Read an integer env var, requiring it to parse and fall within
/// `[min, max]`. Out-of-range or unparseable values are ignored.
fn read_env_i64(name: &str, min: i64, max: i64) -> Option<i64> {
    let raw = std::env::var(name).ok()?;
    match raw.parse::<i64>() {
        Ok(v) if (min..=max).contains(&v) => Some(v),
        _ => {
            debug!(var = name, value = %raw, "ignoring invalid env override");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let config = SigpoolConfig::default();
        assert_eq!(config.pool_cache_ttl, Duration::from_secs(300));
        assert_eq!(config.pool_cache_max_size, 1000);
        assert_eq!(config.signature_min_length, 350);
        assert_eq!(config.collector_default_source, SignatureSource::Collected);
    }

    // Env overrides are exercised in one test to avoid races between
    // parallel tests mutating the same process environment.
    #[test]
    fn env_overrides_apply_and_reject() {
        std::env::set_var("POOL_CACHE_TTL", "60");
        std::env::set_var("POOL_CACHE_MAX_SIZE", "not a number");
        std::env::set_var("SIGNATURE_MIN_LENGTH", "500");
        std::env::set_var("COLLECTOR_DEFAULT_SOURCE", "imported");

        let config = SigpoolConfig::from_env();
        assert_eq!(config.pool_cache_ttl, Duration::from_secs(60));
        assert_eq!(config.pool_cache_max_size, 1000); // invalid → default
        assert_eq!(config.signature_min_length, 500);
        assert_eq!(config.collector_default_source, SignatureSource::Imported);

        std::env::remove_var("POOL_CACHE_TTL");
        std::env::remove_var("POOL_CACHE_MAX_SIZE");
        std::env::remove_var("SIGNATURE_MIN_LENGTH");
        std::env::remove_var("COLLECTOR_DEFAULT_SOURCE");
    }

    #[test]
    fn read_env_range_check() {
        std::env::set_var("SIGPOOL_TEST_RANGE", "999999");
        assert_eq!(read_env_i64("SIGPOOL_TEST_RANGE", 1, 1000), None);
        std::env::set_var("SIGPOOL_TEST_RANGE", "42");
        assert_eq!(read_env_i64("SIGPOOL_TEST_RANGE", 1, 1000), Some(42));
        std::env::remove_var("SIGPOOL_TEST_RANGE");
    }
}
