//! Domain types for the signature catalogue and its in-memory projections.
//!
//! A [`Signature`] is an opaque text token attached to a thinking block in a
//! streamed model response. Rows are soft-deleted and deduplicated by the
//! SHA-256 hash of their value; only `active`, non-deleted rows are eligible
//! for pool selection.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::SignatureError;

/// Where a signature entered the catalogue.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureSource {
    /// Passively collected from an upstream response.
    Collected,
    /// Bulk imported.
    Imported,
    /// Added by hand.
    #[default]
    Manual,
}

impl SignatureSource {
    /// Stable string form, matching the persisted column values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Collected => "collected",
            Self::Imported => "imported",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for SignatureSource {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "collected" => Ok(Self::Collected),
            "imported" => Ok(Self::Imported),
            "manual" => Ok(Self::Manual),
            other => Err(SignatureError::InvalidInput(format!(
                "unknown signature source: {other}"
            ))),
        }
    }
}

/// Lifecycle status of a signature.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStatus {
    /// Eligible for pool selection.
    #[default]
    Active,
    /// Administratively disabled.
    Disabled,
    /// Failed verification.
    Expired,
}

impl SignatureStatus {
    /// Stable string form, matching the persisted column values.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Disabled => "disabled",
            Self::Expired => "expired",
        }
    }
}

impl FromStr for SignatureStatus {
    type Err = SignatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "disabled" => Ok(Self::Disabled),
            "expired" => Ok(Self::Expired),
            other => Err(SignatureError::InvalidInput(format!(
                "unknown signature status: {other}"
            ))),
        }
    }
}

/// A persisted signature row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Signature {
    /// Stable 64-bit id, assigned on insert.
    pub id: i64,
    /// Opaque text payload (base64-encoded upstream). Never empty.
    pub value: String,
    /// Hex-encoded SHA-256 of `value`. Unique among live rows.
    pub hash: String,
    /// Optional model tag (≤ 100 chars).
    pub model: Option<String>,
    /// How the signature entered the catalogue.
    pub source: SignatureSource,
    /// Lifecycle status.
    pub status: SignatureStatus,
    /// Monotonically non-decreasing usage counter.
    pub use_count: i64,
    /// Last time the signature was handed out by the pool.
    pub last_used_at: Option<DateTime<Utc>>,
    /// Last time the signature passed verification. Written by the
    /// verification subsystem, never by this crate family.
    pub last_verified_at: Option<DateTime<Utc>>,
    /// Free-form notes.
    pub notes: Option<String>,
    /// Owning account when `source` is `collected`.
    pub collected_from_account_id: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker. Deleted rows are excluded from normal reads.
    pub deleted_at: Option<DateTime<Utc>>,
}

/// Fields for inserting a signature. `use_count` starts at zero and the
/// lifecycle timestamps are assigned by the store.
#[derive(Clone, Debug)]
pub struct NewSignature {
    pub value: String,
    pub hash: String,
    pub model: Option<String>,
    pub source: SignatureSource,
    pub status: SignatureStatus,
    pub notes: Option<String>,
    pub collected_from_account_id: Option<i64>,
}

/// In-memory pool projection of a signature.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CachedSignature {
    pub id: i64,
    pub value: String,
    pub model: Option<String>,
}

/// Filter for catalogue listing.
#[derive(Clone, Debug, Default)]
pub struct SignatureFilter {
    /// Exact status match.
    pub status: Option<SignatureStatus>,
    /// Exact source match.
    pub source: Option<SignatureSource>,
    /// Exact model match.
    pub model: Option<String>,
    /// Substring search over `value` or `notes`.
    pub search: Option<String>,
    /// Prefix match over the owning account's name.
    pub account_name_prefix: Option<String>,
    /// Exact owning-account match.
    pub collected_from_account_id: Option<i64>,
}

/// 1-based page parameters for catalogue listing.
#[derive(Clone, Copy, Debug)]
pub struct PageParams {
    pub page: i64,
    pub page_size: i64,
}

impl Default for PageParams {
    fn default() -> Self {
        Self {
            page: 1,
            page_size: 20,
        }
    }
}

impl PageParams {
    /// Row offset for the current page. Pages below 1 are clamped.
    #[must_use]
    pub fn offset(&self) -> i64 {
        (self.page.max(1) - 1) * self.limit()
    }

    /// Row cap for the current page. Sizes below 1 fall back to the default.
    #[must_use]
    pub fn limit(&self) -> i64 {
        if self.page_size < 1 {
            20
        } else {
            self.page_size
        }
    }
}

/// Catalogue-wide aggregate counters.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SignatureStats {
    pub total: i64,
    pub active: i64,
    pub disabled: i64,
    pub expired: i64,
    /// `SUM(use_count)` over live rows.
    pub total_usage: i64,
    /// Rows used within the last 24 hours.
    pub recently_used: i64,
}

/// Outcome of a bulk import.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BatchImportResult {
    pub total: usize,
    pub imported: usize,
    pub duplicated: usize,
    pub failed: usize,
}

/// How the stream processor treats signature deltas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignatureStrategy {
    /// Rewrite every upstream signature and inject when missing.
    AlwaysReplace,
    /// Keep upstream signatures, inject only when missing.
    FillMissing,
    /// Leave the stream untouched.
    #[default]
    Disabled,
}

impl SignatureStrategy {
    /// Stable string form.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AlwaysReplace => "always_replace",
            Self::FillMissing => "fill_missing",
            Self::Disabled => "disabled",
        }
    }
}

/// Pool selection filter. An empty model list is the identity filter.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolFilter {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub models: Vec<String>,
}

/// Per-account signature handling policy.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SignatureConfig {
    /// Master switch for signature handling.
    pub enabled: bool,
    /// Delta rewrite/injection strategy.
    #[serde(default)]
    pub strategy: SignatureStrategy,
    /// Optional pool selection filter.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pool_filter: Option<PoolFilter>,
    /// Whether passing signatures are collected.
    pub enable_collection: bool,
    /// Collector length gate: values of this length or shorter are dropped.
    #[serde(default = "default_min_length")]
    pub min_length: usize,
}

fn default_min_length() -> usize {
    crate::constants::DEFAULT_SIGNATURE_MIN_LENGTH
}

impl Default for SignatureConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            strategy: SignatureStrategy::Disabled,
            pool_filter: None,
            enable_collection: false,
            min_length: default_min_length(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
