//! Raw database row structs and timestamp encoding.
//!
//! Rows carry column values exactly as stored; conversion into domain types
//! happens in [`SignatureRow::into_signature`]. Timestamps are RFC 3339 UTC
//! with fixed microsecond precision and a `Z` suffix so that lexicographic
//! comparison in SQL matches chronological order.

use chrono::{DateTime, SecondsFormat, Utc};

use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::types::Signature;

/// Encode a timestamp for storage.
#[must_use]
pub fn encode_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Decode a stored timestamp.
pub fn decode_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| SignatureError::InvalidInput(format!("bad stored timestamp {raw:?}: {e}")))
}

fn decode_optional(raw: Option<&str>) -> Result<Option<DateTime<Utc>>> {
    raw.map(decode_timestamp).transpose()
}

/// Raw `signatures` row.
#[derive(Clone, Debug)]
pub struct SignatureRow {
    pub id: i64,
    pub value: String,
    pub hash: String,
    pub model: Option<String>,
    pub source: String,
    pub status: String,
    pub use_count: i64,
    pub last_used_at: Option<String>,
    pub last_verified_at: Option<String>,
    pub notes: Option<String>,
    pub collected_from_account_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl SignatureRow {
    /// Map a `rusqlite` row selected with the canonical column order.
    pub fn map_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            value: row.get(1)?,
            hash: row.get(2)?,
            model: row.get(3)?,
            source: row.get(4)?,
            status: row.get(5)?,
            use_count: row.get(6)?,
            last_used_at: row.get(7)?,
            last_verified_at: row.get(8)?,
            notes: row.get(9)?,
            collected_from_account_id: row.get(10)?,
            created_at: row.get(11)?,
            updated_at: row.get(12)?,
            deleted_at: row.get(13)?,
        })
    }

    /// Convert into the domain type, decoding enums and timestamps.
    pub fn into_signature(self) -> Result<Signature> {
        Ok(Signature {
            id: self.id,
            value: self.value,
            hash: self.hash,
            model: self.model,
            source: self.source.parse()?,
            status: self.status.parse()?,
            use_count: self.use_count,
            last_used_at: decode_optional(self.last_used_at.as_deref())?,
            last_verified_at: decode_optional(self.last_verified_at.as_deref())?,
            notes: self.notes,
            collected_from_account_id: self.collected_from_account_id,
            created_at: decode_timestamp(&self.created_at)?,
            updated_at: decode_timestamp(&self.updated_at)?,
            deleted_at: decode_optional(self.deleted_at.as_deref())?,
        })
    }
}

/// Canonical SELECT column list matching [`SignatureRow::map_row`].
pub const SIGNATURE_COLUMNS: &str = "id, value, hash, model, source, status, use_count, \
     last_used_at, last_verified_at, notes, collected_from_account_id, \
     created_at, updated_at, deleted_at";

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
