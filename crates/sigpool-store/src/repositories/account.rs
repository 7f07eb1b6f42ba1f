//! Account repository — the side channel behind the account-name filter.
//!
//! The wider system owns accounts; this store only needs enough of the
//! table to resolve a name prefix to ids when listing collected signatures.

use chrono::Utc;
use rusqlite::{params, Connection};

use sigpool_core::errors::Result;

use crate::row_types::encode_timestamp;

/// Account repository — stateless, every method takes `&Connection`.
pub struct AccountRepo;

impl AccountRepo {
    /// Insert an account, returning its id.
    pub fn insert(conn: &Connection, name: &str) -> Result<i64> {
        let _ = conn.execute(
            "INSERT INTO accounts (name, created_at) VALUES (?1, ?2)",
            params![name, encode_timestamp(Utc::now())],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Ids of live accounts whose name starts with `prefix`, capped at `limit`.
    pub fn find_ids_by_name_prefix(
        conn: &Connection,
        prefix: &str,
        limit: i64,
    ) -> Result<Vec<i64>> {
        let mut stmt = conn.prepare(
            "SELECT id FROM accounts
             WHERE name LIKE ?1 AND deleted_at IS NULL
             ORDER BY id ASC
             LIMIT ?2",
        )?;
        let ids = stmt
            .query_map(params![format!("{prefix}%"), limit], |row| row.get(0))?
            .collect::<std::result::Result<Vec<i64>, _>>()?;
        Ok(ids)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
