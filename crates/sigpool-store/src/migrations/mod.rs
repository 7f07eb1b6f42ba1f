//! Schema revisions for the catalogue database.
//!
//! The applied revision lives in SQLite's `user_version` pragma — an
//! integer slot in the database header — so no bookkeeping table is
//! needed. [`migrate`] applies each revision past the stored one inside
//! its own transaction and bumps `user_version` within that transaction:
//! a failed revision rolls back whole, version bump included.
//!
//! Revision SQL is embedded at compile time. Re-running [`migrate`] on an
//! up-to-date database is a no-op.

use rusqlite::Connection;
use tracing::info;

use sigpool_core::errors::{Result, SignatureError};

/// Ordered schema revisions. A stored `user_version` of N means the first
/// N entries have been applied.
const REVISIONS: &[(&str, &str)] = &[(
    "signature catalogue and accounts side table",
    include_str!("v001_schema.sql"),
)];

/// Bring the database up to the latest schema revision.
///
/// Returns the number of revisions applied (0 when already current).
///
/// # Errors
///
/// Returns [`SignatureError::Migration`] when a revision fails, or when
/// the stored revision is ahead of what this build knows.
pub fn migrate(conn: &Connection) -> Result<u32> {
    let current = schema_version(conn)?;
    let target = latest_revision();

    if current > target {
        return Err(SignatureError::Migration {
            message: format!(
                "database is at schema revision {current}, this build only knows up to {target}"
            ),
        });
    }

    let mut applied = 0;
    for (number, &(name, sql)) in REVISIONS.iter().enumerate().skip(current as usize) {
        let revision = number as u32 + 1;
        apply_revision(conn, revision, name, sql)?;
        info!(revision, name, "applied schema revision");
        applied += 1;
    }

    Ok(applied)
}

/// The schema revision stored in the database (`PRAGMA user_version`).
pub fn schema_version(conn: &Connection) -> Result<u32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(|e| SignatureError::Migration {
            message: format!("failed to read user_version: {e}"),
        })
}

/// The newest revision this build can apply.
#[must_use]
pub fn latest_revision() -> u32 {
    REVISIONS.len() as u32
}

fn apply_revision(conn: &Connection, revision: u32, name: &str, sql: &str) -> Result<()> {
    let failed = |stage: &str, e: rusqlite::Error| SignatureError::Migration {
        message: format!("revision {revision} ({name}) failed at {stage}: {e}"),
    };

    let tx = conn
        .unchecked_transaction()
        .map_err(|e| failed("begin", e))?;
    tx.execute_batch(sql).map_err(|e| failed("execute", e))?;
    tx.pragma_update(None, "user_version", revision)
        .map_err(|e| failed("version bump", e))?;
    tx.commit().map_err(|e| failed("commit", e))?;
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
