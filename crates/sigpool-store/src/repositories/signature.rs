//! Signature repository — all SQL against the `signatures` table.
//!
//! Every read excludes soft-deleted rows. Hash uniqueness is enforced by a
//! partial unique index over live rows; insert paths translate that
//! violation into [`SignatureError::Duplicate`].

use chrono::{Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::types::{
    NewSignature, PageParams, Signature, SignatureFilter, SignatureStats,
};

use crate::repositories::account::AccountRepo;
use crate::row_types::{encode_timestamp, SignatureRow, SIGNATURE_COLUMNS};

/// Cap on accounts resolved for the name-prefix filter.
const ACCOUNT_PREFIX_LIMIT: i64 = 100;

/// Signature repository — stateless, every method takes `&Connection`.
pub struct SignatureRepo;

impl SignatureRepo {
    /// Insert one signature and return the stored row.
    pub fn insert(conn: &Connection, new: &NewSignature) -> Result<Signature> {
        let now = encode_timestamp(Utc::now());
        let _ = conn
            .execute(
                "INSERT INTO signatures
                   (value, hash, model, source, status, use_count, notes,
                    collected_from_account_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
                params![
                    new.value,
                    new.hash,
                    new.model,
                    new.source.as_str(),
                    new.status.as_str(),
                    new.notes,
                    new.collected_from_account_id,
                    now,
                ],
            )
            .map_err(|e| translate_unique_violation(e, &new.hash))?;

        let id = conn.last_insert_rowid();
        Self::get_by_id(conn, id)?
            .ok_or_else(|| SignatureError::NotFound(format!("id={id}")))
    }

    /// Insert a batch in one transaction, returning the number inserted.
    /// Any unique-hash violation rolls back the whole batch.
    pub fn batch_insert(conn: &Connection, new: &[NewSignature]) -> Result<usize> {
        if new.is_empty() {
            return Ok(0);
        }

        let tx = conn.unchecked_transaction()?;
        let now = encode_timestamp(Utc::now());
        {
            let mut stmt = tx.prepare(
                "INSERT INTO signatures
                   (value, hash, model, source, status, use_count, notes,
                    collected_from_account_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 0, ?6, ?7, ?8, ?8)",
            )?;
            for sig in new {
                let _ = stmt
                    .execute(params![
                        sig.value,
                        sig.hash,
                        sig.model,
                        sig.source.as_str(),
                        sig.status.as_str(),
                        sig.notes,
                        sig.collected_from_account_id,
                        now,
                    ])
                    .map_err(|e| translate_unique_violation(e, &sig.hash))?;
            }
        }
        tx.commit()?;
        Ok(new.len())
    }

    /// Get a live signature by id.
    pub fn get_by_id(conn: &Connection, id: i64) -> Result<Option<Signature>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures
                     WHERE id = ?1 AND deleted_at IS NULL"
                ),
                params![id],
                SignatureRow::map_row,
            )
            .optional()?;
        row.map(SignatureRow::into_signature).transpose()
    }

    /// Get a live signature by content hash.
    pub fn get_by_hash(conn: &Connection, hash: &str) -> Result<Option<Signature>> {
        let row = conn
            .query_row(
                &format!(
                    "SELECT {SIGNATURE_COLUMNS} FROM signatures
                     WHERE hash = ?1 AND deleted_at IS NULL"
                ),
                params![hash],
                SignatureRow::map_row,
            )
            .optional()?;
        row.map(SignatureRow::into_signature).transpose()
    }

    /// Whether a live signature with this hash exists.
    pub fn exists_by_hash(conn: &Connection, hash: &str) -> Result<bool> {
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM signatures WHERE hash = ?1 AND deleted_at IS NULL)",
            params![hash],
            |row| row.get(0),
        )?;
        Ok(exists)
    }

    /// The subset of `hashes` present among live rows, in one query.
    pub fn existing_hashes(conn: &Connection, hashes: &[String]) -> Result<Vec<String>> {
        if hashes.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders: Vec<String> = (1..=hashes.len()).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "SELECT DISTINCT hash FROM signatures
             WHERE hash IN ({}) AND deleted_at IS NULL",
            placeholders.join(", ")
        );

        let mut stmt = conn.prepare(&sql)?;
        let params: Vec<&dyn rusqlite::types::ToSql> = hashes
            .iter()
            .map(|h| h as &dyn rusqlite::types::ToSql)
            .collect();
        let found = stmt
            .query_map(params.as_slice(), |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(found)
    }

    /// Persist status/model/notes. `value` and `hash` are immutable.
    /// Returns false when the id does not name a live row.
    pub fn update(conn: &Connection, sig: &Signature) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE signatures
             SET status = ?1, model = ?2, notes = ?3, updated_at = ?4
             WHERE id = ?5 AND deleted_at IS NULL",
            params![
                sig.status.as_str(),
                sig.model,
                sig.notes,
                encode_timestamp(Utc::now()),
                sig.id,
            ],
        )?;
        Ok(changed > 0)
    }

    /// Soft-delete one signature. Returns false when already gone.
    pub fn soft_delete(conn: &Connection, id: i64) -> Result<bool> {
        let now = encode_timestamp(Utc::now());
        let changed = conn.execute(
            "UPDATE signatures SET deleted_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    /// Soft-delete a set of signatures, returning the number affected.
    pub fn batch_soft_delete(conn: &Connection, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let now = encode_timestamp(Utc::now());
        let placeholders: Vec<String> = (2..=ids.len() + 1).map(|i| format!("?{i}")).collect();
        let sql = format!(
            "UPDATE signatures SET deleted_at = ?1, updated_at = ?1
             WHERE id IN ({}) AND deleted_at IS NULL",
            placeholders.join(", ")
        );

        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::with_capacity(ids.len() + 1);
        params.push(Box::new(now));
        for id in ids {
            params.push(Box::new(*id));
        }
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(Box::as_ref).collect();

        let changed = conn.execute(&sql, params_refs.as_slice())?;
        Ok(changed)
    }

    /// Soft-delete every signature collected from the given account.
    pub fn delete_by_account(conn: &Connection, account_id: i64) -> Result<usize> {
        let now = encode_timestamp(Utc::now());
        let changed = conn.execute(
            "UPDATE signatures SET deleted_at = ?1, updated_at = ?1
             WHERE collected_from_account_id = ?2 AND deleted_at IS NULL",
            params![now, account_id],
        )?;
        Ok(changed)
    }

    /// Filtered, paginated listing ordered by `created_at` descending.
    /// Returns the page plus the total match count.
    pub fn list(
        conn: &Connection,
        filter: &SignatureFilter,
        page: &PageParams,
    ) -> Result<(Vec<Signature>, i64)> {
        let mut clauses: Vec<String> = vec!["deleted_at IS NULL".into()];
        let mut params: Vec<Box<dyn rusqlite::types::ToSql>> = Vec::new();

        if let Some(status) = filter.status {
            params.push(Box::new(status.as_str()));
            clauses.push(format!("status = ?{}", params.len()));
        }
        if let Some(source) = filter.source {
            params.push(Box::new(source.as_str()));
            clauses.push(format!("source = ?{}", params.len()));
        }
        if let Some(ref model) = filter.model {
            params.push(Box::new(model.clone()));
            clauses.push(format!("model = ?{}", params.len()));
        }
        if let Some(ref search) = filter.search {
            params.push(Box::new(format!("%{search}%")));
            let n = params.len();
            clauses.push(format!("(value LIKE ?{n} OR notes LIKE ?{n})"));
        }
        if let Some(ref prefix) = filter.account_name_prefix {
            let account_ids =
                AccountRepo::find_ids_by_name_prefix(conn, prefix, ACCOUNT_PREFIX_LIMIT)?;
            if account_ids.is_empty() {
                // No matching accounts, so no signatures can match either.
                return Ok((Vec::new(), 0));
            }
            let mut placeholders = Vec::with_capacity(account_ids.len());
            for id in account_ids {
                params.push(Box::new(id));
                placeholders.push(format!("?{}", params.len()));
            }
            clauses.push(format!(
                "collected_from_account_id IN ({})",
                placeholders.join(", ")
            ));
        }
        if let Some(account_id) = filter.collected_from_account_id {
            params.push(Box::new(account_id));
            clauses.push(format!("collected_from_account_id = ?{}", params.len()));
        }

        let where_clause = clauses.join(" AND ");
        let params_refs: Vec<&dyn rusqlite::types::ToSql> =
            params.iter().map(Box::as_ref).collect();

        let total: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM signatures WHERE {where_clause}"),
            params_refs.as_slice(),
            |row| row.get(0),
        )?;

        let sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM signatures
             WHERE {where_clause}
             ORDER BY created_at DESC, id DESC
             LIMIT {} OFFSET {}",
            page.limit(),
            page.offset()
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(params_refs.as_slice(), SignatureRow::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let signatures = rows
            .into_iter()
            .map(SignatureRow::into_signature)
            .collect::<Result<Vec<_>>>()?;
        Ok((signatures, total))
    }

    /// Active, live signatures ordered by `use_count` descending
    /// (tie-break: id ascending). `limit <= 0` means no cap.
    pub fn list_active(conn: &Connection, limit: i64) -> Result<Vec<Signature>> {
        let mut sql = format!(
            "SELECT {SIGNATURE_COLUMNS} FROM signatures
             WHERE status = 'active' AND deleted_at IS NULL
             ORDER BY use_count DESC, id ASC"
        );
        if limit > 0 {
            use std::fmt::Write;
            let _ = write!(sql, " LIMIT {limit}");
        }

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map([], SignatureRow::map_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(SignatureRow::into_signature)
            .collect()
    }

    /// Atomically add 1 to `use_count` and stamp `last_used_at`.
    /// Returns false when the id does not name a live row.
    pub fn increment_use_count(conn: &Connection, id: i64) -> Result<bool> {
        let now = encode_timestamp(Utc::now());
        let changed = conn.execute(
            "UPDATE signatures
             SET use_count = use_count + 1, last_used_at = ?1, updated_at = ?1
             WHERE id = ?2 AND deleted_at IS NULL",
            params![now, id],
        )?;
        Ok(changed > 0)
    }

    /// Catalogue-wide aggregates over live rows, in a single query.
    pub fn stats(conn: &Connection) -> Result<SignatureStats> {
        let day_ago = encode_timestamp(Utc::now() - Duration::hours(24));
        let stats = conn.query_row(
            "SELECT COUNT(*),
                    COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'disabled' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN status = 'expired' THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(use_count), 0),
                    COALESCE(SUM(CASE WHEN last_used_at >= ?1 THEN 1 ELSE 0 END), 0)
             FROM signatures
             WHERE deleted_at IS NULL",
            params![day_ago],
            |row| {
                Ok(SignatureStats {
                    total: row.get(0)?,
                    active: row.get(1)?,
                    disabled: row.get(2)?,
                    expired: row.get(3)?,
                    total_usage: row.get(4)?,
                    recently_used: row.get(5)?,
                })
            },
        )?;
        Ok(stats)
    }
}

/// Translate a unique-index violation on the hash column into `Duplicate`.
fn translate_unique_violation(err: rusqlite::Error, hash: &str) -> SignatureError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE =>
        {
            SignatureError::Duplicate(hash.to_string())
        }
        _ => SignatureError::Sqlite(err),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
