//! [`SqliteSignatureStore`] — the pool-owning facade implementing
//! [`SignatureRepository`].
//!
//! The store owns its `r2d2` connection pool and brings the schema up to
//! date on open. The catalogue's workload shapes the connection setup:
//! reads are TTL-paced pool-snapshot reloads plus admin pages, and the
//! only contended writers are the detached single-row use-count updates.
//! WAL journaling keeps those writers from blocking snapshot reads, and a
//! small pool covers the concurrency the system actually produces.
//!
//! Queries are short and indexed, so they run on the calling task; a
//! future is cancelled by dropping it.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::Connection;

use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::repo::SignatureRepository;
use sigpool_core::types::{
    NewSignature, PageParams, Signature, SignatureFilter, SignatureStats,
};

use crate::migrations::migrate;
use crate::repositories::{AccountRepo, SignatureRepo};

/// Tunables for opening a catalogue store.
#[derive(Clone, Debug)]
pub struct StoreOptions {
    /// Connections kept in the pool.
    pub max_connections: u32,
    /// How long a statement waits on a locked database. Kept short: the
    /// writers most likely to hit contention are the detached use-count
    /// updates, whose failures are logged and dropped rather than retried.
    pub busy_timeout_ms: u32,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            max_connections: 4,
            busy_timeout_ms: 5_000,
        }
    }
}

/// Session pragmas applied to every pooled connection.
///
/// `journal_mode = WAL` persists in the database file but the rest are
/// per-connection, so all of them run on each acquire.
fn apply_catalogue_pragmas(conn: &Connection, busy_timeout_ms: u32) -> rusqlite::Result<()> {
    conn.execute_batch(&format!(
        "PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = {busy_timeout_ms};"
    ))
}

#[derive(Debug)]
struct CataloguePragmas {
    busy_timeout_ms: u32,
}

impl r2d2::CustomizeConnection<Connection, rusqlite::Error> for CataloguePragmas {
    fn on_acquire(&self, conn: &mut Connection) -> std::result::Result<(), rusqlite::Error> {
        apply_catalogue_pragmas(conn, self.busy_timeout_ms)
    }
}

/// `SQLite`-backed signature catalogue.
pub struct SqliteSignatureStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteSignatureStore {
    /// Open (or create) a file-backed catalogue and run pending schema
    /// revisions.
    pub fn open(path: &str, options: &StoreOptions) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::builder()
            .max_size(options.max_connections)
            .connection_timeout(Duration::from_secs(5))
            .connection_customizer(Box::new(CataloguePragmas {
                busy_timeout_ms: options.busy_timeout_ms,
            }))
            .build(manager)?;

        let conn = pool.get()?;
        let _ = migrate(&conn)?;
        drop(conn);

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        Ok(self.pool.get()?)
    }
}

#[async_trait]
impl SignatureRepository for SqliteSignatureStore {
    async fn create(&self, new: &NewSignature) -> Result<Signature> {
        let conn = self.conn()?;
        SignatureRepo::insert(&conn, new)
    }

    async fn batch_create(&self, new: &[NewSignature]) -> Result<usize> {
        let conn = self.conn()?;
        SignatureRepo::batch_insert(&conn, new)
    }

    async fn get_by_id(&self, id: i64) -> Result<Signature> {
        let conn = self.conn()?;
        SignatureRepo::get_by_id(&conn, id)?
            .ok_or_else(|| SignatureError::NotFound(format!("id={id}")))
    }

    async fn get_by_hash(&self, hash: &str) -> Result<Signature> {
        let conn = self.conn()?;
        SignatureRepo::get_by_hash(&conn, hash)?
            .ok_or_else(|| SignatureError::NotFound(format!("hash={hash}")))
    }

    async fn exists_by_hash(&self, hash: &str) -> Result<bool> {
        let conn = self.conn()?;
        SignatureRepo::exists_by_hash(&conn, hash)
    }

    async fn exists_by_hashes(&self, hashes: &[String]) -> Result<HashMap<String, bool>> {
        if hashes.is_empty() {
            return Ok(HashMap::new());
        }
        let conn = self.conn()?;
        let found = SignatureRepo::existing_hashes(&conn, hashes)?;
        let mut result = HashMap::with_capacity(found.len());
        for hash in found {
            let _ = result.insert(hash, true);
        }
        Ok(result)
    }

    async fn update(&self, sig: &Signature) -> Result<()> {
        let conn = self.conn()?;
        if SignatureRepo::update(&conn, sig)? {
            Ok(())
        } else {
            Err(SignatureError::NotFound(format!("id={}", sig.id)))
        }
    }

    async fn delete(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        if SignatureRepo::soft_delete(&conn, id)? {
            Ok(())
        } else {
            Err(SignatureError::NotFound(format!("id={id}")))
        }
    }

    async fn batch_delete(&self, ids: &[i64]) -> Result<usize> {
        let conn = self.conn()?;
        SignatureRepo::batch_soft_delete(&conn, ids)
    }

    async fn delete_by_account_id(&self, account_id: i64) -> Result<usize> {
        let conn = self.conn()?;
        SignatureRepo::delete_by_account(&conn, account_id)
    }

    async fn list(
        &self,
        filter: &SignatureFilter,
        page: &PageParams,
    ) -> Result<(Vec<Signature>, i64)> {
        let conn = self.conn()?;
        SignatureRepo::list(&conn, filter, page)
    }

    async fn list_active(&self, limit: i64) -> Result<Vec<Signature>> {
        let conn = self.conn()?;
        SignatureRepo::list_active(&conn, limit)
    }

    async fn increment_use_count(&self, id: i64) -> Result<()> {
        let conn = self.conn()?;
        if SignatureRepo::increment_use_count(&conn, id)? {
            Ok(())
        } else {
            Err(SignatureError::NotFound(format!("id={id}")))
        }
    }

    async fn get_stats(&self) -> Result<SignatureStats> {
        let conn = self.conn()?;
        SignatureRepo::stats(&conn)
    }

    async fn query_accounts_by_name_prefix(&self, prefix: &str, limit: i64) -> Result<Vec<i64>> {
        let conn = self.conn()?;
        AccountRepo::find_ids_by_name_prefix(&conn, prefix, limit)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
