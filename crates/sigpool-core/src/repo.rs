//! Persistence interface consumed by the pool cache and domain service.
//!
//! The trait is intentionally exhaustive: it enumerates every backend
//! operation the core performs, so alternative stores (and test doubles)
//! implement exactly this surface and nothing more.
//!
//! Cancellation follows normal Rust async semantics — dropping a returned
//! future abandons the call. Work that must outlive a request (the detached
//! use-count update) is spawned onto the runtime by the caller instead.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::errors::Result;
use crate::types::{
    NewSignature, PageParams, Signature, SignatureFilter, SignatureStats,
};

/// Catalogue operations over persisted signatures.
#[async_trait]
pub trait SignatureRepository: Send + Sync {
    /// Insert one signature. Fails with `Duplicate` if the hash is already
    /// present among live rows.
    async fn create(&self, new: &NewSignature) -> Result<Signature>;

    /// Insert a batch in one transaction, returning the number inserted.
    /// The caller is expected to have filtered duplicates; a unique-hash
    /// violation still fails the whole batch with `Duplicate`.
    async fn batch_create(&self, new: &[NewSignature]) -> Result<usize>;

    /// Fetch a live signature by id.
    async fn get_by_id(&self, id: i64) -> Result<Signature>;

    /// Fetch a live signature by content hash.
    async fn get_by_hash(&self, hash: &str) -> Result<Signature>;

    /// Whether a live signature with this hash exists.
    async fn exists_by_hash(&self, hash: &str) -> Result<bool>;

    /// Batch existence check restricted to live rows, answered in a single
    /// round-trip. Empty input returns an empty map without touching the
    /// backend.
    async fn exists_by_hashes(&self, hashes: &[String]) -> Result<HashMap<String, bool>>;

    /// Persist status/model/notes changes. `value` and `hash` are immutable
    /// after insert and are not written.
    async fn update(&self, sig: &Signature) -> Result<()>;

    /// Soft-delete one signature.
    async fn delete(&self, id: i64) -> Result<()>;

    /// Soft-delete a set of signatures, returning the number affected.
    /// Already-deleted ids are skipped, so the call is idempotent in effect.
    async fn batch_delete(&self, ids: &[i64]) -> Result<usize>;

    /// Soft-delete every signature collected from the given account.
    async fn delete_by_account_id(&self, account_id: i64) -> Result<usize>;

    /// Filtered, paginated listing ordered by `created_at` descending.
    /// Returns the page plus the total match count.
    async fn list(
        &self,
        filter: &SignatureFilter,
        page: &PageParams,
    ) -> Result<(Vec<Signature>, i64)>;

    /// Active, live signatures ordered by `use_count` descending
    /// (tie-break: id ascending). `limit <= 0` means no cap.
    async fn list_active(&self, limit: i64) -> Result<Vec<Signature>>;

    /// Atomically add 1 to `use_count` and stamp `last_used_at`.
    async fn increment_use_count(&self, id: i64) -> Result<()>;

    /// Catalogue-wide aggregate counters.
    async fn get_stats(&self) -> Result<SignatureStats>;

    /// Ids of live accounts whose name starts with `prefix`, capped at
    /// `limit`. Side channel used by [`list`](Self::list) for the
    /// account-name filter.
    async fn query_accounts_by_name_prefix(&self, prefix: &str, limit: i64) -> Result<Vec<i64>>;
}
