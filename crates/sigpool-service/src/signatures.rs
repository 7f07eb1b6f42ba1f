//! Domain service: hashing, deduplication policy, and import orchestration.
//!
//! Deduplication is by hex-encoded SHA-256 of the signature value. Bulk
//! imports answer the duplicate question for the whole batch in a single
//! backend round-trip, and also deduplicate *within* the batch: a value
//! appearing twice in one import is inserted once and counted once as a
//! duplicate.

use std::collections::HashSet;
use std::sync::Arc;

use sha2::{Digest, Sha256};
use tracing::{info, warn};

use sigpool_core::config::SigpoolConfig;
use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::repo::SignatureRepository;
use sigpool_core::types::{
    BatchImportResult, NewSignature, PageParams, Signature, SignatureFilter, SignatureSource,
    SignatureStats, SignatureStatus,
};

use crate::collector::SignatureCollector;
use crate::pool::SignaturePool;

/// Maximum length accepted for a model tag.
const MODEL_MAX_LENGTH: usize = 100;

/// Hex-encoded SHA-256 of a signature value.
#[must_use]
pub fn compute_signature_hash(value: &str) -> String {
    hex::encode(Sha256::digest(value.as_bytes()))
}

/// Catalogue-facing operations: create, import, update, delete, list.
pub struct SignatureService {
    repo: Arc<dyn SignatureRepository>,
    collected_source: SignatureSource,
}

impl SignatureService {
    /// Create a service with compiled defaults.
    pub fn new(repo: Arc<dyn SignatureRepository>) -> Self {
        Self::with_config(repo, &SigpoolConfig::default())
    }

    /// Create a service with explicit configuration.
    pub fn with_config(repo: Arc<dyn SignatureRepository>, config: &SigpoolConfig) -> Self {
        Self {
            repo,
            collected_source: config.collector_default_source,
        }
    }

    /// Create a single manual signature.
    pub async fn create(
        &self,
        value: &str,
        model: Option<String>,
        notes: Option<String>,
    ) -> Result<Signature> {
        validate_value(value)?;
        validate_model(model.as_deref())?;

        let hash = compute_signature_hash(value);
        if self.repo.exists_by_hash(&hash).await? {
            return Err(SignatureError::Duplicate(hash));
        }

        self.repo
            .create(&NewSignature {
                value: value.to_string(),
                hash,
                model,
                source: SignatureSource::Manual,
                status: SignatureStatus::Active,
                notes,
                collected_from_account_id: None,
            })
            .await
    }

    /// Bulk import. `source` defaults to `imported`.
    pub async fn batch_import(
        &self,
        values: &[String],
        model: Option<String>,
        source: Option<SignatureSource>,
    ) -> Result<BatchImportResult> {
        self.import_batch(
            values,
            model,
            source.unwrap_or(SignatureSource::Imported),
            None,
        )
        .await
    }

    /// Bulk import tagged with the collecting account. `source` defaults to
    /// the configured collector source (`collected`).
    pub async fn batch_import_with_account_id(
        &self,
        values: &[String],
        model: Option<String>,
        source: Option<SignatureSource>,
        account_id: i64,
    ) -> Result<BatchImportResult> {
        self.import_batch(
            values,
            model,
            source.unwrap_or(self.collected_source),
            Some(account_id),
        )
        .await
    }

    async fn import_batch(
        &self,
        values: &[String],
        model: Option<String>,
        source: SignatureSource,
        account_id: Option<i64>,
    ) -> Result<BatchImportResult> {
        if values.is_empty() {
            return Ok(BatchImportResult::default());
        }
        validate_model(model.as_deref())?;

        let mut result = BatchImportResult {
            total: values.len(),
            ..BatchImportResult::default()
        };

        let hashes: Vec<String> = values.iter().map(|v| compute_signature_hash(v)).collect();
        let existing = self.repo.exists_by_hashes(&hashes).await?;

        // Filter duplicates: rows already in the catalogue, and repeats
        // within this batch.
        let mut seen: HashSet<&str> = HashSet::with_capacity(hashes.len());
        let mut new_sigs: Vec<NewSignature> = Vec::with_capacity(values.len());
        for (value, hash) in values.iter().zip(&hashes) {
            if existing.get(hash).copied().unwrap_or(false) || !seen.insert(hash.as_str()) {
                result.duplicated += 1;
                continue;
            }
            new_sigs.push(NewSignature {
                value: value.clone(),
                hash: hash.clone(),
                model: model.clone(),
                source,
                status: SignatureStatus::Active,
                notes: None,
                collected_from_account_id: account_id,
            });
        }

        if !new_sigs.is_empty() {
            match self.repo.batch_create(&new_sigs).await {
                Ok(imported) => result.imported = imported,
                Err(e) => {
                    result.failed = new_sigs.len();
                    warn!(
                        total = result.total,
                        duplicated = result.duplicated,
                        failed = result.failed,
                        error = %e,
                        "batch import failed"
                    );
                    return Err(SignatureError::BatchImportFailed {
                        result,
                        source: Box::new(e),
                    });
                }
            }
        }

        info!(
            total = result.total,
            imported = result.imported,
            duplicated = result.duplicated,
            source = source.as_str(),
            "batch import complete"
        );
        Ok(result)
    }

    /// Fetch a signature by id.
    pub async fn get_by_id(&self, id: i64) -> Result<Signature> {
        self.repo.get_by_id(id).await
    }

    /// Update status, model, and notes. Passing `None` clears the model or
    /// notes — this mirrors the admin surface, where an omitted field means
    /// "remove", not "keep".
    pub async fn update(
        &self,
        id: i64,
        status: SignatureStatus,
        model: Option<String>,
        notes: Option<String>,
    ) -> Result<()> {
        validate_model(model.as_deref())?;

        let mut sig = self.repo.get_by_id(id).await?;
        sig.status = status;
        sig.model = model;
        sig.notes = notes;
        self.repo.update(&sig).await
    }

    /// Soft-delete one signature.
    pub async fn delete(&self, id: i64) -> Result<()> {
        self.repo.delete(id).await
    }

    /// Soft-delete a set of signatures, returning the number affected.
    pub async fn batch_delete(&self, ids: &[i64]) -> Result<usize> {
        self.repo.batch_delete(ids).await
    }

    /// Soft-delete everything collected from one account.
    pub async fn delete_by_account_id(&self, account_id: i64) -> Result<usize> {
        self.repo.delete_by_account_id(account_id).await
    }

    /// Filtered, paginated catalogue listing.
    pub async fn list(
        &self,
        filter: &SignatureFilter,
        page: &PageParams,
    ) -> Result<(Vec<Signature>, i64)> {
        self.repo.list(filter, page).await
    }

    /// Catalogue-wide aggregates.
    pub async fn get_stats(&self) -> Result<SignatureStats> {
        self.repo.get_stats().await
    }

    /// Drain a collector into the catalogue at response completion.
    ///
    /// Anything new invalidates the pool so freshly collected signatures
    /// become selectable without waiting out the TTL.
    pub async fn import_collected(
        &self,
        collector: &SignatureCollector,
        pool: &SignaturePool,
    ) -> Result<BatchImportResult> {
        let values = collector.get_collected();
        if values.is_empty() {
            return Ok(BatchImportResult::default());
        }

        let result = self
            .batch_import_with_account_id(
                &values,
                collector.model().map(String::from),
                None,
                collector.account_id(),
            )
            .await?;

        if result.imported > 0 {
            pool.invalidate().await;
        }
        Ok(result)
    }
}

fn validate_value(value: &str) -> Result<()> {
    if value.is_empty() {
        return Err(SignatureError::InvalidInput(
            "signature value is empty".into(),
        ));
    }
    Ok(())
}

fn validate_model(model: Option<&str>) -> Result<()> {
    if let Some(model) = model {
        if model.len() > MODEL_MAX_LENGTH {
            return Err(SignatureError::InvalidInput(format!(
                "model tag exceeds {MODEL_MAX_LENGTH} characters"
            )));
        }
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use sigpool_store::{SqliteSignatureStore, StoreOptions};

    fn open_repo(dir: &tempfile::TempDir) -> Arc<SqliteSignatureStore> {
        let path = dir.path().join("sigpool.db");
        Arc::new(
            SqliteSignatureStore::open(path.to_str().unwrap(), &StoreOptions::default()).unwrap(),
        )
    }

    fn service(repo: Arc<SqliteSignatureStore>) -> SignatureService {
        SignatureService::new(repo)
    }

    // ── hashing ──────────────────────────────────────────────────────────

    #[test]
    fn hash_is_hex_sha256() {
        // Known vector: SHA-256("abc")
        assert_eq!(
            compute_signature_hash("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    // ── create ───────────────────────────────────────────────────────────

    #[tokio::test]
    async fn create_persists_with_computed_hash() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        let sig = svc.create("abc", Some("m1".into()), None).await.unwrap();
        assert_eq!(sig.hash, compute_signature_hash("abc"));
        assert_eq!(sig.source, SignatureSource::Manual);
        assert_eq!(sig.status, SignatureStatus::Active);
        assert_eq!(sig.use_count, 0);
    }

    #[tokio::test]
    async fn second_create_is_duplicate() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        let _ = svc.create("abc", None, None).await.unwrap();
        let err = svc.create("abc", None, None).await.unwrap_err();
        assert!(matches!(err, SignatureError::Duplicate(_)));
    }

    #[tokio::test]
    async fn create_rejects_empty_value() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));
        let err = svc.create("", None, None).await.unwrap_err();
        assert!(matches!(err, SignatureError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn create_rejects_oversized_model() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));
        let err = svc
            .create("v", Some("m".repeat(101)), None)
            .await
            .unwrap_err();
        assert!(matches!(err, SignatureError::InvalidInput(_)));
    }

    // ── batch import ─────────────────────────────────────────────────────

    #[tokio::test]
    async fn batch_import_counts_catalogue_and_in_batch_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        // "X" pre-exists in the catalogue.
        let _ = svc.create("X", None, None).await.unwrap();

        let values: Vec<String> = vec!["X".into(), "Y".into(), "Y".into()];
        let result = svc.batch_import(&values, None, None).await.unwrap();
        assert_eq!(
            result,
            BatchImportResult {
                total: 3,
                imported: 1,
                duplicated: 2,
                failed: 0,
            }
        );
    }

    #[tokio::test]
    async fn batch_import_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        let values: Vec<String> = vec!["a".into(), "b".into(), "c".into()];
        let first = svc.batch_import(&values, None, None).await.unwrap();
        assert_eq!(first.imported, 3);

        let second = svc.batch_import(&values, None, None).await.unwrap();
        assert_eq!(second.imported, 0);
        assert_eq!(second.duplicated, 3);
    }

    #[tokio::test]
    async fn batch_import_empty_input() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));
        let result = svc.batch_import(&[], None, None).await.unwrap();
        assert_eq!(result, BatchImportResult::default());
    }

    #[tokio::test]
    async fn batch_import_defaults_to_imported_source() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir);
        let svc = service(Arc::clone(&repo));

        let values: Vec<String> = vec!["v1".into()];
        let _ = svc.batch_import(&values, None, None).await.unwrap();

        let sig = repo
            .get_by_hash(&compute_signature_hash("v1"))
            .await
            .unwrap();
        assert_eq!(sig.source, SignatureSource::Imported);
        assert!(sig.collected_from_account_id.is_none());
    }

    #[tokio::test]
    async fn batch_import_with_account_tags_rows() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir);
        let svc = service(Arc::clone(&repo));

        let values: Vec<String> = vec!["v1".into(), "v2".into()];
        let result = svc
            .batch_import_with_account_id(&values, Some("m1".into()), None, 77)
            .await
            .unwrap();
        assert_eq!(result.imported, 2);

        let sig = repo
            .get_by_hash(&compute_signature_hash("v1"))
            .await
            .unwrap();
        assert_eq!(sig.source, SignatureSource::Collected);
        assert_eq!(sig.collected_from_account_id, Some(77));
        assert_eq!(sig.model.as_deref(), Some("m1"));
    }

    // ── update / delete ──────────────────────────────────────────────────

    #[tokio::test]
    async fn update_clears_model_and_notes_on_none() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        let sig = svc
            .create("v", Some("m1".into()), Some("note".into()))
            .await
            .unwrap();
        svc.update(sig.id, SignatureStatus::Disabled, None, None)
            .await
            .unwrap();

        let fetched = svc.get_by_id(sig.id).await.unwrap();
        assert_eq!(fetched.status, SignatureStatus::Disabled);
        assert!(fetched.model.is_none());
        assert!(fetched.notes.is_none());
    }

    #[tokio::test]
    async fn batch_delete_second_call_affects_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let svc = service(open_repo(&dir));

        let a = svc.create("a", None, None).await.unwrap();
        let b = svc.create("b", None, None).await.unwrap();

        let ids = vec![a.id, b.id];
        assert_eq!(svc.batch_delete(&ids).await.unwrap(), 2);
        assert_eq!(svc.batch_delete(&ids).await.unwrap(), 0);
    }

    // ── collector drain ──────────────────────────────────────────────────

    #[tokio::test]
    async fn import_collected_persists_and_invalidates_pool() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir);
        let svc = service(Arc::clone(&repo));
        let pool = SignaturePool::new(repo.clone());

        // Warm the pool on a single pre-existing signature.
        let _ = svc.create("warm-signature", None, None).await.unwrap();
        let _ = pool.get_random_signature(None).await.unwrap();
        assert_eq!(pool.size().await, 1);

        let collector = SignatureCollector::new(9, Some("m1".into()), 4);
        collector.collect("collected-signature");
        let result = svc.import_collected(&collector, &pool).await.unwrap();
        assert_eq!(result.imported, 1);

        // The drain invalidated the cache, so the next draw sees both rows.
        let _ = pool.get_random_signature(None).await.unwrap();
        assert_eq!(pool.size().await, 2);
    }

    #[tokio::test]
    async fn import_collected_empty_collector_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let repo = open_repo(&dir);
        let svc = service(Arc::clone(&repo));
        let pool = SignaturePool::new(repo);

        let collector = SignatureCollector::new(9, None, 4);
        let result = svc.import_collected(&collector, &pool).await.unwrap();
        assert_eq!(result, BatchImportResult::default());
    }
}
