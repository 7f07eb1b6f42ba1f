//! Shared test doubles for the service crate's unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;

use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::repo::SignatureRepository;
use sigpool_core::types::{
    NewSignature, PageParams, Signature, SignatureFilter, SignatureSource, SignatureStats,
    SignatureStatus,
};

/// Build an active signature row for stubbing.
pub fn stub_signature(id: i64, value: &str, model: Option<&str>) -> Signature {
    let now = Utc::now();
    Signature {
        id,
        value: value.to_string(),
        hash: format!("{id:064x}"),
        model: model.map(String::from),
        source: SignatureSource::Manual,
        status: SignatureStatus::Active,
        use_count: 0,
        last_used_at: None,
        last_verified_at: None,
        notes: None,
        collected_from_account_id: None,
        created_at: now,
        updated_at: now,
        deleted_at: None,
    }
}

/// Repository double backing pool and processor tests.
///
/// Only the operations the pool touches are implemented; the rest panic so
/// an unexpected call fails the test loudly.
#[derive(Default)]
pub struct StubRepo {
    pub active: Mutex<Vec<Signature>>,
    pub fail_list_active: AtomicBool,
    pub fail_increment: AtomicBool,
    pub list_active_calls: AtomicUsize,
    pub incremented: Mutex<Vec<i64>>,
}

impl StubRepo {
    pub fn with_signatures(signatures: Vec<Signature>) -> Self {
        Self {
            active: Mutex::new(signatures),
            ..Self::default()
        }
    }
}

#[async_trait]
impl SignatureRepository for StubRepo {
    async fn create(&self, _new: &NewSignature) -> Result<Signature> {
        unimplemented!("not used by these tests")
    }

    async fn batch_create(&self, _new: &[NewSignature]) -> Result<usize> {
        unimplemented!("not used by these tests")
    }

    async fn get_by_id(&self, _id: i64) -> Result<Signature> {
        unimplemented!("not used by these tests")
    }

    async fn get_by_hash(&self, _hash: &str) -> Result<Signature> {
        unimplemented!("not used by these tests")
    }

    async fn exists_by_hash(&self, _hash: &str) -> Result<bool> {
        unimplemented!("not used by these tests")
    }

    async fn exists_by_hashes(&self, _hashes: &[String]) -> Result<HashMap<String, bool>> {
        unimplemented!("not used by these tests")
    }

    async fn update(&self, _sig: &Signature) -> Result<()> {
        unimplemented!("not used by these tests")
    }

    async fn delete(&self, _id: i64) -> Result<()> {
        unimplemented!("not used by these tests")
    }

    async fn batch_delete(&self, _ids: &[i64]) -> Result<usize> {
        unimplemented!("not used by these tests")
    }

    async fn delete_by_account_id(&self, _account_id: i64) -> Result<usize> {
        unimplemented!("not used by these tests")
    }

    async fn list(
        &self,
        _filter: &SignatureFilter,
        _page: &PageParams,
    ) -> Result<(Vec<Signature>, i64)> {
        unimplemented!("not used by these tests")
    }

    async fn list_active(&self, limit: i64) -> Result<Vec<Signature>> {
        let _ = self.list_active_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_list_active.load(Ordering::SeqCst) {
            return Err(SignatureError::Sqlite(rusqlite::Error::QueryReturnedNoRows));
        }
        let active = self.active.lock();
        let capped = if limit > 0 {
            active.iter().take(limit as usize).cloned().collect()
        } else {
            active.clone()
        };
        Ok(capped)
    }

    async fn increment_use_count(&self, id: i64) -> Result<()> {
        if self.fail_increment.load(Ordering::SeqCst) {
            return Err(SignatureError::NotFound(format!("id={id}")));
        }
        self.incremented.lock().push(id);
        Ok(())
    }

    async fn get_stats(&self) -> Result<SignatureStats> {
        unimplemented!("not used by these tests")
    }

    async fn query_accounts_by_name_prefix(&self, _prefix: &str, _limit: i64) -> Result<Vec<i64>> {
        unimplemented!("not used by these tests")
    }
}
