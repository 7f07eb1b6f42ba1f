//! TTL-cached random selector over the active signature catalogue.
//!
//! The pool keeps an immutable snapshot of active signatures behind a
//! readers–writer lock. Reads clone the snapshot `Arc` and release the lock
//! before touching it; reloads install a fresh snapshot rather than mutating
//! the old one. A reload failure keeps the previous snapshot (stale beats
//! empty), so a database blip never turns into `PoolEmpty` responses.

use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use sigpool_core::config::SigpoolConfig;
use sigpool_core::errors::{Result, SignatureError};
use sigpool_core::repo::SignatureRepository;
use sigpool_core::types::{CachedSignature, PoolFilter};

struct PoolCache {
    snapshot: Arc<Vec<CachedSignature>>,
    /// `None` means stale; the next read triggers a reload.
    expires_at: Option<Instant>,
}

/// Shared, process-wide signature pool.
pub struct SignaturePool {
    repo: Arc<dyn SignatureRepository>,
    cache: RwLock<PoolCache>,
    ttl: Duration,
    max_size: i64,
}

impl SignaturePool {
    /// Create a pool with compiled-default TTL and size cap.
    pub fn new(repo: Arc<dyn SignatureRepository>) -> Self {
        Self::with_config(repo, &SigpoolConfig::default())
    }

    /// Create a pool with explicit configuration.
    pub fn with_config(repo: Arc<dyn SignatureRepository>, config: &SigpoolConfig) -> Self {
        Self {
            repo,
            cache: RwLock::new(PoolCache {
                snapshot: Arc::new(Vec::new()),
                expires_at: None,
            }),
            ttl: config.pool_cache_ttl,
            max_size: config.pool_cache_max_size,
        }
    }

    /// Draw a uniformly random signature value from the pool.
    ///
    /// The model filter keeps signatures whose model is unset (universal) or
    /// listed in the filter. When the filtered set is empty but the pool is
    /// not, selection degrades to the unfiltered snapshot.
    ///
    /// Usage accounting runs detached from the caller: the selected row's
    /// use count is incremented on a spawned task that survives the request,
    /// and its failure is logged, never surfaced.
    pub async fn get_random_signature(&self, filter: Option<&PoolFilter>) -> Result<String> {
        let snapshot = self.current_snapshot().await;
        if snapshot.is_empty() {
            return Err(SignatureError::PoolEmpty);
        }

        let filtered = filter_signatures(&snapshot, filter);
        if filtered.is_empty() {
            return Err(SignatureError::PoolEmpty);
        }

        let idx = rand::thread_rng().gen_range(0..filtered.len());
        let selected = filtered[idx];

        self.mark_used(selected.id);

        Ok(selected.value.clone())
    }

    /// Mark the cache stale. The snapshot stays available to concurrent
    /// readers until the next successful reload replaces it.
    pub async fn invalidate(&self) {
        let mut cache = self.cache.write().await;
        cache.expires_at = None;
        info!("signature pool cache invalidated");
    }

    /// Size of the current in-memory snapshot. Never touches the database.
    pub async fn size(&self) -> usize {
        self.cache.read().await.snapshot.len()
    }

    /// Current snapshot, reloading when empty or expired.
    async fn current_snapshot(&self) -> Arc<Vec<CachedSignature>> {
        {
            let cache = self.cache.read().await;
            if !cache.snapshot.is_empty()
                && cache.expires_at.is_some_and(|at| Instant::now() < at)
            {
                return Arc::clone(&cache.snapshot);
            }
        }
        self.reload().await
    }

    /// Reload the snapshot from the catalogue under the write lock.
    /// On failure the previous snapshot is retained.
    async fn reload(&self) -> Arc<Vec<CachedSignature>> {
        let mut cache = self.cache.write().await;

        // Another task may have reloaded while we waited for the lock.
        if !cache.snapshot.is_empty()
            && cache.expires_at.is_some_and(|at| Instant::now() < at)
        {
            return Arc::clone(&cache.snapshot);
        }

        match self.repo.list_active(self.max_size).await {
            Ok(signatures) => {
                let snapshot: Vec<CachedSignature> = signatures
                    .into_iter()
                    .map(|sig| CachedSignature {
                        id: sig.id,
                        value: sig.value,
                        model: sig.model,
                    })
                    .collect();
                info!(count = snapshot.len(), "loaded signatures into pool cache");
                cache.snapshot = Arc::new(snapshot);
                cache.expires_at = Some(Instant::now() + self.ttl);
                Arc::clone(&cache.snapshot)
            }
            Err(e) => {
                warn!(error = %e, "failed to reload signature pool, keeping stale snapshot");
                Arc::clone(&cache.snapshot)
            }
        }
    }

    /// Detached use-count update with its own lifetime.
    fn mark_used(&self, id: i64) {
        let repo = Arc::clone(&self.repo);
        drop(tokio::spawn(async move {
            if let Err(e) = repo.increment_use_count(id).await {
                warn!(signature_id = id, error = %e, "failed to increment use count");
            } else {
                debug!(signature_id = id, "signature use recorded");
            }
        }));
    }
}

/// Apply the model filter with degradation.
///
/// Signatures without a model tag are universal and always pass. When the
/// filter removes everything, the unfiltered input is returned instead.
fn filter_signatures<'a>(
    signatures: &'a [CachedSignature],
    filter: Option<&PoolFilter>,
) -> Vec<&'a CachedSignature> {
    let models = match filter {
        Some(f) if !f.models.is_empty() => &f.models,
        _ => return signatures.iter().collect(),
    };

    let matched: Vec<&CachedSignature> = signatures
        .iter()
        .filter(|sig| {
            sig.model
                .as_ref()
                .map_or(true, |model| models.contains(model))
        })
        .collect();

    if matched.is_empty() {
        // Degrade to the unfiltered snapshot.
        return signatures.iter().collect();
    }
    matched
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
