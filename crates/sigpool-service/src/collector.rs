//! Per-response sink for signatures observed in passing streams.
//!
//! A collector lives for the duration of one upstream response. Event
//! handlers may run concurrently if the transport fans out, so the buffer
//! is lock-guarded even though the common case is single-threaded.

use parking_lot::Mutex;
use tracing::debug;

use sigpool_core::constants::DEFAULT_SIGNATURE_MIN_LENGTH;

/// Thread-safe signature sink with a length gate.
pub struct SignatureCollector {
    signatures: Mutex<Vec<String>>,
    min_length: usize,
    account_id: i64,
    model: Option<String>,
}

impl SignatureCollector {
    /// Create a collector for one upstream response.
    ///
    /// `min_length = 0` falls back to the compiled default.
    pub fn new(account_id: i64, model: Option<String>, min_length: usize) -> Self {
        let min_length = if min_length == 0 {
            DEFAULT_SIGNATURE_MIN_LENGTH
        } else {
            min_length
        };
        Self {
            signatures: Mutex::new(Vec::new()),
            min_length,
            account_id,
            model,
        }
    }

    /// Record a signature value. Values at or below the length gate are
    /// discarded. No deduplication happens here; the import path
    /// deduplicates by content hash.
    pub fn collect(&self, signature: &str) {
        if signature.len() <= self.min_length {
            return;
        }

        self.signatures.lock().push(signature.to_string());
        debug!(
            account_id = self.account_id,
            length = signature.len(),
            "collected signature"
        );
    }

    /// Defensive copy of everything collected so far.
    #[must_use]
    pub fn get_collected(&self) -> Vec<String> {
        self.signatures.lock().clone()
    }

    /// Number of signatures collected so far.
    #[must_use]
    pub fn count(&self) -> usize {
        self.signatures.lock().len()
    }

    /// Account the response belongs to.
    #[must_use]
    pub fn account_id(&self) -> i64 {
        self.account_id
    }

    /// Model of the originating request, if known.
    #[must_use]
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
