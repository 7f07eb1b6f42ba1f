//! Per-response SSE state machine for thinking-block signatures.
//!
//! The processor consumes the stream line by line. Non-`data:` lines and
//! `data: [DONE]` pass through untouched. For thinking blocks it tracks
//! per-index state across `content_block_start` / `content_block_delta` /
//! `content_block_stop`, rewriting `signature_delta` payloads in place or
//! synthesising one the upstream never sent.
//!
//! Nothing in here breaks the stream: pool misses, JSON parse failures, and
//! mutation errors are logged and the original line is emitted.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use sigpool_core::types::{SignatureConfig, SignatureStrategy};

use crate::collector::SignatureCollector;
use crate::pool::SignaturePool;

/// Tracked state for one thinking block.
#[derive(Clone, Debug, Default)]
pub struct ThinkingBlockState {
    /// Block index within the response.
    pub index: i64,
    /// Whether `content_block_start` was seen.
    pub started: bool,
    /// Whether any `signature_delta` was seen.
    pub has_signature_delta: bool,
    /// The signature value the upstream sent.
    pub received_signature: String,
    /// Whether `content_block_stop` was seen.
    pub stopped: bool,
}

/// One processed input line: the (possibly rewritten) line itself plus any
/// synthetic lines to emit immediately before it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ProcessedLine {
    /// Lines to emit before `line`, in order.
    pub inject_before: Vec<String>,
    /// The output line.
    pub line: String,
}

impl ProcessedLine {
    fn passthrough(line: &str) -> Self {
        Self {
            inject_before: Vec::new(),
            line: line.to_string(),
        }
    }
}

/// Processing counters for one stream.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ProcessorStats {
    /// Thinking blocks tracked.
    pub thinking_blocks: usize,
    /// Blocks that carried an upstream signature.
    pub with_signature: usize,
    /// Blocks that did not.
    pub without_signature: usize,
}

/// Wire shape of the events the processor cares about. Everything else is
/// opaque and passes through.
#[derive(Debug, Default, Deserialize)]
struct SseEvent {
    #[serde(rename = "type", default)]
    event_type: String,
    #[serde(default)]
    index: i64,
    #[serde(default)]
    delta: Option<Value>,
    #[serde(default)]
    content_block: Option<Value>,
}

#[derive(Debug, Default, Deserialize)]
struct ContentBlockPayload {
    #[serde(rename = "type", default)]
    block_type: String,
}

#[derive(Debug, Default, Deserialize)]
struct DeltaPayload {
    #[serde(rename = "type", default)]
    delta_type: String,
    #[serde(default)]
    signature: String,
}

/// Stateful per-response transformer over SSE lines.
pub struct SignatureStreamProcessor {
    blocks: Mutex<HashMap<i64, ThinkingBlockState>>,
    config: SignatureConfig,
    pool: Arc<SignaturePool>,
    collector: Option<Arc<SignatureCollector>>,
    account_id: i64,
}

impl SignatureStreamProcessor {
    /// Create a processor for one upstream response.
    pub fn new(
        config: SignatureConfig,
        pool: Arc<SignaturePool>,
        account_id: i64,
        collector: Option<Arc<SignatureCollector>>,
    ) -> Self {
        Self {
            blocks: Mutex::new(HashMap::new()),
            config,
            pool,
            collector,
            account_id,
        }
    }

    /// Process a single SSE line.
    ///
    /// Returns the output line and any synthetic lines to emit immediately
    /// before it. Within one stream, output order equals input order.
    pub async fn process_line(&self, line: &str) -> ProcessedLine {
        let Some(data) = strip_data_prefix(line) else {
            return ProcessedLine::passthrough(line);
        };
        if data.is_empty() || data == "[DONE]" {
            return ProcessedLine::passthrough(line);
        }

        let Ok(event) = serde_json::from_str::<SseEvent>(data) else {
            return ProcessedLine::passthrough(line);
        };

        match event.event_type.as_str() {
            "content_block_start" => self.handle_content_block_start(line, &event),
            "content_block_delta" => self.handle_content_block_delta(line, data, &event).await,
            "content_block_stop" => self.handle_content_block_stop(line, event.index).await,
            _ => ProcessedLine::passthrough(line),
        }
    }

    /// Number of thinking blocks tracked so far.
    #[must_use]
    pub fn thinking_block_count(&self) -> usize {
        self.blocks.lock().len()
    }

    /// Processing counters for this stream.
    #[must_use]
    pub fn stats(&self) -> ProcessorStats {
        let blocks = self.blocks.lock();
        let with_signature = blocks.values().filter(|b| b.has_signature_delta).count();
        ProcessorStats {
            thinking_blocks: blocks.len(),
            with_signature,
            without_signature: blocks.len() - with_signature,
        }
    }

    // ─── Event handlers ──────────────────────────────────────────────────

    fn handle_content_block_start(&self, line: &str, event: &SseEvent) -> ProcessedLine {
        let block: ContentBlockPayload = match &event.content_block {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(block) => block,
                Err(_) => return ProcessedLine::passthrough(line),
            },
            None => return ProcessedLine::passthrough(line),
        };

        if block.block_type != "thinking" {
            return ProcessedLine::passthrough(line);
        }

        let _ = self.blocks.lock().insert(
            event.index,
            ThinkingBlockState {
                index: event.index,
                started: true,
                ..ThinkingBlockState::default()
            },
        );

        debug!(
            account_id = self.account_id,
            index = event.index,
            "thinking block started"
        );

        // The signature field inside content_block_start is an empty string
        // upstream; it is never rewritten here.
        ProcessedLine::passthrough(line)
    }

    async fn handle_content_block_delta(
        &self,
        line: &str,
        data: &str,
        event: &SseEvent,
    ) -> ProcessedLine {
        let delta: DeltaPayload = match &event.delta {
            Some(raw) => match serde_json::from_value(raw.clone()) {
                Ok(delta) => delta,
                Err(_) => return ProcessedLine::passthrough(line),
            },
            None => return ProcessedLine::passthrough(line),
        };

        if delta.delta_type != "signature_delta" {
            return ProcessedLine::passthrough(line);
        }

        {
            let mut blocks = self.blocks.lock();
            if let Some(block) = blocks.get_mut(&event.index) {
                block.has_signature_delta = true;
                block.received_signature = delta.signature.clone();

                if let Some(collector) = &self.collector {
                    if !delta.signature.is_empty() {
                        collector.collect(&delta.signature);
                    }
                }
            }
        }

        match self.config.strategy {
            SignatureStrategy::AlwaysReplace => {
                self.replace_signature_in_line(line, data, event.index).await
            }
            SignatureStrategy::FillMissing => {
                debug!(
                    account_id = self.account_id,
                    index = event.index,
                    "upstream signature kept"
                );
                ProcessedLine::passthrough(line)
            }
            SignatureStrategy::Disabled => ProcessedLine::passthrough(line),
        }
    }

    async fn handle_content_block_stop(&self, line: &str, index: i64) -> ProcessedLine {
        let needs_injection = {
            let mut blocks = self.blocks.lock();
            let Some(block) = blocks.get_mut(&index) else {
                return ProcessedLine::passthrough(line);
            };
            block.stopped = true;

            match self.config.strategy {
                SignatureStrategy::AlwaysReplace | SignatureStrategy::FillMissing => {
                    !block.has_signature_delta
                }
                SignatureStrategy::Disabled => false,
            }
        };

        if !needs_injection {
            return ProcessedLine::passthrough(line);
        }

        match self.generate_signature_delta_line(index).await {
            Some(injected) => {
                debug!(
                    account_id = self.account_id,
                    index, "injecting signature delta before block stop"
                );
                ProcessedLine {
                    inject_before: vec![injected],
                    line: line.to_string(),
                }
            }
            None => {
                warn!(
                    account_id = self.account_id,
                    index, "no signature available to inject"
                );
                ProcessedLine::passthrough(line)
            }
        }
    }

    // ─── Rewriting ───────────────────────────────────────────────────────

    /// Replace `delta.signature` inside the payload, preserving every other
    /// field and the key order of the original event.
    async fn replace_signature_in_line(&self, line: &str, data: &str, index: i64) -> ProcessedLine {
        let signature = match self.pool.get_random_signature(self.config.pool_filter.as_ref()).await
        {
            Ok(signature) => signature,
            Err(e) => {
                warn!(
                    account_id = self.account_id,
                    index,
                    error = %e,
                    "failed to get signature from pool"
                );
                return ProcessedLine::passthrough(line);
            }
        };

        let mut payload: Value = match serde_json::from_str(data) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(account_id = self.account_id, index, error = %e, "payload reparse failed");
                return ProcessedLine::passthrough(line);
            }
        };

        let Some(Value::Object(delta)) = payload.get_mut("delta") else {
            return ProcessedLine::passthrough(line);
        };
        let _ = delta.insert("signature".to_string(), Value::String(signature));

        match serde_json::to_string(&payload) {
            Ok(encoded) => {
                debug!(account_id = self.account_id, index, "replaced signature");
                ProcessedLine::passthrough(&format!("data: {encoded}"))
            }
            Err(e) => {
                warn!(account_id = self.account_id, index, error = %e, "payload re-encode failed");
                ProcessedLine::passthrough(line)
            }
        }
    }

    /// Build a synthetic `signature_delta` line, or `None` on a pool miss.
    async fn generate_signature_delta_line(&self, index: i64) -> Option<String> {
        let signature = self
            .pool
            .get_random_signature(self.config.pool_filter.as_ref())
            .await
            .ok()?;

        let event = json!({
            "type": "content_block_delta",
            "index": index,
            "delta": {
                "type": "signature_delta",
                "signature": signature,
            },
        });

        Some(format!("data: {event}"))
    }
}

/// Extract the payload of a `data:` line, or `None` for any other line.
fn strip_data_prefix(line: &str) -> Option<&str> {
    line.strip_prefix("data:").map(str::trim_start)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{stub_signature, StubRepo};

    fn pool_with(values: &[(&str, Option<&str>)]) -> Arc<SignaturePool> {
        let signatures = values
            .iter()
            .enumerate()
            .map(|(i, (value, model))| stub_signature(i as i64 + 1, value, *model))
            .collect();
        Arc::new(SignaturePool::new(Arc::new(StubRepo::with_signatures(
            signatures,
        ))))
    }

    fn empty_pool() -> Arc<SignaturePool> {
        Arc::new(SignaturePool::new(Arc::new(StubRepo::default())))
    }

    fn config(strategy: SignatureStrategy) -> SignatureConfig {
        SignatureConfig {
            enabled: true,
            strategy,
            ..SignatureConfig::default()
        }
    }

    fn processor(strategy: SignatureStrategy, pool: Arc<SignaturePool>) -> SignatureStreamProcessor {
        SignatureStreamProcessor::new(config(strategy), pool, 1, None)
    }

    const START_LINE: &str = r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"thinking","thinking":"x","signature":""}}"#;
    const STOP_LINE: &str = r#"data: {"type":"content_block_stop","index":0}"#;

    fn delta_line(signature: &str) -> String {
        format!(
            r#"data: {{"type":"content_block_delta","index":0,"delta":{{"type":"signature_delta","signature":"{signature}"}}}}"#
        )
    }

    // ── pass-through basics ──────────────────────────────────────────────

    #[tokio::test]
    async fn non_data_lines_pass_through() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("S", None)]));
        for line in ["", "event: content_block_delta", ": keep-alive", "id: 7"] {
            let out = p.process_line(line).await;
            assert_eq!(out, ProcessedLine::passthrough(line));
        }
    }

    #[tokio::test]
    async fn done_marker_passes_through() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("S", None)]));
        let out = p.process_line("data: [DONE]").await;
        assert_eq!(out.line, "data: [DONE]");
        assert!(out.inject_before.is_empty());
    }

    #[tokio::test]
    async fn unparseable_payload_passes_through() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("S", None)]));
        let line = "data: {not json";
        let out = p.process_line(line).await;
        assert_eq!(out, ProcessedLine::passthrough(line));
    }

    #[tokio::test]
    async fn unrelated_event_types_pass_through() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("S", None)]));
        let line = r#"data: {"type":"message_start","message":{}}"#;
        let out = p.process_line(line).await;
        assert_eq!(out, ProcessedLine::passthrough(line));
    }

    // ── scenario: fill_missing injection ─────────────────────────────────

    #[tokio::test]
    async fn fill_missing_injects_before_stop() {
        let p = processor(SignatureStrategy::FillMissing, pool_with(&[("SIG-A", None)]));

        let start = p.process_line(START_LINE).await;
        assert_eq!(start, ProcessedLine::passthrough(START_LINE));

        let stop = p.process_line(STOP_LINE).await;
        assert_eq!(stop.line, STOP_LINE);
        assert_eq!(
            stop.inject_before,
            vec![
                r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"SIG-A"}}"#
                    .to_string()
            ]
        );
    }

    #[tokio::test]
    async fn fill_missing_keeps_upstream_signature() {
        let p = processor(SignatureStrategy::FillMissing, pool_with(&[("SIG-A", None)]));

        let _ = p.process_line(START_LINE).await;
        let delta = p.process_line(&delta_line("UPSTREAM")).await;
        assert_eq!(delta.line, delta_line("UPSTREAM"));

        // Already signed, nothing to inject.
        let stop = p.process_line(STOP_LINE).await;
        assert!(stop.inject_before.is_empty());
    }

    // ── scenario: always_replace rewrite ─────────────────────────────────

    #[tokio::test]
    async fn always_replace_rewrites_delta_in_place() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("SIG-B", None)]));

        let _ = p.process_line(START_LINE).await;
        let delta = p.process_line(&delta_line("UPSTREAM")).await;
        assert_eq!(delta.line, delta_line("SIG-B"));
        assert!(delta.inject_before.is_empty());

        // Saw a delta, so the stop is clean.
        let stop = p.process_line(STOP_LINE).await;
        assert_eq!(stop, ProcessedLine::passthrough(STOP_LINE));
    }

    #[tokio::test]
    async fn always_replace_injects_when_upstream_omits_delta() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("SIG-B", None)]));

        let _ = p.process_line(START_LINE).await;
        let stop = p.process_line(STOP_LINE).await;
        assert_eq!(stop.inject_before.len(), 1);
        assert!(stop.inject_before[0].contains("\"signature\":\"SIG-B\""));
    }

    #[tokio::test]
    async fn replace_preserves_sibling_fields_and_order() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("SIG-B", None)]));

        let _ = p.process_line(START_LINE).await;
        let line = r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"OLD","extra":7},"trailer":true}"#;
        let out = p.process_line(line).await;
        assert_eq!(
            out.line,
            r#"data: {"type":"content_block_delta","index":0,"delta":{"type":"signature_delta","signature":"SIG-B","extra":7},"trailer":true}"#
        );
    }

    // ── scenario: empty pool ─────────────────────────────────────────────

    #[tokio::test]
    async fn empty_pool_passes_everything_through() {
        let p = processor(SignatureStrategy::AlwaysReplace, empty_pool());

        let _ = p.process_line(START_LINE).await;
        let delta = p.process_line(&delta_line("UPSTREAM")).await;
        assert_eq!(delta.line, delta_line("UPSTREAM"));

        let stop = p.process_line(STOP_LINE).await;
        assert_eq!(stop, ProcessedLine::passthrough(STOP_LINE));
    }

    // ── scenario: disabled strategy is byte identity ─────────────────────

    #[tokio::test]
    async fn disabled_strategy_is_identity() {
        let p = processor(SignatureStrategy::Disabled, pool_with(&[("SIG-A", None)]));

        let lines = [
            START_LINE.to_string(),
            delta_line("UPSTREAM"),
            STOP_LINE.to_string(),
            "data: [DONE]".to_string(),
        ];
        for line in &lines {
            let out = p.process_line(line).await;
            assert_eq!(out, ProcessedLine::passthrough(line));
        }
    }

    // ── scenario: collection ─────────────────────────────────────────────

    #[tokio::test]
    async fn collector_receives_long_signatures_only() {
        let collector = Arc::new(SignatureCollector::new(1, None, 5));
        let p = SignatureStreamProcessor::new(
            config(SignatureStrategy::Disabled),
            pool_with(&[("SIG-A", None)]),
            1,
            Some(Arc::clone(&collector)),
        );

        let _ = p.process_line(START_LINE).await;
        let _ = p.process_line(&delta_line("abcdef")).await; // len 6
        let _ = p.process_line(&delta_line("abc")).await; // len 3
        let _ = p.process_line(STOP_LINE).await;

        assert_eq!(collector.get_collected(), vec!["abcdef".to_string()]);
    }

    #[tokio::test]
    async fn collector_ignores_untracked_blocks() {
        let collector = Arc::new(SignatureCollector::new(1, None, 1));
        let p = SignatureStreamProcessor::new(
            config(SignatureStrategy::Disabled),
            pool_with(&[("SIG-A", None)]),
            1,
            Some(Arc::clone(&collector)),
        );

        // Delta without a preceding thinking start: nothing is tracked.
        let _ = p.process_line(&delta_line("orphan-signature")).await;
        assert_eq!(collector.count(), 0);
    }

    // ── block tracking ───────────────────────────────────────────────────

    #[tokio::test]
    async fn non_thinking_blocks_are_not_tracked() {
        let p = processor(SignatureStrategy::AlwaysReplace, pool_with(&[("S", None)]));
        let line = r#"data: {"type":"content_block_start","index":0,"content_block":{"type":"text","text":""}}"#;
        let _ = p.process_line(line).await;
        assert_eq!(p.thinking_block_count(), 0);

        // A stop for an untracked block passes through untouched.
        let stop = p.process_line(STOP_LINE).await;
        assert_eq!(stop, ProcessedLine::passthrough(STOP_LINE));
    }

    #[tokio::test]
    async fn multiple_blocks_tracked_independently() {
        let p = processor(SignatureStrategy::FillMissing, pool_with(&[("SIG-A", None)]));

        let start1 = r#"data: {"type":"content_block_start","index":1,"content_block":{"type":"thinking","thinking":""}}"#;
        let stop1 = r#"data: {"type":"content_block_stop","index":1}"#;

        let _ = p.process_line(START_LINE).await; // index 0
        let _ = p.process_line(start1).await; // index 1

        // Block 0 gets an upstream signature; block 1 does not.
        let _ = p.process_line(&delta_line("UPSTREAM")).await;

        let stop0 = p.process_line(STOP_LINE).await;
        assert!(stop0.inject_before.is_empty());

        let out1 = p.process_line(stop1).await;
        assert_eq!(out1.inject_before.len(), 1);
        assert!(out1.inject_before[0].contains("\"index\":1"));

        assert_eq!(p.thinking_block_count(), 2);
        let stats = p.stats();
        assert_eq!(stats.thinking_blocks, 2);
        assert_eq!(stats.with_signature, 1);
        assert_eq!(stats.without_signature, 1);
    }

    // ── data prefix handling ─────────────────────────────────────────────

    #[tokio::test]
    async fn data_prefix_without_space_is_recognized() {
        let p = processor(SignatureStrategy::FillMissing, pool_with(&[("SIG-A", None)]));
        let start =
            r#"data:{"type":"content_block_start","index":0,"content_block":{"type":"thinking"}}"#;
        let _ = p.process_line(start).await;
        assert_eq!(p.thinking_block_count(), 1);
    }
}
