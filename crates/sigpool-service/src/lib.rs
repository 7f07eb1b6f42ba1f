//! # sigpool-service
//!
//! Hot-path services over the signature catalogue:
//!
//! - **[`pool`]**: TTL-cached random selector over active signatures, with
//!   stale-on-failure reloads and detached usage accounting
//! - **[`collector`]**: per-response sink for signatures observed in
//!   passing streams
//! - **[`signatures`]**: hashing, deduplication, and import orchestration
//! - **[`processor`]**: per-response SSE state machine that rewrites and
//!   synthesises `signature_delta` events
//! - **[`sse`]**: byte-stream → line splitting and the processing pipeline

#![deny(unsafe_code)]

pub mod collector;
pub mod pool;
pub mod processor;
pub mod signatures;
pub mod sse;

#[cfg(test)]
pub(crate) mod test_support;

pub use collector::SignatureCollector;
pub use pool::SignaturePool;
pub use processor::{ProcessedLine, ProcessorStats, SignatureStreamProcessor};
pub use signatures::{compute_signature_hash, SignatureService};
pub use sse::{process_byte_stream, split_sse_lines};
