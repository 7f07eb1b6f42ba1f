//! SSE byte-stream plumbing.
//!
//! Upstream bodies arrive as arbitrary byte chunks; the processor works on
//! whole lines. [`split_sse_lines`] buffers chunks and yields every line —
//! unlike a data-extracting parser, nothing is filtered here, because the
//! proxy must forward comments, event names, and blank separators untouched.
//! [`process_byte_stream`] drives a processor over the split lines,
//! emitting injected lines immediately before their trigger line.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::Stream;
use tokio_stream::StreamExt;
use tracing::warn;

use crate::processor::SignatureStreamProcessor;

/// Split a chunked byte stream into lines.
///
/// Lines are yielded without their trailing `\n` (and `\r`, if present).
/// Invalid UTF-8 lines are skipped with a warning. A non-empty trailing
/// buffer is flushed as a final line when the stream ends.
pub fn split_sse_lines<S, E>(byte_stream: S) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
{
    futures::stream::unfold(
        (byte_stream, BytesMut::with_capacity(8192), false),
        move |(mut stream, mut buffer, done)| async move {
            if done {
                return None;
            }

            loop {
                // Check buffer for a complete line (\n)
                if let Some(newline_pos) = buffer.iter().position(|&b| b == b'\n') {
                    let mut line_bytes = buffer.split_to(newline_pos + 1);
                    // Remove trailing \n
                    line_bytes.truncate(line_bytes.len() - 1);
                    // Remove trailing \r if present
                    if line_bytes.last() == Some(&b'\r') {
                        line_bytes.truncate(line_bytes.len() - 1);
                    }

                    match std::str::from_utf8(&line_bytes) {
                        Ok(line) => return Some((line.to_string(), (stream, buffer, false))),
                        Err(_) => {
                            warn!("skipping invalid UTF-8 line in SSE stream");
                            continue;
                        }
                    }
                }

                // Read next chunk — append raw bytes, no conversion
                match stream.next().await {
                    Some(Ok(chunk)) => {
                        buffer.extend_from_slice(&chunk);
                    }
                    Some(Err(e)) => {
                        warn!("SSE stream read error: {e}");
                        return None;
                    }
                    None => {
                        // Stream ended — flush any trailing partial line
                        if !buffer.is_empty() {
                            if let Ok(line) = std::str::from_utf8(&buffer) {
                                let line = line.to_string();
                                buffer.clear();
                                return Some((line, (stream, buffer, true)));
                            }
                        }
                        return None;
                    }
                }
            }
        },
    )
}

/// Drive a processor over an upstream byte stream, yielding output lines.
///
/// Output preserves input order; synthetic lines appear immediately before
/// the line that triggered them. Callers re-append line terminators when
/// forwarding downstream.
pub fn process_byte_stream<S, E>(
    byte_stream: S,
    processor: Arc<SignatureStreamProcessor>,
) -> impl Stream<Item = String> + Send
where
    S: Stream<Item = Result<Bytes, E>> + Send + Unpin + 'static,
    E: std::fmt::Display,
{
    let lines = Box::pin(split_sse_lines(byte_stream));

    futures::stream::unfold(
        (lines, processor, VecDeque::<String>::new()),
        move |(mut lines, processor, mut pending)| async move {
            if let Some(line) = pending.pop_front() {
                return Some((line, (lines, processor, pending)));
            }

            let line = lines.next().await?;
            let processed = processor.process_line(&line).await;
            for injected in processed.inject_before {
                pending.push_back(injected);
            }
            pending.push_back(processed.line);

            let next = pending.pop_front()?;
            Some((next, (lines, processor, pending)))
        },
    )
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
