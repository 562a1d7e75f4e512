//! Multiplexed log-stream draining.

use std::sync::{Arc, Mutex, MutexGuard};

use futures_util::stream::BoxStream;
use futures_util::StreamExt;

use crate::engine::LogChunk;
use crate::errors::ExecutorError;

/// Shared transcript accumulator.
///
/// Cloned handles all append to the same buffer, which lets the orchestrator
/// snapshot partial output from a timeout or cancellation arm while the drain
/// loop still owns the stream.
#[derive(Clone, Default)]
pub struct Transcript {
    buf: Arc<Mutex<String>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current accumulated text.
    pub fn snapshot(&self) -> String {
        self.lock().clone()
    }

    fn append_line(&self, line: &str) {
        let mut buf = self.lock();
        buf.push_str(line);
        buf.push('\n');
    }

    fn lock(&self) -> MutexGuard<'_, String> {
        // A panicked appender only leaves text behind; recover the buffer
        // instead of propagating the poison.
        self.buf.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Drain `stream` to its end, appending each frame to `transcript` as one
/// trimmed line.
///
/// Frames are decoded lossily so undecodable bytes cannot abort the drain,
/// and a zero-length frame is treated the same as end-of-stream. Text that
/// accumulated before a mid-stream error stays in the transcript and is also
/// attached to the returned error.
pub async fn drain_into(
    mut stream: BoxStream<'_, Result<LogChunk, ExecutorError>>,
    transcript: &Transcript,
) -> Result<(), ExecutorError> {
    let mut scratch = String::new();
    while let Some(item) = stream.next().await {
        let chunk = match item {
            Ok(chunk) => chunk,
            Err(e) => return Err(e.with_partial_output(transcript.snapshot())),
        };
        if chunk.bytes.is_empty() {
            break;
        }
        scratch.clear();
        scratch.push_str(&String::from_utf8_lossy(&chunk.bytes));
        transcript.append_line(scratch.trim_end());
    }
    Ok(())
}
