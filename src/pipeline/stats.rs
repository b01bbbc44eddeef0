//! Session counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for one decode session.
///
/// All fields are atomics so the ingest task, the decode output task and the
/// consumer can update them without coordination.
#[derive(Debug, Default)]
pub struct SessionStats {
    /// Bytes of container data fed to the box engine.
    pub bytes_ingested: AtomicU64,
    /// Coded samples handed to the decoder.
    pub samples_submitted: AtomicU64,
    /// Raw frames received from the decoder.
    pub frames_decoded: AtomicU64,
    /// Frames dropped by edit-list trimming.
    pub frames_trimmed: AtomicU64,
    /// Decode failures reported by the platform decoder.
    pub decode_failures: AtomicU64,
}

impl SessionStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_bytes(&self, n: usize) {
        self.bytes_ingested.fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_samples(&self, n: usize) {
        self.samples_submitted
            .fetch_add(n as u64, Ordering::Relaxed);
    }

    pub fn record_frame(&self) {
        self.frames_decoded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_trimmed(&self) {
        self.frames_trimmed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_decode_failure(&self) {
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// One-line summary for periodic logging.
    pub fn summary(&self) -> String {
        format!(
            "{} bytes in, {} samples, {} decoded, {} trimmed, {} failures",
            self.bytes_ingested.load(Ordering::Relaxed),
            self.samples_submitted.load(Ordering::Relaxed),
            self.frames_decoded.load(Ordering::Relaxed),
            self.frames_trimmed.load(Ordering::Relaxed),
            self.decode_failures.load(Ordering::Relaxed),
        )
    }
}
