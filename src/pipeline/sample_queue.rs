//! Append-only record of demuxed sample timing.
//!
//! The platform decoder does not return per-output metadata, so the decode
//! stage correlates each output to its source sample by position: output N
//! takes its timing from the N-th demuxed sample. This assumes one output
//! per submitted sample; if the decoder drops frames internally the indices
//! desynchronize. Known limitation of the positional design, not corrected
//! here.

use std::sync::Mutex;

use super::types::SampleTiming;

/// Shared append-only arena of sample timing, indexed by decode order.
#[derive(Debug, Default)]
pub struct SampleQueue {
    entries: Mutex<Vec<SampleTiming>>,
}

impl SampleQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the timing of the next sample in decode order.
    pub fn push(&self, timing: SampleTiming) {
        self.entries.lock().unwrap().push(timing);
    }

    /// Timing of the sample at decode-order position `index`.
    pub fn get(&self, index: usize) -> Option<SampleTiming> {
        self.entries.lock().unwrap().get(index).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
