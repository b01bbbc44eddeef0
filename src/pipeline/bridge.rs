//! Push-to-pull bridge between decoder output and the consumer.
//!
//! The decode stage pushes frames as the platform decoder completes them;
//! the consumer pulls them one at a time. The bridge is a single-slot
//! rendezvous: at most one pull is ever pending, and a pushed frame resolves
//! a pending pull directly instead of going through the buffer. Frames only
//! accumulate in the buffer while production outpaces consumption.
//!
//! State is guarded by a plain (non-async) mutex; no critical section
//! contains an await, so push and pull can never interleave inside a
//! check-then-update.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use futures_util::Stream;
use log::debug;
use tokio::sync::oneshot;

use super::types::{ContainerMetadata, DecodedFrame, Progress, ProgressFn};
use crate::error::PipelineError;

#[derive(Default)]
struct BridgeState {
    /// Frames produced but not yet pulled, oldest first.
    buffered: VecDeque<DecodedFrame>,
    /// The one pending pull, if the consumer is currently waiting.
    /// Never `Some` while `buffered` is non-empty.
    pending: Option<oneshot::Sender<Option<DecodedFrame>>>,
    done: bool,
    error: Option<PipelineError>,
}

/// Create a connected producer/consumer pair.
pub(crate) fn bridge() -> (FrameBridge, FrameStream) {
    let state = Arc::new(Mutex::new(BridgeState::default()));
    (
        FrameBridge {
            state: state.clone(),
        },
        FrameStream {
            state,
            frames_delivered: 0,
            metadata: None,
            progress: None,
        },
    )
}

/// Producer half, owned by the decode output task.
#[derive(Clone)]
pub(crate) struct FrameBridge {
    state: Arc<Mutex<BridgeState>>,
}

impl FrameBridge {
    /// Hand one decoded frame to the consumer side.
    ///
    /// Resolves a pending pull immediately when one is waiting; buffers the
    /// frame otherwise. Frames pushed after `finish`/`fail` are released.
    pub fn push(&self, frame: DecodedFrame) {
        let mut state = self.state.lock().unwrap();
        if state.done {
            debug!("FrameBridge: frame pushed after completion, releasing");
            return;
        }
        if let Some(tx) = state.pending.take() {
            if let Err(unclaimed) = tx.send(Some(frame)) {
                // The puller went away before the frame arrived; keep the
                // frame for the next pull instead of losing it.
                if let Some(frame) = unclaimed {
                    state.buffered.push_back(frame);
                }
            }
        } else {
            state.buffered.push_back(frame);
        }
    }

    /// Mark the sequence complete. A pending pull resolves with the end
    /// marker; buffered frames are still drained by later pulls. Idempotent.
    pub fn finish(&self) {
        let mut state = self.state.lock().unwrap();
        state.done = true;
        if let Some(tx) = state.pending.take() {
            let _ = tx.send(None);
        }
    }

    /// Record a terminal error and complete the sequence. The first error
    /// wins; later calls only complete.
    pub fn fail(&self, err: PipelineError) {
        let mut state = self.state.lock().unwrap();
        if state.error.is_none() {
            state.error = Some(err);
        }
        state.done = true;
        if let Some(tx) = state.pending.take() {
            let _ = tx.send(None);
        }
    }

    #[cfg(test)]
    fn buffered_len(&self) -> usize {
        self.state.lock().unwrap().buffered.len()
    }

    #[cfg(test)]
    fn has_pending(&self) -> bool {
        self.state.lock().unwrap().pending.is_some()
    }
}

/// Lazy, single-pass, forward-only sequence of decoded frames.
///
/// Pulls are serialized by construction: [`next`](Self::next) takes
/// `&mut self`, so a second pull cannot start before the first resolves.
/// Once the end marker has been returned it is returned again on every
/// subsequent pull.
pub struct FrameStream {
    state: Arc<Mutex<BridgeState>>,
    frames_delivered: u64,
    metadata: Option<ContainerMetadata>,
    progress: Option<ProgressFn>,
}

impl FrameStream {
    pub(crate) fn set_metadata(&mut self, metadata: ContainerMetadata) {
        self.metadata = Some(metadata);
    }

    pub(crate) fn set_progress(&mut self, progress: ProgressFn) {
        self.progress = Some(progress);
    }

    /// Pull the next frame, suspending until one is produced or the
    /// sequence completes. Returns `None` at end of sequence, forever.
    pub async fn next(&mut self) -> Option<DecodedFrame> {
        let rx = {
            let mut state = self.state.lock().unwrap();
            if let Some(frame) = state.buffered.pop_front() {
                drop(state);
                return Some(self.deliver(frame));
            }
            if state.done {
                return None;
            }
            let (tx, rx) = oneshot::channel();
            // A stale sender can be left behind if a previous pull future
            // was dropped mid-wait; replacing it keeps the single-slot
            // invariant (the stale receiver is gone anyway).
            state.pending = Some(tx);
            rx
        };

        match rx.await {
            Ok(Some(frame)) => Some(self.deliver(frame)),
            Ok(None) => None,
            // Producer dropped without finishing; treat as end of sequence.
            Err(_) => None,
        }
    }

    /// Number of frames delivered so far.
    pub fn frames_delivered(&self) -> u64 {
        self.frames_delivered
    }

    /// Terminal session error, if the sequence was aborted rather than
    /// completed cleanly.
    pub fn error(&self) -> Option<PipelineError> {
        self.state.lock().unwrap().error.clone()
    }

    /// Adapt to a [`Stream`] for combinator-style consumption.
    pub fn into_stream(self) -> impl Stream<Item = DecodedFrame> {
        futures_util::stream::unfold(self, |mut frames| async move {
            frames.next().await.map(|frame| (frame, frames))
        })
    }

    fn deliver(&mut self, frame: DecodedFrame) -> DecodedFrame {
        self.frames_delivered += 1;
        if let Some(progress) = &self.progress
            && let Some(metadata) = self.metadata
        {
            progress(Progress {
                metadata,
                frames_decoded: self.frames_delivered,
            });
        }
        frame
    }
}
