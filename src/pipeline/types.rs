//! Core data types flowing through the pipeline.

use bytes::Bytes;

use crate::decoder::FrameImage;

/// Half-open byte range `[start, end)` of a chunk within the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    pub start: u64,
    pub end: u64,
}

/// One chunk of container bytes from the external source.
///
/// Ownership transfers to the driver when the source yields it; the chunk is
/// immutable once issued.
#[derive(Debug, Clone)]
pub struct ByteChunk {
    pub data: Bytes,
    pub range: ByteRange,
    /// Total expected length of the whole source, in bytes.
    pub total_length: u64,
}

impl ByteChunk {
    /// Build a chunk from data and its starting offset.
    pub fn new(data: Bytes, start: u64, total_length: u64) -> Self {
        let end = start + data.len() as u64;
        Self {
            data,
            range: ByteRange { start, end },
            total_length,
        }
    }
}

/// Container-level metadata, computed once when the video track resolves.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ContainerMetadata {
    pub width: u32,
    pub height: u32,
    pub total_frame_count: u64,
    /// Frames per second: `total_frame_count / (duration / timescale)`.
    pub frame_rate: f64,
}

/// Timing of one coded sample, recorded for decode-order correlation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleTiming {
    /// Composition time in native timescale units.
    pub cts: i64,
    /// Duration in native timescale units.
    pub duration: u32,
    pub timescale: u32,
}

impl SampleTiming {
    /// Sample duration converted to microseconds.
    pub fn duration_micros(&self) -> i64 {
        if self.timescale == 0 {
            return 0;
        }
        self.duration as i64 * 1_000_000 / self.timescale as i64
    }
}

/// One decoded frame delivered to the consumer.
///
/// Exclusively owned by whichever stage currently holds it; dropping it
/// releases the underlying image buffer.
#[derive(Debug)]
pub struct DecodedFrame {
    pub image: FrameImage,
    pub timestamp_micros: i64,
    /// Recovered from the coded sample at the matching decode-order index,
    /// not from the decoder's own output.
    pub duration_micros: i64,
}

/// Progress snapshot passed to the progress callback after each delivered
/// frame.
#[derive(Debug, Clone, Copy)]
pub struct Progress {
    pub metadata: ContainerMetadata,
    pub frames_decoded: u64,
}

/// Callback invoked after every delivered frame.
pub type ProgressFn = Box<dyn Fn(Progress) + Send + Sync>;
