//! Streaming decode pipeline.
//!
//! The pipeline is organized into cooperating stages wired by the driver:
//! - ingest: pulls ranged byte chunks from a [`ChunkSource`]
//! - demux: feeds the external box engine, resolves the video track
//! - decode: submits coded samples, re-times decoder output positionally
//! - trim: drops frames before the edit-list start
//! - deliver: hands frames to the consumer through a single-slot bridge
//!
//! Ingest and decode output run as their own async tasks; everything else
//! is inline. The shared bridge state is guarded by a plain mutex that is
//! never held across an await.

pub mod bridge;
pub mod driver;
pub mod source;
pub mod stats;
pub mod types;

mod decode_stage;
mod demux;
mod edit_list;
mod sample_queue;

pub use bridge::FrameStream;
pub use driver::{StreamDriver, VideoSession};
pub use source::ChunkSource;
pub use stats::SessionStats;
pub use types::{ByteChunk, ByteRange, ContainerMetadata, DecodedFrame, Progress, ProgressFn};
