//! Streaming MP4 demux/decode pipeline.
//!
//! `frameflow` turns a progressively-downloaded or fragmented MP4 byte
//! stream into a pull-based asynchronous sequence of decoded video frames.
//! The container is parsed incrementally by an external box engine, coded
//! samples are fed to an external platform decoder as they demux, and
//! decoded output is re-timed from the container's sample tables, trimmed
//! to the edit list, and delivered one frame at a time with backpressure.
//!
//! The entry point is [`StreamDriver::start`], which resolves with the
//! container metadata and the frame stream as soon as the video track is
//! known, while decoding continues in the background:
//!
//! ```ignore
//! let session = StreamDriver::new(engine, decoder).start(chunks).await?;
//! println!("{}x{} @ {:.2} fps", session.metadata.width,
//!     session.metadata.height, session.metadata.frame_rate);
//! let mut frames = session.frames;
//! while let Some(frame) = frames.next().await {
//!     render(frame);
//! }
//! ```

pub mod decoder;
pub mod engine;
pub mod error;
pub mod pipeline;

pub use error::PipelineError;
pub use pipeline::{
    ByteChunk, ByteRange, ChunkSource, ContainerMetadata, DecodedFrame, FrameStream, Progress,
    SessionStats, StreamDriver, VideoSession,
};
