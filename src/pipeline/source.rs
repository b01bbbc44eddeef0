//! Input byte-chunk sources.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::types::ByteChunk;

/// Asynchronous sequence of container byte chunks.
///
/// Chunks must be contiguous and increasing in `range.start`; the driver
/// forwards them to the box engine in arrival order and treats `None` as
/// end of input.
#[async_trait]
pub trait ChunkSource: Send {
    /// The next chunk, or `None` once the source is exhausted.
    async fn next_chunk(&mut self) -> Option<ByteChunk>;
}

#[async_trait]
impl ChunkSource for mpsc::Receiver<ByteChunk> {
    async fn next_chunk(&mut self) -> Option<ByteChunk> {
        self.recv().await
    }
}
