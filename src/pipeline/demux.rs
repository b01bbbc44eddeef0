//! Box parser adapter: feeds ranged chunks to the external engine and
//! resolves the video-bearing track.

use crate::engine::{BoxEngine, ContainerInfo, EngineEvent, TrackInfo};
use crate::error::PipelineError;

use super::types::{ByteChunk, ContainerMetadata};

/// Thin adapter in front of the external box engine.
///
/// The engine only understands a single growing byte stream, so ranges must
/// arrive contiguous and increasing; a gap or overlap would silently corrupt
/// its internal offsets and is rejected outright.
pub(crate) struct DemuxAdapter {
    engine: Box<dyn BoxEngine>,
    next_offset: u64,
}

impl DemuxAdapter {
    pub fn new(engine: Box<dyn BoxEngine>) -> Self {
        Self {
            engine,
            next_offset: 0,
        }
    }

    /// Append the next chunk and collect whatever the engine can now parse.
    pub fn append(&mut self, chunk: &ByteChunk) -> Result<Vec<EngineEvent>, PipelineError> {
        if chunk.range.start != self.next_offset {
            return Err(PipelineError::Parse(format!(
                "non-contiguous chunk: expected offset {}, got {}",
                self.next_offset, chunk.range.start
            )));
        }
        self.next_offset = chunk.range.end;
        self.engine.append(chunk.data.clone(), chunk.range.start)
    }

    /// Signal end of input; the engine reports any remaining events.
    pub fn end_of_input(&mut self) -> Result<Vec<EngineEvent>, PipelineError> {
        self.engine.flush()
    }
}

/// Resolve the video-bearing track: the primary video track when present,
/// otherwise the first alternate track.
pub(crate) fn select_video_track(info: &ContainerInfo) -> Option<&TrackInfo> {
    info.video_tracks
        .first()
        .or_else(|| info.other_tracks.first())
}

/// Container metadata derived from the resolved track.
///
/// `frame_rate = total_frame_count / (duration / timescale)`.
pub(crate) fn container_metadata(track: &TrackInfo) -> ContainerMetadata {
    let duration_secs = if track.timescale > 0 {
        track.duration as f64 / track.timescale as f64
    } else {
        0.0
    };
    let frame_rate = if duration_secs > 0.0 {
        track.sample_count as f64 / duration_secs
    } else {
        0.0
    };
    ContainerMetadata {
        width: track.width,
        height: track.height,
        total_frame_count: track.sample_count,
        frame_rate,
    }
}
