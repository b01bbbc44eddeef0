//! External box-parsing engine interface.
//!
//! The pipeline does not parse ISOBMFF boxes itself. It drives an external
//! engine through [`BoxEngine`], feeding it contiguous byte ranges and
//! consuming the events it reports: track tables once they resolve, then
//! batches of demuxed samples in decode order.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::PipelineError;

/// One edit-list (`elst`) entry of a track, in the track's native timescale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditListEntry {
    pub segment_duration: u64,
    pub media_time: i64,
}

/// A child box of a sample-description entry, e.g. the `avcC` or `hvcC`
/// codec configuration record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigBox {
    pub fourcc: [u8; 4],
    pub data: Bytes,
}

impl ConfigBox {
    /// Serialize as a full box: 4-byte big-endian size, 4-byte type, payload.
    pub fn serialize(&self) -> Bytes {
        let size = 8 + self.data.len();
        let mut out = BytesMut::with_capacity(size);
        out.put_u32(size as u32);
        out.put_slice(&self.fourcc);
        out.put_slice(&self.data);
        out.freeze()
    }
}

/// One sample-description (`stsd`) entry of a track.
#[derive(Debug, Clone, Default)]
pub struct SampleEntry {
    /// Sample entry format FourCC, e.g. "avc1" or "hvc1".
    pub format: String,
    pub boxes: Vec<ConfigBox>,
}

/// Static description of one track as reported by the engine.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub id: u32,
    pub width: u32,
    pub height: u32,
    /// Native media timescale, in units per second.
    pub timescale: u32,
    /// Track duration in timescale units.
    pub duration: u64,
    pub sample_count: u64,
    /// RFC 6381 codec string, e.g. "avc1.42E01E".
    pub codec: String,
    pub sample_entries: Vec<SampleEntry>,
    pub edit_list: Vec<EditListEntry>,
}

/// Track tables reported once the container's movie metadata is parsed.
#[derive(Debug, Clone, Default)]
pub struct ContainerInfo {
    pub video_tracks: Vec<TrackInfo>,
    /// Alternate/secondary tracks, used as fallback when no primary video
    /// track exists.
    pub other_tracks: Vec<TrackInfo>,
}

/// One demuxed coded sample in decode order.
///
/// `data` is the raw coded payload with any container-level encoding already
/// resolved by the engine. Never mutated after the engine emits it.
#[derive(Debug, Clone)]
pub struct EngineSample {
    pub is_sync: bool,
    /// Composition time in the track's native timescale.
    pub cts: i64,
    /// Sample duration in the track's native timescale.
    pub duration: u32,
    pub timescale: u32,
    pub data: Bytes,
}

/// Events reported by the engine as data becomes parsable.
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// Track tables resolved. Reported exactly once per session.
    Ready(ContainerInfo),
    /// A batch of demuxed samples for one track, in strictly increasing
    /// decode order.
    Samples {
        track_id: u32,
        samples: Vec<EngineSample>,
    },
}

/// External ISOBMFF box-parsing engine.
///
/// The driver feeds contiguous byte ranges with explicit offsets; the engine
/// reports events as soon as enough data has arrived. The track-ready and
/// samples-ready callbacks of callback-style engines map to the returned
/// event batches.
pub trait BoxEngine: Send {
    /// Append the next contiguous byte range, starting at `offset`.
    fn append(&mut self, data: Bytes, offset: u64) -> Result<Vec<EngineEvent>, PipelineError>;

    /// Signal end of input; the engine reports whatever it can still parse.
    fn flush(&mut self) -> Result<Vec<EngineEvent>, PipelineError>;

    /// Look up a track reported in the [`EngineEvent::Ready`] event.
    fn track(&self, id: u32) -> Option<&TrackInfo>;
}
