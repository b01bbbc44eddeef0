//! Edit-list trimming.
//!
//! A non-zero start time is expressed in the container as an edit list whose
//! first entry points into the media timeline. Decoded frames whose
//! composition time precedes that point are not part of the presentation
//! and are dropped here.

use crate::engine::TrackInfo;

/// Drops frames whose composition time precedes the first edit entry's
/// media time. Tracks without an edit list pass everything through.
#[derive(Debug, Clone, Copy)]
pub struct EditListFilter {
    /// First edit's media time in native timescale units, if any.
    start_media_time: Option<i64>,
    timescale: u32,
}

impl EditListFilter {
    pub fn from_track(track: &TrackInfo) -> Self {
        Self {
            start_media_time: track.edit_list.first().map(|e| e.media_time),
            timescale: track.timescale,
        }
    }

    /// Whether a frame with this presentation timestamp survives trimming.
    pub fn accept(&self, timestamp_micros: i64) -> bool {
        match self.start_media_time {
            Some(start) => native_units(timestamp_micros, self.timescale) >= start,
            None => true,
        }
    }
}

/// Convert a microsecond timestamp back to native timescale units, rounding
/// to nearest: `round(ts * timescale / 1_000_000)`.
fn native_units(timestamp_micros: i64, timescale: u32) -> i64 {
    let scaled = timestamp_micros as i128 * timescale as i128;
    ((scaled + 500_000) / 1_000_000) as i64
}
