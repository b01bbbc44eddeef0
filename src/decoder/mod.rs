//! Platform video decoder interface.
//!
//! The actual decoder (hardware or software) lives outside this crate,
//! behind [`PlatformDecoder`]. Coded samples go in through `decode`; raw
//! frames come back asynchronously on the output channel handed over at
//! `configure` time, in the order the samples were submitted.

pub mod quirks;

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::PipelineError;

/// Raw pixel data of one decoded frame.
///
/// Owns its buffer; the underlying resource is released when the image is
/// dropped. Stages that discard a frame without forwarding it release it by
/// dropping.
#[derive(Debug, Clone)]
pub struct FrameImage {
    pub data: Bytes,
    pub width: u32,
    pub height: u32,
}

impl FrameImage {
    /// Copy the pixel data into a freshly allocated buffer.
    ///
    /// Needed on platforms whose decoder reuses the output buffer after the
    /// output callback returns; see [`quirks`].
    pub fn deep_copy(&self) -> FrameImage {
        FrameImage {
            data: Bytes::copy_from_slice(&self.data),
            width: self.width,
            height: self.height,
        }
    }
}

/// Decoder configuration derived from the container's track data.
#[derive(Debug, Clone)]
pub struct DecoderConfig {
    /// RFC 6381 codec string, e.g. "avc1.42E01E".
    pub codec: String,
    pub coded_width: u32,
    pub coded_height: u32,
    /// Codec-specific configuration record (avcC/hvcC payload), if the
    /// sample description carries one.
    pub description: Option<Bytes>,
}

/// A decoded frame as emitted by the platform decoder.
///
/// Carries only the presentation timestamp. The decoder does not return
/// per-output durations; the pipeline recovers them positionally from the
/// submitted sample timing.
#[derive(Debug)]
pub struct RawFrame {
    pub image: FrameImage,
    pub timestamp_micros: i64,
}

/// Output events pushed by the decoder as it makes progress.
#[derive(Debug)]
pub enum DecoderEvent {
    /// One decoded frame, in submission order.
    Frame(RawFrame),
    /// Internal decoder failure. Terminal: no further output follows.
    Error(String),
}

/// External platform video decoder.
///
/// Treated as an opaque asynchronous black box: submissions are synchronous,
/// outputs arrive on the channel whenever the platform completes them.
pub trait PlatformDecoder: Send {
    /// Capability check for a configuration, without committing to it.
    fn is_config_supported(&self, config: &DecoderConfig) -> bool;

    /// Commit a configuration. Decoded output is pushed on `output` from
    /// here on.
    fn configure(
        &mut self,
        config: &DecoderConfig,
        output: mpsc::UnboundedSender<DecoderEvent>,
    ) -> Result<(), PipelineError>;

    /// Submit one coded sample for decode.
    fn decode(
        &mut self,
        data: &[u8],
        timestamp_micros: i64,
        is_sync: bool,
    ) -> Result<(), PipelineError>;

    /// Drain internally buffered frames; they keep arriving on the output
    /// channel.
    fn flush(&mut self) -> Result<(), PipelineError>;

    /// Release decoder resources and close the output channel.
    fn close(&mut self);
}
