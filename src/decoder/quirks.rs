//! Platform decoder quirks.
//!
//! Some OS/decoder combinations reuse the output frame buffer once the
//! output callback returns, so a frame that should outlive the callback has
//! to be deep-copied first. Quirks are selected once from an explicit
//! [`PlatformCaps`] value at decode-stage construction; the pipeline never
//! probes the platform itself.

use super::FrameImage;

/// Capabilities of the platform the decoder runs on.
///
/// Constructed by the embedder (which knows the OS/decoder combination) and
/// passed into the decode stage. The default assumes well-behaved decoder
/// output.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlatformCaps {
    /// Decoder output buffers are reused after the output callback; frames
    /// must be copied before they can be retained.
    pub frame_copy_required: bool,
}

/// Post-processing applied to every decoder output frame.
pub type FrameTransform = fn(FrameImage) -> FrameImage;

/// Select the output transform for the given capabilities.
///
/// Returns `None` when outputs can be forwarded as-is. New quirk transforms
/// compose here without touching the decode stage.
pub fn output_transform(caps: &PlatformCaps) -> Option<FrameTransform> {
    if caps.frame_copy_required {
        Some(copy_frame)
    } else {
        None
    }
}

/// Deep-copy the frame, releasing the original buffer.
fn copy_frame(image: FrameImage) -> FrameImage {
    image.deep_copy()
}
