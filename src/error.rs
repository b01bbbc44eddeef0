//! Typed pipeline errors.

use thiserror::Error;

/// Terminal errors for a decode session.
///
/// None of these are retried internally. Whichever stage detects one aborts
/// the session and fires the completion signal, so the frame sequence always
/// terminates — possibly before all expected frames were delivered. Retry
/// policy (e.g. re-fetching the input) belongs to the caller.
#[derive(Debug, Clone, Error)]
pub enum PipelineError {
    /// The container holds no primary video track and no alternate track.
    #[error("no usable video track in container")]
    NoVideoTrack,

    /// The derived decoder configuration failed the capability check.
    #[error("unsupported codec configuration: {codec} ({width}x{height})")]
    UnsupportedCodecConfig {
        codec: String,
        width: u32,
        height: u32,
    },

    /// The platform decoder reported an internal failure.
    #[error("decode failed: {0}")]
    Decode(String),

    /// The box-parsing engine rejected the container data.
    #[error("malformed container: {0}")]
    Parse(String),
}
