//! Decode stage: submits coded samples to the platform decoder and turns
//! its raw output into timed, trimmed frames for the bridge.
//!
//! The submission side runs inline in the driver's ingest loop; the output
//! side is a spawned task draining the decoder's output channel. Output N is
//! correlated with the N-th submitted sample to recover its duration, which
//! the decoder itself does not report.

use std::sync::Arc;

use anyhow::bail;
use bytes::Bytes;
use log::{debug, error, info, warn};
use tokio::sync::mpsc;

use super::bridge::FrameBridge;
use super::edit_list::EditListFilter;
use super::sample_queue::SampleQueue;
use super::stats::SessionStats;
use super::types::{DecodedFrame, SampleTiming};
use crate::decoder::quirks::{self, FrameTransform, PlatformCaps};
use crate::decoder::{DecoderConfig, DecoderEvent, PlatformDecoder};
use crate::engine::{EngineSample, TrackInfo};
use crate::error::PipelineError;

/// Submission half of the decode stage.
pub(crate) struct DecodeStage {
    decoder: Box<dyn PlatformDecoder>,
    track_id: u32,
    samples: Arc<SampleQueue>,
}

impl DecodeStage {
    /// Derive and validate the decoder configuration for `track`, commit
    /// it, and spawn the output task feeding `bridge`.
    ///
    /// Fails with [`PipelineError::UnsupportedCodecConfig`] before any
    /// sample is submitted when the capability check rejects the
    /// configuration.
    pub fn configure(
        mut decoder: Box<dyn PlatformDecoder>,
        track: &TrackInfo,
        caps: PlatformCaps,
        bridge: FrameBridge,
        stats: Arc<SessionStats>,
    ) -> Result<Self, PipelineError> {
        let config = decoder_config(track);
        if !decoder.is_config_supported(&config) {
            return Err(PipelineError::UnsupportedCodecConfig {
                codec: config.codec,
                width: config.coded_width,
                height: config.coded_height,
            });
        }

        let (output_tx, output_rx) = mpsc::unbounded_channel();
        decoder.configure(&config, output_tx)?;
        info!(
            "DecodeStage: configured {} {}x{} ({} samples expected)",
            track.codec, track.width, track.height, track.sample_count
        );

        let samples = Arc::new(SampleQueue::new());
        let output = OutputStage {
            rx: output_rx,
            samples: samples.clone(),
            filter: EditListFilter::from_track(track),
            transform: quirks::output_transform(&caps),
            bridge,
            stats,
            expected: track.sample_count,
        };
        tokio::spawn(async move {
            if let Err(e) = output.run().await {
                error!("DecodeOutput error: {e}");
            }
        });

        Ok(Self {
            decoder,
            track_id: track.id,
            samples,
        })
    }

    pub fn track_id(&self) -> u32 {
        self.track_id
    }

    /// Submit one demuxed sample: record its timing at the next decode-order
    /// index, then hand the payload to the decoder.
    pub fn submit(&mut self, sample: &EngineSample) -> Result<(), PipelineError> {
        self.samples.push(SampleTiming {
            cts: sample.cts,
            duration: sample.duration,
            timescale: sample.timescale,
        });
        self.decoder
            .decode(&sample.data, timestamp_micros(sample), sample.is_sync)
    }

    /// Drain decoder-internal buffers at end of input.
    pub fn flush(&mut self) -> Result<(), PipelineError> {
        self.decoder.flush()
    }

    /// Release the decoder; its output channel closes once drained.
    pub fn close(&mut self) {
        self.decoder.close();
    }
}

/// Output half: drains the decoder's channel into the bridge.
struct OutputStage {
    rx: mpsc::UnboundedReceiver<DecoderEvent>,
    samples: Arc<SampleQueue>,
    filter: EditListFilter,
    transform: Option<FrameTransform>,
    bridge: FrameBridge,
    stats: Arc<SessionStats>,
    /// Total sample count of the track; reaching it signals completion.
    expected: u64,
}

impl OutputStage {
    async fn run(mut self) -> anyhow::Result<()> {
        info!("DecodeOutput: started");
        let mut output_index: usize = 0;

        while let Some(event) = self.rx.recv().await {
            match event {
                DecoderEvent::Frame(raw) => {
                    let image = match self.transform {
                        Some(transform) => transform(raw.image),
                        None => raw.image,
                    };

                    let timing = self.samples.get(output_index);
                    if timing.is_none() {
                        // Output count diverged from submissions; positional
                        // correlation is broken from here on.
                        warn!(
                            "DecodeOutput: no sample at index {output_index}, durations may be misattributed"
                        );
                    }
                    let duration_micros = timing.map(|t| t.duration_micros()).unwrap_or(0);
                    output_index += 1;
                    self.stats.record_frame();

                    let frame = DecodedFrame {
                        image,
                        timestamp_micros: raw.timestamp_micros,
                        duration_micros,
                    };
                    if self.filter.accept(frame.timestamp_micros) {
                        self.bridge.push(frame);
                    } else {
                        // Trimmed by the edit list; dropping the frame
                        // releases its image buffer.
                        self.stats.record_trimmed();
                    }

                    if output_index as u64 == self.expected {
                        debug!("DecodeOutput: all {} expected outputs emitted", self.expected);
                        break;
                    }
                }
                DecoderEvent::Error(message) => {
                    self.stats.record_decode_failure();
                    self.bridge.fail(PipelineError::Decode(message.clone()));
                    bail!("decoder reported: {message}");
                }
            }
        }

        self.bridge.finish();
        info!("DecodeOutput: finished ({output_index} outputs)");
        Ok(())
    }
}

/// Presentation timestamp of a sample in microseconds.
fn timestamp_micros(sample: &EngineSample) -> i64 {
    if sample.timescale == 0 {
        return 0;
    }
    sample.cts * 1_000_000 / sample.timescale as i64
}

/// Derive the decoder configuration from the resolved track.
fn decoder_config(track: &TrackInfo) -> DecoderConfig {
    DecoderConfig {
        codec: track.codec.clone(),
        coded_width: track.width,
        coded_height: track.height,
        description: codec_description(track),
    }
}

/// Search the track's sample-description entries for an AVC or HEVC
/// configuration box. The decoder wants the bare configuration record, i.e.
/// the serialized box minus its 8-byte header.
fn codec_description(track: &TrackInfo) -> Option<Bytes> {
    for entry in &track.sample_entries {
        for config in &entry.boxes {
            if matches!(&config.fourcc, b"avcC" | b"hvcC") {
                return Some(config.serialize().slice(8..));
            }
        }
    }
    None
}
