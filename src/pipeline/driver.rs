//! Stream driver: owns the end-to-end decode session.
//!
//! The driver pulls chunks from the source, feeds them through the demux
//! adapter, and submits demuxed samples to the decode stage. The session
//! resolves as soon as the video track is known; frames keep arriving on
//! the stream afterwards. Termination is either clean (source end, all
//! expected outputs emitted) or abrupt (a stage reports a terminal error),
//! and in both cases the frame sequence terminates.

use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::oneshot;

use super::bridge::{self, FrameBridge, FrameStream};
use super::decode_stage::DecodeStage;
use super::demux::{self, DemuxAdapter};
use super::source::ChunkSource;
use super::stats::SessionStats;
use super::types::{ContainerMetadata, Progress, ProgressFn};
use crate::decoder::PlatformDecoder;
use crate::decoder::quirks::PlatformCaps;
use crate::engine::{BoxEngine, ContainerInfo, EngineEvent, EngineSample};
use crate::error::PipelineError;

/// A resolved decode session: container metadata plus the frame sequence.
pub struct VideoSession {
    pub metadata: ContainerMetadata,
    /// Lazy, single-pass, forward-only frame sequence.
    pub frames: FrameStream,
    pub stats: Arc<SessionStats>,
}

/// Drives one decode session over an external engine and decoder.
pub struct StreamDriver {
    engine: Box<dyn BoxEngine>,
    decoder: Box<dyn PlatformDecoder>,
    caps: PlatformCaps,
    progress: Option<ProgressFn>,
}

impl StreamDriver {
    pub fn new(engine: Box<dyn BoxEngine>, decoder: Box<dyn PlatformDecoder>) -> Self {
        Self {
            engine,
            decoder,
            caps: PlatformCaps::default(),
            progress: None,
        }
    }

    /// Platform capabilities used to select decoder output quirks.
    pub fn with_caps(mut self, caps: PlatformCaps) -> Self {
        self.caps = caps;
        self
    }

    /// Callback invoked after every delivered frame.
    pub fn on_progress(mut self, progress: impl Fn(Progress) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// Start the decode session.
    ///
    /// The returned future resolves as soon as the video track is known,
    /// while decoding continues in the background. If the source ends
    /// without a resolvable track this fails with
    /// [`PipelineError::NoVideoTrack`]; with an endless source that never
    /// yields one it never resolves — callers own any timeout.
    pub async fn start<S>(self, mut source: S) -> Result<VideoSession, PipelineError>
    where
        S: ChunkSource + 'static,
    {
        let StreamDriver {
            engine,
            decoder,
            caps,
            progress,
        } = self;

        let (producer, mut frames) = bridge::bridge();
        let (meta_tx, meta_rx) = oneshot::channel();
        let stats = Arc::new(SessionStats::new());

        let mut session = Session {
            demux: DemuxAdapter::new(engine),
            decoder: Some(decoder),
            caps,
            stage: None,
            bridge: producer,
            meta_tx: Some(meta_tx),
            stats: stats.clone(),
        };
        tokio::spawn(async move {
            info!("StreamDriver: session started");
            match session.run(&mut source).await {
                Ok(()) => info!(
                    "StreamDriver: session finished ({})",
                    session.stats.summary()
                ),
                Err(e) => {
                    error!("StreamDriver: session failed: {e}");
                    session.abort(e);
                }
            }
        });

        let metadata = match meta_rx.await {
            Ok(Ok(metadata)) => metadata,
            Ok(Err(e)) => return Err(e),
            Err(_) => {
                return Err(PipelineError::Parse(
                    "session ended before track resolution".into(),
                ));
            }
        };

        frames.set_metadata(metadata);
        if let Some(progress) = progress {
            frames.set_progress(progress);
        }
        Ok(VideoSession {
            metadata,
            frames,
            stats,
        })
    }
}

/// Mutable session state owned by the spawned ingest task.
struct Session {
    demux: DemuxAdapter,
    /// Taken when the track resolves and the decode stage is configured.
    decoder: Option<Box<dyn PlatformDecoder>>,
    caps: PlatformCaps,
    stage: Option<DecodeStage>,
    bridge: FrameBridge,
    meta_tx: Option<oneshot::Sender<Result<ContainerMetadata, PipelineError>>>,
    stats: Arc<SessionStats>,
}

impl Session {
    async fn run(&mut self, source: &mut dyn ChunkSource) -> Result<(), PipelineError> {
        while let Some(chunk) = source.next_chunk().await {
            self.stats.record_bytes(chunk.data.len());
            let events = self.demux.append(&chunk)?;
            self.dispatch(events)?;
        }

        let events = self.demux.end_of_input()?;
        self.dispatch(events)?;

        if self.meta_tx.is_some() {
            // Source exhausted without a resolvable track.
            return Err(PipelineError::NoVideoTrack);
        }

        if let Some(stage) = &mut self.stage {
            stage.flush()?;
            stage.close();
        }
        // Dropping the stage drops the decoder; the output task finishes
        // once the channel drains, or earlier at the expected output count.
        self.stage = None;
        Ok(())
    }

    fn dispatch(&mut self, events: Vec<EngineEvent>) -> Result<(), PipelineError> {
        for event in events {
            match event {
                EngineEvent::Ready(info) => self.on_ready(info)?,
                EngineEvent::Samples { track_id, samples } => {
                    self.on_samples(track_id, &samples)?
                }
            }
        }
        Ok(())
    }

    fn on_ready(&mut self, info: ContainerInfo) -> Result<(), PipelineError> {
        let Some(decoder) = self.decoder.take() else {
            warn!("StreamDriver: duplicate track tables ignored");
            return Ok(());
        };

        let track = demux::select_video_track(&info)
            .ok_or(PipelineError::NoVideoTrack)?
            .clone();
        let metadata = demux::container_metadata(&track);
        info!(
            "StreamDriver: resolved track {} ({}x{}, {} samples, {:.2} fps)",
            track.id, metadata.width, metadata.height, metadata.total_frame_count, metadata.frame_rate
        );
        let stage = DecodeStage::configure(
            decoder,
            &track,
            self.caps,
            self.bridge.clone(),
            self.stats.clone(),
        )?;
        self.stage = Some(stage);

        if let Some(tx) = self.meta_tx.take() {
            let _ = tx.send(Ok(metadata));
        }
        Ok(())
    }

    fn on_samples(
        &mut self,
        track_id: u32,
        samples: &[EngineSample],
    ) -> Result<(), PipelineError> {
        let Some(stage) = &mut self.stage else {
            warn!("StreamDriver: samples before track resolution ignored");
            return Ok(());
        };
        if track_id != stage.track_id() {
            return Ok(());
        }

        for sample in samples {
            stage.submit(sample)?;
        }
        self.stats.record_samples(samples.len());
        Ok(())
    }

    /// Route a terminal error to both waiting sides: the metadata waiter
    /// (if the track never resolved) and the frame sequence.
    fn abort(&mut self, err: PipelineError) {
        if let Some(tx) = self.meta_tx.take() {
            let _ = tx.send(Err(err.clone()));
        }
        self.bridge.fail(err);
        if let Some(stage) = &mut self.stage {
            stage.close();
        }
        self.stage = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::{DecoderConfig, DecoderEvent, FrameImage, RawFrame};
    use crate::engine::{ConfigBox, EditListEntry, SampleEntry, TrackInfo};
    use crate::pipeline::types::ByteChunk;
    use bytes::Bytes;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tokio::sync::mpsc;

    const TIMESCALE: u32 = 30_000;
    /// One sample lasts 1000 native units: 33_333 us at 30_000 Hz.
    const SAMPLE_DURATION: u32 = 1000;

    fn video_track(sample_count: u64, edit_list: Vec<EditListEntry>) -> TrackInfo {
        TrackInfo {
            id: 1,
            width: 320,
            height: 240,
            timescale: TIMESCALE,
            duration: sample_count * SAMPLE_DURATION as u64,
            sample_count,
            codec: "avc1.42E01E".into(),
            sample_entries: vec![SampleEntry {
                format: "avc1".into(),
                boxes: vec![ConfigBox {
                    fourcc: *b"avcC",
                    data: Bytes::from_static(&[1, 0x42, 0xE0, 0x1E]),
                }],
            }],
            edit_list,
        }
    }

    fn coded_samples(range: std::ops::Range<u64>) -> Vec<EngineSample> {
        range
            .map(|i| EngineSample {
                is_sync: i == 0,
                cts: i as i64 * SAMPLE_DURATION as i64,
                duration: SAMPLE_DURATION,
                timescale: TIMESCALE,
                data: Bytes::from(vec![i as u8; 4]),
            })
            .collect()
    }

    /// Scripted engine: emits `Ready` once `ready_at` bytes arrived, then
    /// each sample batch once its byte threshold is reached. `flush`
    /// releases everything still pending.
    struct ScriptedEngine {
        tracks: Vec<TrackInfo>,
        ready: Option<ContainerInfo>,
        ready_at: u64,
        batches: VecDeque<(u64, u32, Vec<EngineSample>)>,
        received: u64,
    }

    impl ScriptedEngine {
        fn new(
            info: ContainerInfo,
            ready_at: u64,
            batches: Vec<(u64, u32, Vec<EngineSample>)>,
        ) -> Self {
            let mut tracks = info.video_tracks.clone();
            tracks.extend(info.other_tracks.clone());
            Self {
                tracks,
                ready: Some(info),
                ready_at,
                batches: batches.into(),
                received: 0,
            }
        }

        fn due_events(&mut self) -> Vec<EngineEvent> {
            let mut events = Vec::new();
            if self.received >= self.ready_at {
                if let Some(info) = self.ready.take() {
                    events.push(EngineEvent::Ready(info));
                }
            }
            if self.ready.is_none() {
                loop {
                    match self.batches.front() {
                        Some((at, _, _)) if *at <= self.received => {
                            let (_, track_id, samples) = self.batches.pop_front().unwrap();
                            events.push(EngineEvent::Samples { track_id, samples });
                        }
                        _ => break,
                    }
                }
            }
            events
        }
    }

    impl BoxEngine for ScriptedEngine {
        fn append(&mut self, data: Bytes, _offset: u64) -> Result<Vec<EngineEvent>, PipelineError> {
            self.received += data.len() as u64;
            Ok(self.due_events())
        }

        fn flush(&mut self) -> Result<Vec<EngineEvent>, PipelineError> {
            self.received = u64::MAX;
            Ok(self.due_events())
        }

        fn track(&self, id: u32) -> Option<&TrackInfo> {
            self.tracks.iter().find(|t| t.id == id)
        }
    }

    /// Echoes every submitted sample back as one decoded frame, preserving
    /// submission order. Can be scripted to reject configuration or to
    /// report an internal failure at a given submission index.
    struct EchoDecoder {
        output: Option<mpsc::UnboundedSender<DecoderEvent>>,
        supported: bool,
        fail_at: Option<usize>,
        submitted: usize,
    }

    impl EchoDecoder {
        fn new() -> Self {
            Self {
                output: None,
                supported: true,
                fail_at: None,
                submitted: 0,
            }
        }

        fn unsupported() -> Self {
            Self {
                supported: false,
                ..Self::new()
            }
        }

        fn failing_at(index: usize) -> Self {
            Self {
                fail_at: Some(index),
                ..Self::new()
            }
        }
    }

    impl PlatformDecoder for EchoDecoder {
        fn is_config_supported(&self, _config: &DecoderConfig) -> bool {
            self.supported
        }

        fn configure(
            &mut self,
            _config: &DecoderConfig,
            output: mpsc::UnboundedSender<DecoderEvent>,
        ) -> Result<(), PipelineError> {
            self.output = Some(output);
            Ok(())
        }

        fn decode(
            &mut self,
            data: &[u8],
            timestamp_micros: i64,
            _is_sync: bool,
        ) -> Result<(), PipelineError> {
            let Some(tx) = &self.output else {
                return Err(PipelineError::Decode("decoder not configured".into()));
            };
            let event = if self.fail_at == Some(self.submitted) {
                DecoderEvent::Error("internal decoder failure".into())
            } else {
                DecoderEvent::Frame(RawFrame {
                    image: FrameImage {
                        data: Bytes::copy_from_slice(data),
                        width: 320,
                        height: 240,
                    },
                    timestamp_micros,
                })
            };
            self.submitted += 1;
            let _ = tx.send(event);
            Ok(())
        }

        fn flush(&mut self) -> Result<(), PipelineError> {
            Ok(())
        }

        fn close(&mut self) {
            self.output = None;
        }
    }

    /// Split `total` dummy container bytes into `parts` contiguous chunks
    /// and queue them on a channel source.
    fn chunked_source(total: usize, parts: usize) -> mpsc::Receiver<ByteChunk> {
        let (tx, rx) = mpsc::channel(parts.max(1));
        let part = total / parts;
        let mut start = 0usize;
        for i in 0..parts {
            let len = if i == parts - 1 { total - start } else { part };
            let chunk = ByteChunk::new(Bytes::from(vec![0u8; len]), start as u64, total as u64);
            tx.try_send(chunk).unwrap();
            start += len;
        }
        rx
    }

    fn single_track_engine(sample_count: u64, edit_list: Vec<EditListEntry>) -> ScriptedEngine {
        let track = video_track(sample_count, edit_list);
        ScriptedEngine::new(
            ContainerInfo {
                video_tracks: vec![track],
                other_tracks: Vec::new(),
            },
            100,
            vec![(100, 1, coded_samples(0..sample_count))],
        )
    }

    async fn collect_frames(session: &mut VideoSession) -> Vec<(i64, i64)> {
        let mut out = Vec::new();
        while let Some(frame) = session.frames.next().await {
            out.push((frame.timestamp_micros, frame.duration_micros));
        }
        out
    }

    #[tokio::test]
    async fn test_ten_samples_yield_ten_frames_with_durations() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(10, Vec::new())),
            Box::new(EchoDecoder::new()),
        );
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        assert_eq!(session.metadata.width, 320);
        assert_eq!(session.metadata.height, 240);
        assert_eq!(session.metadata.total_frame_count, 10);
        assert!((session.metadata.frame_rate - 30.0).abs() < 1e-9);

        let frames = collect_frames(&mut session).await;
        assert_eq!(frames.len(), 10);
        for (i, (ts, duration)) in frames.iter().enumerate() {
            assert_eq!(*ts, i as i64 * 33_333);
            assert_eq!(*duration, 33_333);
        }
        assert!(session.frames.error().is_none());
    }

    #[tokio::test]
    async fn test_delivery_preserves_submission_order() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(25, Vec::new())),
            Box::new(EchoDecoder::new()),
        );
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        let timestamps: Vec<i64> = collect_frames(&mut session)
            .await
            .into_iter()
            .map(|(ts, _)| ts)
            .collect();
        let expected: Vec<i64> = (0..25).map(|i| i * 33_333).collect();
        assert_eq!(timestamps, expected);
    }

    #[tokio::test]
    async fn test_chunked_input_equals_whole_buffer() {
        async fn run(parts: usize) -> Vec<(i64, i64)> {
            let track = video_track(10, Vec::new());
            let engine = ScriptedEngine::new(
                ContainerInfo {
                    video_tracks: vec![track],
                    other_tracks: Vec::new(),
                },
                50,
                vec![
                    (50, 1, coded_samples(0..3)),
                    (100, 1, coded_samples(3..6)),
                    (150, 1, coded_samples(6..8)),
                    (200, 1, coded_samples(8..10)),
                ],
            );
            let driver = StreamDriver::new(Box::new(engine), Box::new(EchoDecoder::new()));
            let mut session = driver.start(chunked_source(200, parts)).await.unwrap();
            collect_frames(&mut session).await
        }

        let whole = run(1).await;
        let split = run(4).await;
        assert_eq!(whole.len(), 10);
        assert_eq!(whole, split);
    }

    #[tokio::test]
    async fn test_no_video_track_fails_before_frames() {
        let engine = ScriptedEngine::new(ContainerInfo::default(), 10, Vec::new());
        let driver = StreamDriver::new(Box::new(engine), Box::new(EchoDecoder::new()));

        let err = driver.start(chunked_source(64, 1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoVideoTrack));
    }

    #[tokio::test]
    async fn test_source_end_without_track_resolution() {
        // The engine never manages to resolve the track tables.
        let engine = single_track_engine(10, Vec::new());
        let engine = ScriptedEngine {
            ready: None,
            batches: VecDeque::new(),
            ..engine
        };
        let driver = StreamDriver::new(Box::new(engine), Box::new(EchoDecoder::new()));

        let err = driver.start(chunked_source(64, 1)).await.unwrap_err();
        assert!(matches!(err, PipelineError::NoVideoTrack));
    }

    #[tokio::test]
    async fn test_fallback_to_alternate_track() {
        let track = video_track(5, Vec::new());
        let engine = ScriptedEngine::new(
            ContainerInfo {
                video_tracks: Vec::new(),
                other_tracks: vec![track],
            },
            100,
            vec![(100, 1, coded_samples(0..5))],
        );
        let driver = StreamDriver::new(Box::new(engine), Box::new(EchoDecoder::new()));
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        assert_eq!(session.metadata.total_frame_count, 5);
        assert_eq!(collect_frames(&mut session).await.len(), 5);
    }

    #[tokio::test]
    async fn test_unsupported_codec_config() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(10, Vec::new())),
            Box::new(EchoDecoder::unsupported()),
        );

        let err = driver.start(chunked_source(200, 1)).await.unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnsupportedCodecConfig { .. }
        ));
    }

    #[tokio::test]
    async fn test_edit_list_trims_leading_frames() {
        // First edit starts at media time 3000: samples with cts 0, 1000
        // and 2000 fall before it.
        let edit = vec![EditListEntry {
            segment_duration: 0,
            media_time: 3000,
        }];
        let driver = StreamDriver::new(
            Box::new(single_track_engine(10, edit)),
            Box::new(EchoDecoder::new()),
        );
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        let frames = collect_frames(&mut session).await;
        assert_eq!(frames.len(), 7);
        assert_eq!(frames[0].0, 100_000);
        assert_eq!(
            session
                .stats
                .frames_trimmed
                .load(std::sync::atomic::Ordering::Relaxed),
            3
        );
    }

    #[tokio::test]
    async fn test_decode_error_terminates_stream() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(10, Vec::new())),
            Box::new(EchoDecoder::failing_at(5)),
        );
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        let frames = collect_frames(&mut session).await;
        assert_eq!(frames.len(), 5);
        assert!(matches!(
            session.frames.error(),
            Some(PipelineError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_gapped_chunks_rejected() {
        let (tx, rx) = mpsc::channel(2);
        tx.try_send(ByteChunk::new(Bytes::from(vec![0u8; 50]), 0, 200))
            .unwrap();
        tx.try_send(ByteChunk::new(Bytes::from(vec![0u8; 50]), 60, 200))
            .unwrap();
        drop(tx);

        // Track tables would only resolve after more bytes than the first
        // chunk carries, so the gap surfaces as the session error.
        let engine = single_track_engine(10, Vec::new());
        let driver = StreamDriver::new(Box::new(engine), Box::new(EchoDecoder::new()));
        let err = driver.start(rx).await.unwrap_err();
        assert!(matches!(err, PipelineError::Parse(_)));
    }

    #[tokio::test]
    async fn test_progress_callback_after_each_delivery() {
        let seen: Arc<Mutex<Vec<u64>>> = Arc::new(Mutex::new(Vec::new()));
        let seen_cb = seen.clone();

        let driver = StreamDriver::new(
            Box::new(single_track_engine(4, Vec::new())),
            Box::new(EchoDecoder::new()),
        )
        .on_progress(move |progress| {
            assert_eq!(progress.metadata.total_frame_count, 4);
            seen_cb.lock().unwrap().push(progress.frames_decoded);
        });
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        collect_frames(&mut session).await;
        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_pull_after_end_is_idempotent() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(2, Vec::new())),
            Box::new(EchoDecoder::new()),
        );
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        collect_frames(&mut session).await;
        for _ in 0..3 {
            assert!(session.frames.next().await.is_none());
        }
    }

    #[tokio::test]
    async fn test_frame_copy_quirk_preserves_output() {
        let driver = StreamDriver::new(
            Box::new(single_track_engine(3, Vec::new())),
            Box::new(EchoDecoder::new()),
        )
        .with_caps(PlatformCaps {
            frame_copy_required: true,
        });
        let mut session = driver.start(chunked_source(200, 1)).await.unwrap();

        let mut count = 0;
        while let Some(frame) = session.frames.next().await {
            // The echo decoder fills each payload with the sample index.
            assert_eq!(frame.image.data, Bytes::from(vec![count as u8; 4]));
            count += 1;
        }
        assert_eq!(count, 3);
    }
}
