//! Sampling-and-extraction pipeline: sampler, preprocessor, OCR, assembler.

use std::{
    collections::HashSet,
    path::{Path, PathBuf},
};

use futures::StreamExt;
use image::GrayImage;
use readout_events::EventSink;
use readout_ocr::OcrEngine;
use readout_ops::SnapshotDir;
use readout_source::{FfmpegSource, FrameSampler, SampleResult, SampledSlot, VideoSource};
use readout_types::{
    config::{PipelineConfig, SourceConfig},
    events::{
        EventPayload, FrameSampled, FrameSkipped, OcrFailed, OcrText, PipelineEvent, RunFinished,
        RunStarted,
    },
    reading::{DropReason, ExtractionReport, SlotOutcome, SlotReading},
    sample::{Frame, SampleSpec},
    Result,
};
use readout_vision::{DigitExtractor, Extraction, FramePreprocessor};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub mod assembler;

pub use assembler::SeriesAssembler;

/// Drives one extraction run.
///
/// The engine lives as long as the pipeline and is lent to every frame.
/// Frames are sampled one at a time; preprocessing and OCR of up to
/// `ocr_workers` frames may overlap.
pub struct Pipeline<E, K>
where
    E: OcrEngine,
    K: EventSink,
{
    engine: E,
    sink: K,
    config: PipelineConfig,
    snapshot_dir: Option<PathBuf>,
    cancel: CancellationToken,
}

impl<E, K> Pipeline<E, K>
where
    E: OcrEngine,
    K: EventSink,
{
    pub fn new(config: PipelineConfig, engine: E, sink: K) -> Self {
        Self {
            engine,
            sink,
            config,
            snapshot_dir: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Save sampled frames under `dir`. The directory is prepared, and
    /// stale snapshots cleared, only once a run has an open source.
    pub fn with_snapshots(mut self, dir: impl Into<PathBuf>) -> Self {
        self.snapshot_dir = Some(dir.into());
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Token that abandons the remaining samples when cancelled.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Open `path` with ffmpeg and run. Fails with `SourceUnavailable`
    /// before any sampling if the file cannot be opened or probed.
    pub async fn run_file(
        &self,
        path: impl AsRef<Path>,
        source_config: &SourceConfig,
        spec: SampleSpec,
    ) -> Result<ExtractionReport> {
        let mut source = FfmpegSource::open(path, source_config).await?;
        self.run(&mut source, spec).await
    }

    /// Sample `source` according to `spec` and assemble the series.
    ///
    /// Per-frame failures end up in the report's diagnostics; an empty
    /// series is a valid result.
    pub async fn run<S>(&self, source: &mut S, spec: SampleSpec) -> Result<ExtractionReport>
    where
        S: VideoSource + ?Sized,
    {
        let snapshots = self
            .snapshot_dir
            .as_deref()
            .map(SnapshotDir::prepare)
            .transpose()?;
        let label = source.describe();
        let metadata = source.metadata();
        let sampler = FrameSampler::new(source, spec).with_cancellation(self.cancel.clone());
        let plan = sampler.plan().to_vec();

        info!(
            "Extracting {} ({:.1}s) every {}s: {} slot(s), {} OCR worker(s) using {}",
            label,
            metadata.duration_seconds(),
            spec.interval_seconds(),
            plan.len(),
            self.config.ocr_workers,
            self.engine.name()
        );
        self.publish(EventPayload::RunStarted(RunStarted {
            source: label,
            duration_seconds: metadata.duration_seconds(),
            requested_slots: plan.len(),
        }));

        let extractor = DigitExtractor::new(&self.engine);
        let outcomes: Vec<SlotOutcome> = sampler
            .into_stream()
            .map(|slot| self.process_slot(&extractor, snapshots.as_ref(), slot))
            .buffer_unordered(self.config.ocr_workers.max(1))
            .collect()
            .await;

        let seen: HashSet<usize> = outcomes.iter().map(|o| o.sequence).collect();
        let abandoned: Vec<u64> = plan
            .iter()
            .enumerate()
            .filter(|(sequence, _)| !seen.contains(sequence))
            .map(|(_, timestamp)| *timestamp)
            .collect();

        let mut assembler = SeriesAssembler::with_capacity(outcomes.len());
        for outcome in outcomes {
            assembler.push(outcome);
        }
        let mut report = assembler.finish();
        report.requested_slots = plan.len();
        report.cancelled = !abandoned.is_empty();
        report.abandoned = abandoned;

        if report.cancelled {
            warn!(
                "Run cancelled; {} slot(s) abandoned",
                report.abandoned.len()
            );
        }
        if report.no_digits_recognized() {
            warn!("No digits recognized in {} slot(s)", plan.len());
        } else {
            info!(
                "Assembled {} observation(s), {} slot(s) dropped",
                report.series.len(),
                report.diagnostics.len()
            );
        }
        self.publish(EventPayload::RunFinished(RunFinished {
            observations: report.series.len(),
            dropped: report.diagnostics.len(),
            cancelled: report.cancelled,
        }));
        Ok(report)
    }

    async fn process_slot(
        &self,
        extractor: &DigitExtractor<'_>,
        snapshots: Option<&SnapshotDir>,
        slot: SampledSlot,
    ) -> SlotOutcome {
        let SampledSlot {
            sequence,
            timestamp,
            frame_index,
            result,
        } = slot;

        let frame = match result {
            SampleResult::Decoded(frame) => frame,
            SampleResult::DecodeFailed(reason) => {
                self.publish(EventPayload::FrameSkipped(FrameSkipped {
                    sample_at: timestamp,
                    reason: DropReason::NoFrameDecoded,
                    detail: reason.clone(),
                }));
                return SlotOutcome::new(sequence, timestamp, SlotReading::DecodeFailed { reason });
            }
        };

        self.publish(EventPayload::FrameSampled(FrameSampled {
            sample_at: timestamp,
            frame_index,
            width: frame.width(),
            height: frame.height(),
        }));
        if let Some(snapshots) = snapshots {
            if let Err(err) = snapshots.save_frame(&frame) {
                warn!("Snapshot of {}s not saved: {}", timestamp, err);
            }
        }

        let image = match preprocess(frame).await {
            Ok(image) => image,
            Err(reason) => {
                warn!("Preprocessing of {}s aborted: {}", timestamp, reason);
                return SlotOutcome::new(sequence, timestamp, SlotReading::EngineFailed { reason });
            }
        };
        if let Some(snapshots) = snapshots {
            if let Err(err) = snapshots.save_preprocessed(timestamp, &image) {
                warn!("Preprocessed snapshot of {}s not saved: {}", timestamp, err);
            }
        }

        let extraction = extractor.extract(&image).await;
        match &extraction {
            Extraction::Recognized(candidates) => {
                self.publish(EventPayload::OcrText(OcrText {
                    sample_at: timestamp,
                    regions: candidates.iter().map(|c| c.raw_text.clone()).collect(),
                }));
            }
            Extraction::EngineFailed(error) => {
                self.publish(EventPayload::OcrFailed(OcrFailed {
                    sample_at: timestamp,
                    error: error.clone(),
                }));
            }
        }
        SlotOutcome::new(sequence, timestamp, extraction.into_reading())
    }

    fn publish(&self, payload: EventPayload) {
        self.sink.publish(PipelineEvent::new(payload));
    }
}

/// CPU-bound, so it runs off the async workers.
async fn preprocess(frame: Frame) -> std::result::Result<GrayImage, String> {
    tokio::task::spawn_blocking(move || FramePreprocessor::process(&frame))
        .await
        .map_err(|err| err.to_string())
}
