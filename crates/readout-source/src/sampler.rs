//! Fixed-interval frame sampling.

use async_stream::stream;
use futures::Stream;
use readout_types::sample::{sample_timestamps, Frame, SampleSpec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::VideoSource;

#[derive(Debug, Clone)]
pub enum SampleResult {
    Decoded(Frame),
    DecodeFailed(String),
}

/// One requested sample slot and what the source produced for it.
#[derive(Debug, Clone)]
pub struct SampledSlot {
    pub sequence: usize,
    pub timestamp: u64,
    pub frame_index: u64,
    pub result: SampleResult,
}

/// Walks a source at `0, interval, 2*interval, ..` seconds.
///
/// The sampler borrows the source exclusively; seeks happen one at a time.
pub struct FrameSampler<'a, S: VideoSource + ?Sized> {
    source: &'a mut S,
    spec: SampleSpec,
    plan: Vec<u64>,
    cancel: CancellationToken,
}

impl<'a, S: VideoSource + ?Sized> FrameSampler<'a, S> {
    pub fn new(source: &'a mut S, spec: SampleSpec) -> Self {
        let plan = sample_timestamps(source.metadata().whole_seconds(), spec.interval_seconds());
        Self {
            source,
            spec,
            plan,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Timestamps that will be attempted, in order.
    pub fn plan(&self) -> &[u64] {
        &self.plan
    }

    /// Consume the sampler into a lazy stream of slots.
    ///
    /// A failed decode yields `DecodeFailed` and sampling continues. Once
    /// the token is cancelled no further slots are yielded; a seek in flight
    /// is dropped.
    pub fn into_stream(self) -> impl Stream<Item = SampledSlot> + Send + 'a
    where
        S: 'a,
    {
        let FrameSampler {
            source,
            spec,
            plan,
            cancel,
        } = self;

        stream! {
            let metadata = source.metadata();
            info!(
                "Sampling {} slots every {}s from {}",
                plan.len(),
                spec.interval_seconds(),
                source.describe()
            );

            for (sequence, timestamp) in plan.into_iter().enumerate() {
                if cancel.is_cancelled() {
                    info!("Sampling cancelled before {}s", timestamp);
                    break;
                }

                let frame_index = metadata.frame_index_at(timestamp);
                let read = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    read = source.read_frame(frame_index) => Some(read),
                };
                let Some(read) = read else {
                    info!("Sampling cancelled while reading {}s", timestamp);
                    break;
                };

                let result = match read {
                    Ok(image) => {
                        let frame = Frame::new(timestamp, frame_index, image);
                        let frame = if spec.rotate_clockwise_90() {
                            frame.rotated_clockwise_90()
                        } else {
                            frame
                        };
                        debug!("Sampled {}s (frame {})", timestamp, frame_index);
                        SampleResult::Decoded(frame)
                    }
                    Err(err) => {
                        warn!("Failed to read frame at {}s: {}", timestamp, err);
                        SampleResult::DecodeFailed(err.to_string())
                    }
                };

                yield SampledSlot {
                    sequence,
                    timestamp,
                    frame_index,
                    result,
                };
            }
        }
    }
}
