//! Video source abstraction and periodic frame sampling.

use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use image::{Rgb, RgbImage};
use readout_types::{sample::VideoMetadata, ReadoutError, Result};
use tracing::debug;

mod ffmpeg;
pub mod sampler;

pub use ffmpeg::FfmpegSource;
pub use sampler::{FrameSampler, SampleResult, SampledSlot};

/// Seekable, finite stream of frames.
///
/// A source is owned by one pipeline run. Implementations are not expected
/// to support concurrent seeks, hence `&mut self`.
#[async_trait]
pub trait VideoSource: Send {
    fn metadata(&self) -> VideoMetadata;
    /// Human readable label used in logs and debug events.
    fn describe(&self) -> String;
    async fn read_frame(&mut self, frame_index: u64) -> Result<RgbImage>;
}

/// In-memory source used for tests and dry runs.
pub struct MockSource {
    metadata: VideoMetadata,
    frames: HashMap<u64, RgbImage>,
    failing: HashSet<u64>,
    reads: Vec<u64>,
}

impl MockSource {
    pub fn new(metadata: VideoMetadata) -> Self {
        Self {
            metadata,
            frames: HashMap::new(),
            failing: HashSet::new(),
            reads: Vec::new(),
        }
    }

    /// Convenience constructor for a clip of `seconds` at `frame_rate`.
    pub fn with_duration(seconds: u64, frame_rate: f64) -> Self {
        let total_frames = (seconds as f64 * frame_rate).round() as u64;
        Self::new(VideoMetadata::new(Some(frame_rate), frame_rate, total_frames, 8, 8))
    }

    pub fn with_frame(mut self, frame_index: u64, image: RgbImage) -> Self {
        self.frames.insert(frame_index, image);
        self
    }

    pub fn failing_at(mut self, frame_index: u64) -> Self {
        self.failing.insert(frame_index);
        self
    }

    /// Frame indices requested so far, in call order.
    pub fn reads(&self) -> &[u64] {
        &self.reads
    }

    fn placeholder(&self, frame_index: u64) -> RgbImage {
        let shade = (frame_index % 256) as u8;
        RgbImage::from_pixel(
            self.metadata.width.max(1),
            self.metadata.height.max(1),
            Rgb([shade, shade, shade]),
        )
    }
}

#[async_trait]
impl VideoSource for MockSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn describe(&self) -> String {
        format!(
            "mock source ({} frames @ {} fps)",
            self.metadata.total_frames, self.metadata.frame_rate
        )
    }

    async fn read_frame(&mut self, frame_index: u64) -> Result<RgbImage> {
        self.reads.push(frame_index);
        debug!("Mock read of frame {}", frame_index);
        if self.failing.contains(&frame_index) {
            return Err(decode_error(format!("corrupt frame {frame_index}")));
        }
        if let Some(image) = self.frames.get(&frame_index) {
            return Ok(image.clone());
        }
        if frame_index >= self.metadata.total_frames {
            return Err(decode_error(format!(
                "frame {frame_index} is past the end of stream"
            )));
        }
        Ok(self.placeholder(frame_index))
    }
}

/// Per-frame decode failure; recoverable.
pub fn decode_error(message: impl Into<String>) -> ReadoutError {
    ReadoutError::Decode(message.into())
}

/// The source cannot be used at all; fatal for the run.
pub fn unavailable_error(message: impl Into<String>) -> ReadoutError {
    ReadoutError::SourceUnavailable(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_source_reports_failures_and_end_of_stream() {
        let mut source = MockSource::with_duration(2, 10.0).failing_at(5);
        assert_eq!(source.metadata().total_frames, 20);

        assert!(source.read_frame(0).await.is_ok());
        let err = source.read_frame(5).await.expect_err("scripted failure");
        assert!(matches!(err, ReadoutError::Decode(_)));
        let err = source.read_frame(20).await.expect_err("end of stream");
        assert!(matches!(err, ReadoutError::Decode(_)));
        assert_eq!(source.reads(), &[0, 5, 20]);
    }

    #[tokio::test]
    async fn mock_source_serves_scripted_frames() {
        let image = RgbImage::from_pixel(3, 5, Rgb([1, 2, 3]));
        let mut source = MockSource::with_duration(1, 30.0).with_frame(0, image.clone());
        let read = source.read_frame(0).await.expect("scripted frame");
        assert_eq!(read, image);
    }
}
