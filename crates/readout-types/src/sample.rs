use image::{imageops, RgbImage};
use serde::{Deserialize, Serialize};

use crate::{ReadoutError, Result};

pub const DEFAULT_INTERVAL_SECONDS: u32 = 2;
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Sampling parameters for one pipeline run.
///
/// Only obtainable through [`SampleSpec::new`], so a zero interval never
/// reaches the sampler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleSpec {
    interval_seconds: u32,
    rotate_clockwise_90: bool,
}

impl SampleSpec {
    pub fn new(interval_seconds: u32, rotate_clockwise_90: bool) -> Result<Self> {
        if interval_seconds == 0 {
            return Err(ReadoutError::Configuration(
                "sampling interval must be a positive number of seconds".into(),
            ));
        }
        Ok(Self {
            interval_seconds,
            rotate_clockwise_90,
        })
    }

    pub fn interval_seconds(&self) -> u32 {
        self.interval_seconds
    }

    pub fn rotate_clockwise_90(&self) -> bool {
        self.rotate_clockwise_90
    }
}

impl Default for SampleSpec {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            rotate_clockwise_90: true,
        }
    }
}

/// Stream properties probed from a video source.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VideoMetadata {
    pub frame_rate: f64,
    pub total_frames: u64,
    pub width: u32,
    pub height: u32,
}

impl VideoMetadata {
    /// Build metadata, substituting `fallback_rate` when the probed rate is
    /// missing, zero or not a finite number.
    pub fn new(
        frame_rate: Option<f64>,
        fallback_rate: f64,
        total_frames: u64,
        width: u32,
        height: u32,
    ) -> Self {
        Self {
            frame_rate: resolve_frame_rate(frame_rate, fallback_rate),
            total_frames,
            width,
            height,
        }
    }

    pub fn duration_seconds(&self) -> f64 {
        self.total_frames as f64 / self.frame_rate
    }

    /// Last whole second covered by the stream; sample timestamps never
    /// exceed it.
    pub fn whole_seconds(&self) -> u64 {
        let duration = self.duration_seconds();
        if duration.is_finite() && duration > 0.0 {
            duration.floor() as u64
        } else {
            0
        }
    }

    /// Nearest frame index for a timestamp in seconds.
    pub fn frame_index_at(&self, timestamp: u64) -> u64 {
        (timestamp as f64 * self.frame_rate).round() as u64
    }
}

fn resolve_frame_rate(frame_rate: Option<f64>, fallback_rate: f64) -> f64 {
    let usable = |rate: f64| rate.is_finite() && rate > 0.0;
    match frame_rate {
        Some(rate) if usable(rate) => rate,
        _ if usable(fallback_rate) => fallback_rate,
        _ => DEFAULT_FRAME_RATE,
    }
}

/// Timestamps requested for a stream of `whole_seconds` at `interval`.
///
/// The upper bound is inclusive and timestamp 0 is always present, even for
/// a degenerate stream.
pub fn sample_timestamps(whole_seconds: u64, interval_seconds: u32) -> Vec<u64> {
    let step = interval_seconds.max(1) as usize;
    (0..=whole_seconds).step_by(step).collect()
}

/// A decoded raster tagged with the second it was sampled at.
#[derive(Debug, Clone)]
pub struct Frame {
    pub timestamp: u64,
    pub frame_index: u64,
    pub image: RgbImage,
}

impl Frame {
    pub fn new(timestamp: u64, frame_index: u64, image: RgbImage) -> Self {
        Self {
            timestamp,
            frame_index,
            image,
        }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    pub fn rotated_clockwise_90(self) -> Self {
        Self {
            image: imageops::rotate90(&self.image),
            ..self
        }
    }
}
