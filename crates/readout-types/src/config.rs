use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::sample::{SampleSpec, DEFAULT_FRAME_RATE, DEFAULT_INTERVAL_SECONDS};
use crate::{ReadoutError, Result};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingConfig {
    pub interval_seconds: u32,
    pub rotate_clockwise_90: bool,
}

impl Default for SamplingConfig {
    fn default() -> Self {
        Self {
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
            rotate_clockwise_90: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub ffmpeg_path: String,
    pub ffprobe_path: String,
    /// Used when the container does not report a usable frame rate.
    pub default_fps: f64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: "ffmpeg".into(),
            ffprobe_path: "ffprobe".into(),
            default_fps: DEFAULT_FRAME_RATE,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub tesseract_path: String,
    pub language: String,
    pub page_segmentation_mode: u8,
    pub digits_only: bool,
    pub timeout_ms: u64,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            tesseract_path: "tesseract".into(),
            language: "eng".into(),
            page_segmentation_mode: 7,
            digits_only: true,
            timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub ocr_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { ocr_workers: 1 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OpsConfig {
    pub log_level: String,
    pub debug_ocr: bool,
    pub snapshot_dir: Option<String>,
}

impl Default for OpsConfig {
    fn default() -> Self {
        Self {
            log_level: "info".into(),
            debug_ocr: false,
            snapshot_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub csv_path: Option<String>,
    pub json_path: Option<String>,
    pub value_label: String,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            csv_path: None,
            json_path: None,
            value_label: "Temperature".into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ReadoutConfig {
    pub sampling: SamplingConfig,
    pub source: SourceConfig,
    pub ocr: OcrConfig,
    pub pipeline: PipelineConfig,
    pub ops: OpsConfig,
    pub export: ExportConfig,
}

impl ReadoutConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|err| {
            ReadoutError::Configuration(format!(
                "unable to read config file {}: {err}",
                path_ref.display()
            ))
        })?;
        toml::from_str(&contents).map_err(|err| {
            ReadoutError::Configuration(format!(
                "failed to parse config file {}: {err}",
                path_ref.display()
            ))
        })
    }

    pub fn validate(&self) -> Result<()> {
        if self.sampling.interval_seconds == 0 {
            return Err(ReadoutError::Configuration(
                "sampling.interval_seconds must be greater than zero".into(),
            ));
        }
        if !(self.source.default_fps.is_finite() && self.source.default_fps > 0.0) {
            return Err(ReadoutError::Configuration(
                "source.default_fps must be a positive number".into(),
            ));
        }
        if self.ocr.timeout_ms == 0 {
            return Err(ReadoutError::Configuration(
                "ocr.timeout_ms must be greater than zero".into(),
            ));
        }
        if self.ocr.page_segmentation_mode > 13 {
            return Err(ReadoutError::Configuration(
                "ocr.page_segmentation_mode must be between 0 and 13".into(),
            ));
        }
        if self.pipeline.ocr_workers == 0 {
            return Err(ReadoutError::Configuration(
                "pipeline.ocr_workers must be greater than zero".into(),
            ));
        }
        if self.export.value_label.trim().is_empty() {
            return Err(ReadoutError::Configuration(
                "export.value_label must not be empty".into(),
            ));
        }
        Ok(())
    }

    pub fn sample_spec(&self) -> Result<SampleSpec> {
        SampleSpec::new(
            self.sampling.interval_seconds,
            self.sampling.rotate_clockwise_90,
        )
    }
}
