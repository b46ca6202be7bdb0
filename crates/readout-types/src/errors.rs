use thiserror::Error;

pub type Result<T, E = ReadoutError> = std::result::Result<T, E>;

/// Unified error type covering the failures that escape a subsystem.
///
/// Per-frame problems (a frame that will not decode, an OCR call that times
/// out) never surface here; they are folded into diagnostics instead.
#[derive(Debug, Error)]
pub enum ReadoutError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("ocr error: {0}")]
    Ocr(String),
    #[error("export error: {0}")]
    Export(String),
    #[error("operational error: {0}")]
    Ops(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ReadoutError {
    /// Whether the run failed because the video could not be opened at all.
    pub fn is_source_unavailable(&self) -> bool {
        matches!(self, ReadoutError::SourceUnavailable(_))
    }
}
