//! Frame normalization and numeric text extraction.

pub mod digits;
pub mod preprocess;

pub use digits::{clean_text, parse_value, DigitExtractor, Extraction};
pub use preprocess::FramePreprocessor;
