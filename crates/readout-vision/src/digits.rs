//! Numeric token extraction from OCR output.

use image::GrayImage;
use readout_ocr::OcrEngine;
use readout_types::reading::{Candidate, SlotReading};
use tracing::{debug, warn};

/// Characters OCR tends to hallucinate around a display's digits.
const NOISE: &[char] = &[
    '\'', '"', '`', '\u{2018}', '\u{2019}', '\u{201c}', '\u{201d}', '(', ')', '[', ']', '{', '}',
];

/// Drop whitespace, line breaks and stray quotes/brackets.
pub fn clean_text(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !NOISE.contains(c))
        .collect()
}

/// Value of a region whose cleaned text is nothing but ASCII digits.
///
/// Anything else is rejected outright: `98.6` is neither 98 nor 986, and a
/// sign or letter makes the whole region unusable.
pub fn parse_value(raw: &str) -> Option<u64> {
    let cleaned = clean_text(raw);
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse().ok()
}

pub fn candidate(raw: impl Into<String>) -> Candidate {
    let raw_text = raw.into();
    let value = parse_value(&raw_text);
    Candidate { raw_text, value }
}

/// Result of running OCR over one preprocessed frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Zero or more candidates in engine order.
    Recognized(Vec<Candidate>),
    EngineFailed(String),
}

impl Extraction {
    pub fn candidates(&self) -> &[Candidate] {
        match self {
            Extraction::Recognized(candidates) => candidates,
            Extraction::EngineFailed(_) => &[],
        }
    }

    pub fn into_reading(self) -> SlotReading {
        match self {
            Extraction::Recognized(candidates) => SlotReading::Recognized { candidates },
            Extraction::EngineFailed(reason) => SlotReading::EngineFailed { reason },
        }
    }
}

/// Runs an engine over preprocessed images. Engine errors are absorbed here
/// and never reach the caller as `Err`.
pub struct DigitExtractor<'e> {
    engine: &'e dyn OcrEngine,
}

impl<'e> DigitExtractor<'e> {
    pub fn new(engine: &'e dyn OcrEngine) -> Self {
        Self { engine }
    }

    pub fn engine_name(&self) -> &str {
        self.engine.name()
    }

    pub async fn extract(&self, image: &GrayImage) -> Extraction {
        match self.engine.recognize(image).await {
            Ok(regions) => {
                let candidates: Vec<Candidate> = regions
                    .into_iter()
                    .map(|region| candidate(region.text))
                    .collect();
                debug!(
                    "{} produced {:?}",
                    self.engine.name(),
                    candidates.iter().map(|c| &c.raw_text).collect::<Vec<_>>()
                );
                Extraction::Recognized(candidates)
            }
            Err(err) => {
                warn!("{} failed: {}", self.engine.name(), err);
                Extraction::EngineFailed(err.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use readout_ocr::ScriptedEngine;

    #[test]
    fn decimal_point_is_rejected() {
        assert_eq!(parse_value(" 98.6\n"), None);
    }

    #[test]
    fn quotes_and_parentheses_are_stripped() {
        assert_eq!(parse_value("'142)"), Some(142));
        assert_eq!(parse_value("\u{201c}37\u{201d}"), Some(37));
        assert_eq!(parse_value("[ 21 ]\n"), Some(21));
    }

    #[test]
    fn mixed_or_signed_text_is_rejected() {
        for raw in ["12a", "-5", "+7", "1,5", "O7", "", "  \n", "()", "٣"] {
            assert_eq!(parse_value(raw), None, "{raw:?} should be rejected");
        }
    }

    #[test]
    fn oversized_numbers_are_rejected() {
        assert_eq!(parse_value("99999999999999999999999"), None);
        assert_eq!(parse_value("0042"), Some(42));
    }

    #[test]
    fn candidate_keeps_raw_text() {
        let c = candidate(" 98.6\n");
        assert_eq!(c.raw_text, " 98.6\n");
        assert_eq!(c.value, None);
    }

    #[tokio::test]
    async fn regions_keep_engine_order() {
        let engine = ScriptedEngine::constant(&["abc", "98.6", "'37)", "40"]);
        let extractor = DigitExtractor::new(&engine);
        let extraction = extractor.extract(&GrayImage::new(2, 2)).await;
        let values: Vec<Option<u64>> = extraction.candidates().iter().map(|c| c.value).collect();
        assert_eq!(values, vec![None, None, Some(37), Some(40)]);
    }

    #[tokio::test]
    async fn engine_failure_yields_no_candidates() {
        let engine = ScriptedEngine::failing("buffer corrupted");
        let extractor = DigitExtractor::new(&engine);
        let extraction = extractor.extract(&GrayImage::new(2, 2)).await;
        assert!(extraction.candidates().is_empty());
        assert!(matches!(
            extraction.into_reading(),
            SlotReading::EngineFailed { reason } if reason.contains("buffer corrupted")
        ));
    }
}
