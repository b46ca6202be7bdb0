//! OCR engine abstraction.
//!
//! An engine may be expensive to create (model load, binary lookup), so the
//! pipeline builds one per run and lends it to every frame by reference.

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use image::GrayImage;
use readout_types::{reading::TextRegion, ReadoutError, Result};

mod tesseract;

pub use tesseract::TesseractEngine;

#[async_trait]
pub trait OcrEngine: Send + Sync {
    fn name(&self) -> &str;
    /// Recognize text regions in engine order. An `Err` means the engine
    /// itself failed, not that the image held no text.
    async fn recognize(&self, image: &GrayImage) -> Result<Vec<TextRegion>>;
}

type Responder = dyn Fn(&GrayImage) -> Result<Vec<TextRegion>> + Send + Sync;

/// Deterministic engine whose answers come from a closure over the image.
pub struct ScriptedEngine {
    responder: Box<Responder>,
    calls: AtomicUsize,
}

impl ScriptedEngine {
    pub fn new<F>(responder: F) -> Self
    where
        F: Fn(&GrayImage) -> Result<Vec<TextRegion>> + Send + Sync + 'static,
    {
        Self {
            responder: Box::new(responder),
            calls: AtomicUsize::new(0),
        }
    }

    /// Always answer with the same regions.
    pub fn constant(texts: &[&str]) -> Self {
        let regions: Vec<TextRegion> = texts.iter().map(|text| TextRegion::new(*text)).collect();
        Self::new(move |_| Ok(regions.clone()))
    }

    /// Always fail, as a crashed or timed-out engine would.
    pub fn failing(message: &str) -> Self {
        let message = message.to_string();
        Self::new(move |_| Err(ocr_error(message.clone())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl OcrEngine for ScriptedEngine {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn recognize(&self, image: &GrayImage) -> Result<Vec<TextRegion>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        (self.responder)(image)
    }
}

pub fn ocr_error(message: impl Into<String>) -> ReadoutError {
    ReadoutError::Ocr(message.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[tokio::test]
    async fn scripted_engine_answers_from_image() {
        let engine = ScriptedEngine::new(|image| {
            let shade = image.get_pixel(0, 0)[0];
            Ok(vec![TextRegion::new(shade.to_string())])
        });
        let image = GrayImage::from_pixel(2, 2, Luma([42]));
        let regions = engine.recognize(&image).await.expect("scripted answer");
        assert_eq!(regions, vec![TextRegion::new("42")]);
        assert_eq!(engine.calls(), 1);
    }

    #[tokio::test]
    async fn failing_engine_reports_ocr_error() {
        let engine = ScriptedEngine::failing("engine crashed");
        let err = engine
            .recognize(&GrayImage::new(1, 1))
            .await
            .expect_err("failure");
        assert!(matches!(err, ReadoutError::Ocr(_)));
    }
}
