//! Image normalization ahead of OCR.
//!
//! Order is fixed: luminance, median denoise, then contrast. Stretching
//! contrast first would amplify sensor noise before the median can remove it.

use image::{GrayImage, Luma, RgbImage};
use imageproc::filter::median_filter;
use readout_types::sample::Frame;

/// 3x3 window.
pub const MEDIAN_RADIUS: u32 = 1;
pub const CONTRAST_FACTOR: f32 = 2.0;

pub struct FramePreprocessor;

impl FramePreprocessor {
    pub fn process(frame: &Frame) -> GrayImage {
        Self::process_image(&frame.image)
    }

    pub fn process_image(image: &RgbImage) -> GrayImage {
        let gray = to_luminance(image);
        if gray.width() == 0 || gray.height() == 0 {
            return gray;
        }
        let denoised = median_filter(&gray, MEDIAN_RADIUS, MEDIAN_RADIUS);
        enhance_contrast(&denoised, CONTRAST_FACTOR)
    }
}

/// ITU-R 601-2 luma in 16-bit fixed point, rounded.
pub fn to_luminance(image: &RgbImage) -> GrayImage {
    let mut out = GrayImage::new(image.width(), image.height());
    for (x, y, pixel) in image.enumerate_pixels() {
        let [r, g, b] = pixel.0;
        let luma = (r as u32 * 19_595 + g as u32 * 38_470 + b as u32 * 7_471 + 0x8000) >> 16;
        out.put_pixel(x, y, Luma([luma as u8]));
    }
    out
}

/// Scale each pixel's distance from the mean luminance by `factor`.
pub fn enhance_contrast(image: &GrayImage, factor: f32) -> GrayImage {
    let count = image.width() as u64 * image.height() as u64;
    if count == 0 {
        return image.clone();
    }
    let sum: u64 = image.pixels().map(|p| p[0] as u64).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        let value = mean + factor * (pixel[0] as f32 - mean);
        pixel[0] = if value <= 0.0 {
            0
        } else if value >= 255.0 {
            255
        } else {
            value as u8
        };
    }
    out
}
