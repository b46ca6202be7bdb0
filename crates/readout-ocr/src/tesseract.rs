use std::{path::PathBuf, process::Stdio, time::Duration};

use async_trait::async_trait;
use image::{codecs::png::PngEncoder, ColorType, GrayImage, ImageEncoder};
use readout_types::{config::OcrConfig, reading::TextRegion, Result};
use tokio::{io::AsyncWriteExt, process::Command};
use tracing::debug;

use crate::{ocr_error, OcrEngine};

const DIGIT_WHITELIST: &str = "tessedit_char_whitelist=0123456789";

/// Tesseract invoked as a subprocess, one process per image.
///
/// The image is streamed to stdin as PNG and the recognized text is read
/// back from stdout. Each non-blank output line becomes one region.
pub struct TesseractEngine {
    program: PathBuf,
    language: String,
    page_segmentation_mode: u8,
    digits_only: bool,
    timeout: Duration,
}

impl TesseractEngine {
    pub fn new(config: &OcrConfig) -> Self {
        Self {
            program: PathBuf::from(&config.tesseract_path),
            language: config.language.clone(),
            page_segmentation_mode: config.page_segmentation_mode,
            digits_only: config.digits_only,
            timeout: Duration::from_millis(config.timeout_ms),
        }
    }

    fn args(&self) -> Vec<String> {
        let mut args = vec![
            "stdin".to_string(),
            "stdout".into(),
            "-l".into(),
            self.language.clone(),
            "--psm".into(),
            self.page_segmentation_mode.to_string(),
        ];
        if self.digits_only {
            args.push("-c".into());
            args.push(DIGIT_WHITELIST.into());
        }
        args
    }

    async fn run(&self, png: Vec<u8>) -> Result<Vec<u8>> {
        let mut child = Command::new(&self.program)
            .args(self.args())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|err| {
                ocr_error(format!("failed to start {}: {err}", self.program.display()))
            })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| ocr_error("tesseract stdin unavailable"))?;
        let feed = async move {
            stdin.write_all(&png).await?;
            stdin.shutdown().await
        };
        let (fed, output) = tokio::join!(feed, child.wait_with_output());

        let output = output.map_err(|err| ocr_error(format!("tesseract did not finish: {err}")))?;
        fed.map_err(|err| ocr_error(format!("failed to send image to tesseract: {err}")))?;
        if !output.status.success() {
            return Err(ocr_error(format!(
                "tesseract exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl OcrEngine for TesseractEngine {
    fn name(&self) -> &str {
        "tesseract"
    }

    async fn recognize(&self, image: &GrayImage) -> Result<Vec<TextRegion>> {
        let png = encode_png(image)?;
        let stdout = tokio::time::timeout(self.timeout, self.run(png))
            .await
            .map_err(|_| ocr_error(format!("tesseract timed out after {:?}", self.timeout)))??;
        let regions = parse_output(&stdout);
        debug!("tesseract returned {} region(s)", regions.len());
        Ok(regions)
    }
}

fn encode_png(image: &GrayImage) -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    PngEncoder::new(&mut buffer)
        .write_image(image.as_raw(), image.width(), image.height(), ColorType::L8)
        .map_err(|err| ocr_error(format!("failed to encode image: {err}")))?;
    Ok(buffer)
}

fn parse_output(stdout: &[u8]) -> Vec<TextRegion> {
    String::from_utf8_lossy(stdout)
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(TextRegion::new)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use readout_types::ReadoutError;

    #[test]
    fn digit_mode_arguments() {
        let engine = TesseractEngine::new(&OcrConfig::default());
        assert_eq!(
            engine.args(),
            vec![
                "stdin",
                "stdout",
                "-l",
                "eng",
                "--psm",
                "7",
                "-c",
                "tessedit_char_whitelist=0123456789"
            ]
        );

        let config = OcrConfig {
            digits_only: false,
            page_segmentation_mode: 8,
            ..OcrConfig::default()
        };
        let engine = TesseractEngine::new(&config);
        assert_eq!(engine.args().last().map(String::as_str), Some("8"));
    }

    #[test]
    fn output_lines_become_regions() {
        let regions = parse_output(b" 98.6\n\n142\n\x0c");
        let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
        // the trailing form feed tesseract prints counts as blank
        assert_eq!(texts, vec![" 98.6", "142"]);
    }

    #[test]
    fn png_encoding_round_trips_dimensions() {
        let png = encode_png(&GrayImage::new(7, 3)).expect("encode");
        let decoded = image::load_from_memory(&png).expect("decode");
        assert_eq!((decoded.width(), decoded.height()), (7, 3));
    }

    #[tokio::test]
    async fn missing_binary_is_an_engine_error() {
        let config = OcrConfig {
            tesseract_path: "/nonexistent/tesseract".into(),
            ..OcrConfig::default()
        };
        let engine = TesseractEngine::new(&config);
        let err = engine
            .recognize(&GrayImage::new(4, 4))
            .await
            .expect_err("no binary");
        assert!(matches!(err, ReadoutError::Ocr(_)));
    }

    #[cfg(unix)]
    mod tools {
        use super::*;
        use std::{fs, os::unix::fs::PermissionsExt, time::Instant};

        fn engine_script(name: &str, body: &str, timeout_ms: u64) -> (TesseractEngine, PathBuf) {
            let dir = std::env::temp_dir()
                .join(format!("readout-tesseract-{name}-{}", std::process::id()));
            let _ = fs::remove_dir_all(&dir);
            fs::create_dir_all(&dir).expect("scratch dir");
            let program = dir.join("tesseract");
            fs::write(&program, format!("#!/bin/sh\n{body}\n")).expect("write script");
            fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).expect("chmod");

            let config = OcrConfig {
                tesseract_path: program.display().to_string(),
                timeout_ms,
                ..OcrConfig::default()
            };
            (TesseractEngine::new(&config), dir)
        }

        #[tokio::test]
        async fn stalled_engine_times_out() {
            let (engine, dir) = engine_script("stall", "exec sleep 5", 200);
            let started = Instant::now();
            let err = engine
                .recognize(&GrayImage::new(4, 4))
                .await
                .expect_err("timeout");
            assert!(matches!(&err, ReadoutError::Ocr(msg) if msg.contains("timed out")));
            assert!(started.elapsed() < Duration::from_secs(4));
            fs::remove_dir_all(dir).expect("cleanup");
        }

        #[tokio::test]
        async fn stdout_lines_are_recognized() {
            let (engine, dir) =
                engine_script("lines", "cat > /dev/null\nprintf '21\\n\\n 98.6\\n'", 5_000);
            let regions = engine.recognize(&GrayImage::new(4, 4)).await.expect("regions");
            let texts: Vec<&str> = regions.iter().map(|r| r.text.as_str()).collect();
            assert_eq!(texts, vec!["21", " 98.6"]);
            fs::remove_dir_all(dir).expect("cleanup");
        }

        #[tokio::test]
        async fn nonzero_exit_is_an_engine_error() {
            let (engine, dir) =
                engine_script("exit", "cat > /dev/null\necho 'bad image' >&2\nexit 1", 5_000);
            let err = engine
                .recognize(&GrayImage::new(4, 4))
                .await
                .expect_err("engine failure");
            assert!(matches!(&err, ReadoutError::Ocr(msg) if msg.contains("bad image")));
            fs::remove_dir_all(dir).expect("cleanup");
        }
    }
}
