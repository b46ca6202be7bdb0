use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::{ImageFormat, RgbImage};
use readout_types::{config::SourceConfig, sample::VideoMetadata, Result};
use serde::Deserialize;
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::{decode_error, unavailable_error, VideoSource};

/// Video file decoded through the `ffprobe`/`ffmpeg` binaries.
///
/// Every seek spawns one `ffmpeg` process that emits a single PNG frame on
/// stdout. Slow compared to an in-process decoder, but exact and free of
/// native bindings.
pub struct FfmpegSource {
    path: PathBuf,
    ffmpeg_path: PathBuf,
    metadata: VideoMetadata,
}

impl FfmpegSource {
    /// Open and probe `path`. Any failure here means the source is
    /// unavailable and nothing has been sampled yet.
    pub async fn open(path: impl AsRef<Path>, config: &SourceConfig) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file_meta = tokio::fs::metadata(&path).await.map_err(|err| {
            unavailable_error(format!("cannot open {}: {err}", path.display()))
        })?;
        if !file_meta.is_file() {
            return Err(unavailable_error(format!(
                "{} is not a regular file",
                path.display()
            )));
        }

        let ffprobe = Path::new(&config.ffprobe_path);
        let mut stream = probe(ffprobe, &path, false).await?;
        if stream.nb_frames.is_none() {
            debug!("No frame count in container header, counting packets");
            stream = probe(ffprobe, &path, true).await?;
        }

        let metadata = stream.metadata(config.default_fps);
        info!(
            "Opened {} ({}x{}, {} frames @ {:.3} fps, {:.1}s)",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.total_frames,
            metadata.frame_rate,
            metadata.duration_seconds()
        );

        Ok(Self {
            path,
            ffmpeg_path: PathBuf::from(&config.ffmpeg_path),
            metadata,
        })
    }
}

#[async_trait]
impl VideoSource for FfmpegSource {
    fn metadata(&self) -> VideoMetadata {
        self.metadata
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    async fn read_frame(&mut self, frame_index: u64) -> Result<RgbImage> {
        let seek = frame_index as f64 / self.metadata.frame_rate;
        let args = [
            "-v".to_string(),
            "error".into(),
            "-nostdin".into(),
            "-ss".into(),
            format!("{seek:.6}"),
            "-i".into(),
            self.path.display().to_string(),
            "-frames:v".into(),
            "1".into(),
            "-f".into(),
            "image2pipe".into(),
            "-vcodec".into(),
            "png".into(),
            "-".into(),
        ];
        let raw = run_tool(&self.ffmpeg_path, &args)
            .await
            .map_err(|err| decode_error(format!("frame {frame_index}: {err}")))?;
        if raw.is_empty() {
            return Err(decode_error(format!(
                "frame {frame_index}: no data returned (end of stream?)"
            )));
        }

        let image = image::load_from_memory_with_format(&raw, ImageFormat::Png)
            .map_err(|err| decode_error(format!("frame {frame_index}: invalid png: {err}")))?;
        debug!(
            "Decoded frame {} at {:.3}s ({}x{})",
            frame_index,
            seek,
            image.width(),
            image.height()
        );
        Ok(image.to_rgb8())
    }
}

/// Run an external tool and return stdout, or stderr text on failure.
async fn run_tool(program: &Path, args: &[String]) -> std::result::Result<Vec<u8>, String> {
    let output = Command::new(program)
        .args(args)
        .kill_on_drop(true)
        .output()
        .await
        .map_err(|err| format!("failed to run {}: {err}", program.display()))?;

    if output.status.success() {
        Ok(output.stdout)
    } else {
        Err(format!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        ))
    }
}

/// Rates further apart than this are treated as disagreeing with the
/// container duration.
const DURATION_TOLERANCE_SECONDS: f64 = 1.0;

async fn probe(ffprobe: &Path, path: &Path, count_packets: bool) -> Result<ProbeStream> {
    let mut args: Vec<String> = vec![
        "-v".into(),
        "error".into(),
        "-select_streams".into(),
        "v:0".into(),
    ];
    if count_packets {
        args.push("-count_packets".into());
    }
    args.extend([
        "-show_entries".into(),
        "stream=width,height,r_frame_rate,avg_frame_rate,duration,nb_frames,nb_read_packets".into(),
        "-of".into(),
        "json".into(),
        path.display().to_string(),
    ]);
    let raw = run_tool(ffprobe, &args)
        .await
        .map_err(|err| unavailable_error(format!("probe of {} failed: {err}", path.display())))?;
    read_probe(&raw)
}

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
    nb_frames: Option<String>,
    nb_read_packets: Option<String>,
}

impl ProbeStream {
    /// `avg_frame_rate` is the rate frames are actually laid out at;
    /// `r_frame_rate` can be a timebase multiple on variable-rate
    /// recordings, so it only fills in when the average is missing. When
    /// the frame count and the stream duration are both known and disagree
    /// with that rate, the rate is derived from them instead.
    fn metadata(&self, default_fps: f64) -> VideoMetadata {
        let total_frames = [self.nb_frames.as_deref(), self.nb_read_packets.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|count| count.trim().parse::<u64>().ok())
            .unwrap_or(0);
        let duration = self
            .duration
            .as_deref()
            .and_then(|raw| raw.trim().parse::<f64>().ok())
            .filter(|seconds| seconds.is_finite() && *seconds > 0.0);

        let mut frame_rate = self
            .avg_frame_rate
            .as_deref()
            .and_then(parse_rate)
            .or_else(|| self.r_frame_rate.as_deref().and_then(parse_rate));
        if let Some(seconds) = duration.filter(|_| total_frames > 0) {
            let measured = total_frames as f64 / seconds;
            let disagrees = frame_rate.map_or(true, |rate| {
                (total_frames as f64 / rate - seconds).abs() > DURATION_TOLERANCE_SECONDS
            });
            if disagrees {
                warn!(
                    "Probed frame rate {:?} does not match {} frames over {:.3}s; using {:.3} fps",
                    frame_rate, total_frames, seconds, measured
                );
                frame_rate = Some(measured);
            }
        }

        VideoMetadata::new(
            frame_rate,
            default_fps,
            total_frames,
            self.width.unwrap_or(0),
            self.height.unwrap_or(0),
        )
    }
}

fn read_probe(raw: &[u8]) -> Result<ProbeStream> {
    let probe: ProbeOutput = serde_json::from_slice(raw)
        .map_err(|err| unavailable_error(format!("unreadable probe output: {err}")))?;
    probe
        .streams
        .into_iter()
        .next()
        .ok_or_else(|| unavailable_error("no video stream found"))
}

#[cfg(test)]
fn parse_probe(raw: &[u8], default_fps: f64) -> Result<VideoMetadata> {
    Ok(read_probe(raw)?.metadata(default_fps))
}

/// Parse an ffprobe rational such as `30000/1001`.
fn parse_rate(raw: &str) -> Option<f64> {
    let rate = match raw.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => raw.trim().parse().ok()?,
    };
    (rate.is_finite() && rate > 0.0).then_some(rate)
}
