use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use futures::{stream::BoxStream, StreamExt};
use readout_events::BroadcastSink;
use readout_ocr::TesseractEngine;
use readout_ops::{init_tracing, write_csv, write_json};
use readout_pipeline::Pipeline;
use readout_types::{
    config::ReadoutConfig,
    events::{EventPayload, OcrFailed, OcrText, PipelineEvent},
};
use tracing::{info, warn};

mod report;

const DEBUG_CHANNEL_CAPACITY: usize = 256;

/// Read a numeric display off a video at a fixed interval.
#[derive(Debug, Parser)]
#[command(name = "readout-cli", version, about)]
struct Args {
    /// Video file to sample.
    video: PathBuf,

    /// TOML config file. Defaults apply when neither this nor READOUT_CONFIG is set.
    #[arg(long, env = "READOUT_CONFIG")]
    config: Option<PathBuf>,

    /// Seconds between samples.
    #[arg(long)]
    interval: Option<u32>,

    /// Rotate every frame 90 degrees clockwise before OCR.
    #[arg(long, conflicts_with = "no_rotate")]
    rotate: bool,

    #[arg(long)]
    no_rotate: bool,

    /// Print raw OCR text for every frame.
    #[arg(long)]
    debug: bool,

    #[arg(long)]
    csv: Option<PathBuf>,

    #[arg(long)]
    json: Option<PathBuf>,

    /// Save sampled and preprocessed frames into this directory.
    #[arg(long)]
    snapshots: Option<PathBuf>,

    /// Frames preprocessed and recognized concurrently.
    #[arg(long)]
    workers: Option<usize>,

    /// Header of the value column in exports.
    #[arg(long)]
    label: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config = load_config(&args)?;
    init_tracing(&config.ops)?;

    let spec = config.sample_spec()?;
    let engine = TesseractEngine::new(&config.ocr);
    let sink = BroadcastSink::new(DEBUG_CHANNEL_CAPACITY);
    let printer = config
        .ops
        .debug_ocr
        .then(|| tokio::spawn(print_ocr_text(sink.subscribe())));

    let mut pipeline = Pipeline::new(config.pipeline.clone(), engine, sink);
    if let Some(dir) = &config.ops.snapshot_dir {
        pipeline = pipeline.with_snapshots(dir);
    }

    let cancel = pipeline.cancellation_token();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted; finishing with the samples collected so far");
            cancel.cancel();
        }
    });

    let outcome = pipeline
        .run_file(&args.video, &config.source, spec)
        .await;
    interrupt.abort();
    drop(pipeline);
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    let report = outcome.with_context(|| format!("failed to read {}", args.video.display()))?;

    report::print(&report, &config.export.value_label);

    if let Some(path) = &config.export.csv_path {
        write_csv(path, &report.series, &config.export.value_label)?;
    }
    if let Some(path) = &config.export.json_path {
        let source = args.video.display().to_string();
        write_json(path, &source, &config.export.value_label, &report)?;
    }
    info!("Done");
    Ok(())
}

/// Config file (if any), then command line overrides, then validation.
fn load_config(args: &Args) -> Result<ReadoutConfig> {
    let mut config = match &args.config {
        Some(path) => ReadoutConfig::from_file(path)?,
        None => ReadoutConfig::default(),
    };

    if let Some(interval) = args.interval {
        config.sampling.interval_seconds = interval;
    }
    if args.rotate {
        config.sampling.rotate_clockwise_90 = true;
    }
    if args.no_rotate {
        config.sampling.rotate_clockwise_90 = false;
    }
    if args.debug {
        config.ops.debug_ocr = true;
    }
    if let Some(workers) = args.workers {
        config.pipeline.ocr_workers = workers;
    }
    if let Some(dir) = &args.snapshots {
        config.ops.snapshot_dir = Some(path_string(dir));
    }
    if let Some(path) = &args.csv {
        config.export.csv_path = Some(path_string(path));
    }
    if let Some(path) = &args.json {
        config.export.json_path = Some(path_string(path));
    }
    if let Some(label) = &args.label {
        config.export.value_label = label.clone();
    }

    config.validate()?;
    Ok(config)
}

fn path_string(path: &Path) -> String {
    path.to_string_lossy().into_owned()
}

/// Ends once the pipeline, and with it the last sender, is dropped.
async fn print_ocr_text(mut events: BoxStream<'static, PipelineEvent>) {
    while let Some(event) = events.next().await {
        match event.payload {
            EventPayload::OcrText(OcrText { sample_at, regions }) => {
                println!("[ocr {:>4}s] {:?}", sample_at, regions);
            }
            EventPayload::OcrFailed(OcrFailed { sample_at, error }) => {
                println!("[ocr {:>4}s] failed: {}", sample_at, error);
            }
            _ => {}
        }
    }
}
