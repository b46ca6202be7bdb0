//! Plain-file exports of a finished report.

use std::{fs, path::Path};

use chrono::{DateTime, Utc};
use readout_types::{
    reading::{ExtractionReport, Series},
    ReadoutError, Result,
};
use serde::Serialize;
use tracing::info;

/// Two-column CSV: `Timestamp (s)` and the value column.
pub fn render_csv(series: &Series, value_label: &str) -> String {
    let mut out = format!("Timestamp (s),{}\n", csv_field(value_label));
    for obs in series {
        out.push_str(&format!("{},{}\n", obs.timestamp, obs.value));
    }
    out
}

pub fn write_csv(path: impl AsRef<Path>, series: &Series, value_label: &str) -> Result<()> {
    let path = path.as_ref();
    fs::write(path, render_csv(series, value_label)).map_err(|err| {
        ReadoutError::Export(format!("failed to write {}: {err}", path.display()))
    })?;
    info!("Wrote {} rows to {}", series.len(), path.display());
    Ok(())
}

#[derive(Serialize)]
struct ReportDocument<'a> {
    generated_at: DateTime<Utc>,
    source: &'a str,
    value_label: &'a str,
    #[serde(flatten)]
    report: &'a ExtractionReport,
}

pub fn write_json(
    path: impl AsRef<Path>,
    source: &str,
    value_label: &str,
    report: &ExtractionReport,
) -> Result<()> {
    let path = path.as_ref();
    let document = ReportDocument {
        generated_at: Utc::now(),
        source,
        value_label,
        report,
    };
    let body = serde_json::to_string_pretty(&document)
        .map_err(|err| ReadoutError::Export(format!("failed to serialize report: {err}")))?;
    fs::write(path, body).map_err(|err| {
        ReadoutError::Export(format!("failed to write {}: {err}", path.display()))
    })?;
    info!("Wrote report to {}", path.display());
    Ok(())
}

fn csv_field(raw: &str) -> String {
    if raw.contains(&[',', '"', '\n'][..]) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}
