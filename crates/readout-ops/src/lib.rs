//! Operational helpers: logging, result export, debug snapshots.

use readout_types::{config::OpsConfig, ReadoutError, Result};
use tracing_subscriber::{fmt, EnvFilter};

pub mod export;
pub mod snapshots;

pub use export::{render_csv, write_csv, write_json};
pub use snapshots::SnapshotDir;

pub fn init_tracing(config: &OpsConfig) -> Result<()> {
    let filter = EnvFilter::try_new(config.log_level.clone())
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|err| ReadoutError::Ops(format!("failed to create log filter: {err}")))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| ReadoutError::Ops(format!("tracing init error: {err}")))?;
    Ok(())
}

pub fn ops_error(message: impl Into<String>) -> ReadoutError {
    ReadoutError::Ops(message.into())
}
