//! Shared domain types for the Readout workspace.

pub mod config;
pub mod events;
pub mod reading;
pub mod sample;

mod errors;

pub use errors::{ReadoutError, Result};
