//! Performance analysis module
//!
//! Parses the data-path perf statistics log, extracts host telemetry and
//! diagnoses the bottleneck stage of a sampled measurement window.

mod diagnose;
mod log;
mod telemetry;

pub use diagnose::*;
pub use log::*;
pub use telemetry::*;
