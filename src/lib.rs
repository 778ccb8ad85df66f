//! # PipeTune - Experiment Orchestration for Data-Path Pipelines
//!
//! PipeTune drives repeated timed runs of a multi-stage packet-processing
//! executable on a local and a remote host, samples host telemetry, parses
//! the periodic perf statistics and reports which pipeline stage limits
//! throughput.
//!
//! ## Features
//!
//! - **Configuration Model**: Typed knobs and a validated workload topology,
//!   loaded from and written back to the same line-oriented grammar
//! - **Tuning Session**: Sequential iterations of overlapped local/remote
//!   runs with per-operation deadlines
//! - **Perf Log Parser**: Extracts the steady-state sample block
//! - **Bottleneck Diagnosis**: Critical stage plus a contention category
//! - **Remote Transports**: OpenSSH with connection multiplexing, or loopback
//!
//! ## Quick Start
//!
//! ```no_run
//! use pipetune::config::Config;
//!
//! let config = Config::load("config/send_config").unwrap();
//! config.validate().unwrap();
//! config.print_summary();
//! ```
//!
//! ## Tuning Session
//!
//! ```no_run
//! use pipetune::prelude::*;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn run() -> pipetune::Result<()> {
//! let config = Config::load("config/send_config")?;
//! let options = SessionOptions::from_roots(Path::new("/opt/pipetune"), Path::new("/opt/pipetune"));
//! let transport = Arc::new(SshTransport::new(SshOptions::new("tuner", "10.0.0.2")));
//!
//! let mut session = TuningSession::new(config, 5, options, transport)?;
//! session.run().await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Manual Diagnosis
//!
//! ```no_run
//! use pipetune::perf::{diagnose, parse_perf_log_file, sample_index};
//! use std::path::Path;
//!
//! let m = parse_perf_log_file(Path::new("tmp/pipetune_iter_0.log"), sample_index(10)).unwrap();
//! let report = std::fs::read_to_string("tmp/host_metric_iter_0.txt").unwrap();
//! let result = diagnose(&m, 0, &report).unwrap();
//! result.print_summary("Local");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod perf;
pub mod progress;
pub mod remote;
pub mod session;

// Re-export commonly used types
pub use config::Config;
pub use error::{PipeTuneError, Result};
pub use progress::ProgressReporter;
pub use session::{SessionOptions, TuningSession};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Prelude module for convenient imports
pub mod prelude {
    //! Convenient re-exports for common usage
    //!
    //! ```no_run
    //! use pipetune::prelude::*;
    //! ```

    pub use crate::config::{Config, Knob, TunableParameters, WorkloadTopology};
    pub use crate::error::{PipeTuneError, Result};
    pub use crate::perf::{diagnose, parse_perf_log, ContentionCategory, DiagnosisResult, IterationMeasurement};
    pub use crate::progress::ProgressReporter;
    pub use crate::remote::{LocalTransport, RemoteTransport, SshOptions, SshTransport};
    pub use crate::session::{HoldPolicy, IterationReport, SessionOptions, TuningPolicy, TuningSession};
}
