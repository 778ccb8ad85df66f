//! Command-line settings for PipeTune
//!
//! Defines the CLI arguments and subcommands of the `pipetune` binary.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// PipeTune - experiment orchestration and bottleneck diagnosis for the data path
#[derive(Parser, Debug, Clone)]
#[command(name = "pipetune")]
#[command(author = "PipeTune Team")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Tune a distributed data-path pipeline and diagnose its bottleneck stage")]
#[command(long_about = r#"
PipeTune drives timed experiment runs of the data-path executable on a local
and a remote host, samples host telemetry, parses the periodic perf statistics
and reports which pipeline stage limits throughput.

Examples:
  pipetune -c pipetune.conf print                     # Show tunable knobs
  pipetune -c pipetune.conf verify                    # Check topology invariants
  pipetune -c pipetune.conf tune --iterations 5       # Run five tuning iterations
  pipetune -c pipetune.conf diagnose --log run.log --metrics host.txt
"#)]
pub struct CliArgs {
    /// Path to the configuration file
    #[arg(short = 'c', long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short = 'v', long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Print the tunable parameter values
    #[command(name = "print")]
    Print,

    /// Verify the configuration invariants
    #[command(name = "verify")]
    Verify,

    /// Initialize the host environment (hugepages, drivers, ...)
    #[command(name = "init")]
    Init {
        /// Project root containing scripts/init.sh
        #[arg(long, value_name = "DIR")]
        root: Option<PathBuf>,
        /// Override the bootstrap command
        #[arg(long, value_name = "CMD")]
        command: Option<String>,
    },

    /// Diagnose an existing perf log against a telemetry report
    #[command(name = "diagnose")]
    Diagnose {
        /// Output log of the data-path executable
        #[arg(short = 'd', long, value_name = "PATH")]
        log: PathBuf,
        /// Host telemetry report
        #[arg(short = 'm', long, value_name = "PATH")]
        metrics: PathBuf,
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Run the tuning session
    #[command(name = "tune")]
    Tune(TuneArgs),
}

/// Arguments of the `tune` subcommand
#[derive(Args, Debug, Clone)]
pub struct TuneArgs {
    /// Number of tuning iterations (0 writes back the baseline and exits)
    #[arg(short = 't', long, value_name = "NUM")]
    pub iterations: u32,

    /// Re-validate the configuration after every iteration
    #[arg(long)]
    pub verify: bool,

    /// Print the tunable parameters after every iteration
    #[arg(long)]
    pub print: bool,

    /// Project root (executable under build/, scratch files under tmp/)
    #[arg(long, value_name = "DIR")]
    pub root: Option<PathBuf>,

    /// Data-path command template; `{config}` expands to the written-back config
    #[arg(long, value_name = "CMD")]
    pub executable: Option<String>,

    /// Telemetry command template; `{report}` expands to the report path
    #[arg(long, value_name = "CMD")]
    pub telemetry: Option<String>,

    /// Project root on the remote host (defaults to the local root)
    #[arg(long, value_name = "DIR")]
    pub remote_root: Option<PathBuf>,

    /// Command run on the remote host to write back its configuration
    #[arg(long, value_name = "CMD")]
    pub remote_tuner: Option<String>,

    /// SSH user for the remote host
    #[arg(long, env = "USER", value_name = "USER")]
    pub ssh_user: Option<String>,

    /// SSH port
    #[arg(long, default_value = "22", value_name = "PORT")]
    pub ssh_port: u16,

    /// SSH private key path
    #[arg(long, value_name = "PATH")]
    pub ssh_key: Option<PathBuf>,

    /// Run the "remote" side on this host (no SSH)
    #[arg(long)]
    pub loopback: bool,

    /// Deadline for each background operation (e.g. 90s, 5m)
    #[arg(long, value_name = "DURATION")]
    pub op_timeout: Option<String>,

    /// Hide the iteration progress bar
    #[arg(long)]
    pub no_progress: bool,
}

/// Output format for reports
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON format
    Json,
}

/// Parse a human-readable duration ("90s", "5m")
pub fn parse_timeout(s: &str) -> Result<std::time::Duration, String> {
    humantime::parse_duration(s.trim()).map_err(|e| format!("Invalid duration '{}': {}", s, e))
}
