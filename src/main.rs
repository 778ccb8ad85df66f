//! PipeTune CLI - tuning harness for the data-path pipeline
//!
//! Loads a tunable-parameter file and prints, verifies, diagnoses or tunes it.

use clap::Parser;
use console::style;
use pipetune::config::{parse_timeout, CliArgs, Commands, Config, OutputFormat, TuneArgs};
use pipetune::error::{PipeTuneError, Result};
use pipetune::perf::{diagnose, parse_perf_log_file, sample_index};
use pipetune::progress::ProgressReporter;
use pipetune::remote::{LocalTransport, RemoteTransport, SshOptions, SshTransport};
use pipetune::session::{check_schedulable, SessionOptions, TuningSession};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn main() {
    // Parse CLI arguments
    let args = CliArgs::parse();

    init_logging(args.verbose, args.log_json);

    // Handle result
    if let Err(e) = run(args) {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn init_logging(verbose: u8, json: bool) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }
}

fn run(args: CliArgs) -> Result<()> {
    // init does not need a configuration file
    if let Commands::Init { root, command } = &args.command {
        return cmd_init(root.as_deref(), command.as_deref());
    }

    let path = args
        .config
        .as_ref()
        .ok_or_else(|| PipeTuneError::config("please specify the configuration file via -c"))?;
    let config = Config::load(path)?;

    match &args.command {
        Commands::Print => {
            config.print_summary();
            Ok(())
        }
        Commands::Verify => cmd_verify(&config),
        Commands::Diagnose { log, metrics, format } => cmd_diagnose(&config, log, metrics, *format),
        Commands::Tune(tune) => cmd_tune(config, tune),
        Commands::Init { .. } => Ok(()),
    }
}

fn project_root(root: Option<&Path>) -> PathBuf {
    root.map(Path::to_path_buf)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_default())
}

fn cmd_init(root: Option<&Path>, command: Option<&str>) -> Result<()> {
    let command = match command {
        Some(cmd) => cmd.to_string(),
        None => format!("sudo bash {}", project_root(root).join("scripts/init.sh").display()),
    };

    println!("Initializing PipeTune environment: {}", command);
    let status = std::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .status()
        .map_err(|e| PipeTuneError::process(&command, e.to_string()))?;

    if !status.success() {
        return Err(PipeTuneError::process(command, format!("exited with {}", status)));
    }
    Ok(())
}

fn cmd_verify(config: &Config) -> Result<()> {
    config.validate()?;
    println!(
        "{} {:?}: {} workloads, {} app cores, {} dispatch queues",
        style("✓ Configuration valid").green().bold(),
        config.source_path(),
        config.topology.len(),
        config.topology.total_app_cores(),
        config.topology.total_dispatch_groups()
    );
    Ok(())
}

fn cmd_diagnose(config: &Config, log: &Path, metrics: &Path, format: OutputFormat) -> Result<()> {
    let sample = sample_index(config.server.iteration_count()?);
    let measurement = parse_perf_log_file(log, sample)?;
    let report = std::fs::read_to_string(metrics).map_err(|e| PipeTuneError::io(metrics, e))?;
    let result = diagnose(&measurement, config.server.numa_node()?, &report)?;

    match format {
        OutputFormat::Text => result.print_summary("Local"),
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
    }
    Ok(())
}

fn cmd_tune(config: Config, args: &TuneArgs) -> Result<()> {
    if args.iterations > 0 {
        check_schedulable(&config)?;
    }

    let root = project_root(args.root.as_deref());
    let remote_root = args.remote_root.clone().unwrap_or_else(|| root.clone());
    let mut options = SessionOptions::from_roots(&root, &remote_root);
    if let Some(ref executable) = args.executable {
        options.executable = executable.clone();
        options.remote_executable = executable.clone();
    }
    if let Some(ref telemetry) = args.telemetry {
        options.telemetry = telemetry.clone();
        options.remote_telemetry = telemetry.clone();
    }
    if let Some(ref remote_tuner) = args.remote_tuner {
        options.remote_tuner = remote_tuner.clone();
    }
    if let Some(ref timeout) = args.op_timeout {
        options.op_timeout = Some(parse_timeout(timeout).map_err(PipeTuneError::config)?);
    }
    options.validate_each_iteration = args.verify;
    options.print_each_iteration = args.print;

    if args.verify {
        config.validate()?;
    }
    if args.print {
        config.print_summary();
    }

    let transport: Arc<dyn RemoteTransport> = if args.loopback {
        Arc::new(LocalTransport::new(&remote_root))
    } else {
        let mut ssh = SshOptions::new(
            args.ssh_user.clone().unwrap_or_else(|| "root".to_string()),
            config.address.remote_ip.clone(),
        );
        ssh.port = args.ssh_port;
        ssh.key_path = args.ssh_key.clone();
        Arc::new(SshTransport::new(ssh))
    };

    let local_host = hostname::get()
        .map(|h| h.to_string_lossy().to_string())
        .unwrap_or_else(|_| "unknown".to_string());
    tracing::info!(
        "Tuning {:?} on {} against {} for {} iterations",
        config.source_path(),
        local_host,
        transport.host(),
        args.iterations
    );

    let progress = if args.no_progress || args.iterations == 0 {
        ProgressReporter::disabled()
    } else {
        ProgressReporter::new(u64::from(args.iterations))
    };
    if !console::user_attended_stderr() {
        progress.hide();
    }

    let mut session = TuningSession::new(config, args.iterations, options, transport)?.with_progress(progress);

    // Run async session
    let rt = tokio::runtime::Runtime::new()
        .map_err(|e| PipeTuneError::config(format!("Failed to create runtime: {}", e)))?;
    rt.block_on(session.run())?;

    if let Some(report) = session.last_report() {
        report.local_diagnosis.print_summary("Local");
        report.remote_diagnosis.print_summary("Remote");
    }
    Ok(())
}
