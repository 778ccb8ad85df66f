//! Tuning session state machine
//!
//! ```text
//! Idle -> RemoteInit -> { Running -> Parsing -> Diagnosing -> Applying } x N -> Done
//!                  \______________________ any error ______________________/-> Failed
//! ```
//!
//! Iterations are strictly sequential. Within an iteration four background
//! operations overlap (local run, remote run, local telemetry, remote
//! telemetry) and parsing starts only after all of them have finished.

use super::ops::{remote_logged_command, spawn_local, spawn_logged, spawn_remote, wait_all};
use super::options::{expand, telemetry_delay, SessionOptions};
use super::policy::{HoldPolicy, IterationReport, TuningPolicy};
use crate::config::Config;
use crate::error::{IoResultExt, PipeTuneError, Result};
use crate::perf::{diagnose, parse_perf_log, sample_index, DiagnosisResult, IterationMeasurement};
use crate::progress::ProgressReporter;
use crate::remote::{CopyDirection, RemoteTransport};
use chrono::Utc;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// Session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed, not started
    Idle,
    /// Exchanging the baseline configuration with the remote peer
    RemoteInit,
    /// Runs and telemetry of iteration `n` in flight
    IterationRunning(u32),
    /// Parsing the perf logs of iteration `n`
    IterationParsing(u32),
    /// Diagnosing iteration `n`
    IterationDiagnosing(u32),
    /// Applying and writing back after iteration `n`
    IterationApplying(u32),
    /// All iterations completed
    Done,
    /// Aborted on the first unrecovered error
    Failed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::RemoteInit => write!(f, "remote init"),
            Self::IterationRunning(i) => write!(f, "iteration {}: running", i),
            Self::IterationParsing(i) => write!(f, "iteration {}: parsing", i),
            Self::IterationDiagnosing(i) => write!(f, "iteration {}: diagnosing", i),
            Self::IterationApplying(i) => write!(f, "iteration {}: applying", i),
            Self::Done => write!(f, "done"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Iterative tuning loop against one remote peer
pub struct TuningSession {
    config: Config,
    remote_config: Option<Config>,
    options: SessionOptions,
    transport: Arc<dyn RemoteTransport>,
    policy: Box<dyn TuningPolicy>,
    progress: ProgressReporter,
    iterations: u32,
    sample_index: usize,
    telemetry_delay: Duration,
    op_timeout: Duration,
    state: SessionState,
    last_report: Option<IterationReport>,
}

impl TuningSession {
    /// Create a session and write the baseline configuration back
    ///
    /// The server `iteration` and `duration` settings are required whenever
    /// `iterations > 0`.
    pub fn new(
        config: Config,
        iterations: u32,
        options: SessionOptions,
        transport: Arc<dyn RemoteTransport>,
    ) -> Result<Self> {
        let (sample, delay, op_timeout) = if iterations > 0 {
            let count = config.server.iteration_count()?;
            let duration = config.server.duration_secs()?;
            (
                sample_index(count),
                telemetry_delay(count, duration),
                options.operation_timeout(count, duration),
            )
        } else {
            (0, Duration::ZERO, options.operation_timeout(0, 0))
        };

        config.write_back()?;

        Ok(Self {
            config,
            remote_config: None,
            options,
            transport,
            policy: Box::new(HoldPolicy),
            progress: ProgressReporter::disabled(),
            iterations,
            sample_index: sample,
            telemetry_delay: delay,
            op_timeout,
            state: SessionState::Idle,
            last_report: None,
        })
    }

    /// Replace the parameter adjustment policy
    pub fn with_policy(mut self, policy: Box<dyn TuningPolicy>) -> Self {
        self.policy = policy;
        self
    }

    /// Attach a progress reporter
    pub fn with_progress(mut self, progress: ProgressReporter) -> Self {
        self.progress = progress;
        self
    }

    /// Current state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Local configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Remote peer configuration, once remote init has run
    pub fn remote_config(&self) -> Option<&Config> {
        self.remote_config.as_ref()
    }

    /// Report of the most recent completed iteration
    pub fn last_report(&self) -> Option<&IterationReport> {
        self.last_report.as_ref()
    }

    /// Perf block sampled from every log
    pub fn sample_index(&self) -> usize {
        self.sample_index
    }

    fn enter(&mut self, state: SessionState) {
        tracing::info!("Session state: {} -> {}", self.state, state);
        self.state = state;
        self.progress.set_state(&state.to_string());
    }

    /// Run remote init and every iteration
    pub async fn run(&mut self) -> Result<()> {
        if self.iterations == 0 {
            self.enter(SessionState::Done);
            return Ok(());
        }

        match self.run_inner().await {
            Ok(()) => {
                self.enter(SessionState::Done);
                let done = format!("{} iterations complete", self.progress.position());
                self.progress.finish_success(&done);
                Ok(())
            }
            Err(e) => {
                tracing::error!("Session failed in {}: {}", self.state, e);
                self.enter(SessionState::Failed);
                self.progress.finish_error(&e.to_string());
                Err(e)
            }
        }
    }

    async fn run_inner(&mut self) -> Result<()> {
        tokio::fs::create_dir_all(&self.options.scratch_dir)
            .await
            .with_path(&self.options.scratch_dir)?;

        self.enter(SessionState::RemoteInit);
        self.init_remote().await?;

        for i in 0..self.iterations {
            self.run_iteration(i).await?;
            self.progress.inc();
        }
        Ok(())
    }

    async fn init_remote(&mut self) -> Result<()> {
        let local = self.config.source_path().to_path_buf();
        let remote_cfg = self.options.remote_config_path(&local);
        let remote_out = self.options.remote_output_path(&local);
        let pulled = self.options.pulled_remote_config(&local);

        if let Some(dir) = remote_cfg.parent() {
            self.transport.exec(&format!("mkdir -p {}", dir.display())).await?;
        }
        self.transport.copy(&local, &remote_cfg, CopyDirection::Push).await?;

        let command = expand(&self.options.remote_tuner, Some(&remote_cfg), None);
        tracing::info!("Initializing remote peer {}: {}", self.transport.host(), command);
        self.transport.exec(&command).await?;

        self.transport.copy(&pulled, &remote_out, CopyDirection::Pull).await?;
        let remote = Config::load_async(&pulled)
            .await
            .map_err(|e| e.with_context(format!("remote configuration from {}", self.transport.host())))?;
        remote.write_back_async().await?;

        tracing::info!(
            "Remote baseline loaded: {} workloads, kAppCoreNum {}",
            remote.topology.len(),
            remote.params.app_core_num()
        );
        self.remote_config = Some(remote);
        Ok(())
    }

    async fn run_iteration(&mut self, i: u32) -> Result<()> {
        let started_at = Utc::now();
        self.enter(SessionState::IterationRunning(i));

        let local_log = self.options.local_log(i);
        let local_report = self.options.local_report(i);
        let remote_log = self.options.remote_log(i);
        let remote_report = self.options.remote_report(i);
        let remote_out = self.options.remote_output_path(self.config.source_path());

        let local_run = spawn_logged(
            "local run",
            expand(&self.options.executable, Some(self.config.output_path()), None),
            &local_log,
            self.op_timeout,
        )?;
        let remote_run = spawn_remote(
            "remote run",
            Arc::clone(&self.transport),
            remote_logged_command(
                &expand(&self.options.remote_executable, Some(&remote_out), None),
                &remote_log,
            ),
            self.op_timeout,
        );

        tokio::time::sleep(self.telemetry_delay).await;

        let local_telemetry = spawn_local(
            "local telemetry",
            expand(&self.options.telemetry, None, Some(&local_report)),
            self.op_timeout,
        );
        let remote_telemetry = spawn_remote(
            "remote telemetry",
            Arc::clone(&self.transport),
            format!(
                "mkdir -p {} && {}",
                self.options.remote_scratch_dir.display(),
                expand(&self.options.remote_telemetry, None, Some(&remote_report))
            ),
            self.op_timeout,
        );

        wait_all(vec![local_run, remote_run, local_telemetry, remote_telemetry]).await?;

        self.enter(SessionState::IterationParsing(i));
        let local = parse_log(&local_log, self.sample_index).await?;
        let pulled_log = self.options.pulled_remote_log(i);
        self.transport.copy(&pulled_log, &remote_log, CopyDirection::Pull).await?;
        let remote = parse_log(&pulled_log, self.sample_index).await?;

        self.enter(SessionState::IterationDiagnosing(i));
        let local_diagnosis = diagnose(&local, self.config.server.numa_node()?, &read_report(&local_report).await)?;

        let pulled_report = self.options.pulled_remote_report(i);
        self.transport.copy(&pulled_report, &remote_report, CopyDirection::Pull).await?;
        let remote_numa = match &self.remote_config {
            Some(remote) => remote.server.numa_node()?,
            None => self.config.server.numa_node()?,
        };
        let remote_diagnosis = diagnose(&remote, remote_numa, &read_report(&pulled_report).await)?;
        log_diagnosis("local", &local_diagnosis);
        log_diagnosis("remote", &remote_diagnosis);

        self.enter(SessionState::IterationApplying(i));
        let report = IterationReport {
            iteration: i,
            started_at,
            finished_at: Utc::now(),
            local,
            remote,
            local_diagnosis,
            remote_diagnosis,
        };

        tracing::debug!("Applying policy '{}'", self.policy.name());
        self.policy.apply(&report, &mut self.config)?;
        self.config.write_back_async().await?;

        if self.options.validate_each_iteration {
            self.config.validate()?;
            tracing::info!("Configuration valid after iteration {}", i);
        }
        if self.options.print_each_iteration {
            self.config.print_summary();
        }

        self.last_report = Some(report);
        Ok(())
    }
}

async fn parse_log(path: &Path, sample: usize) -> Result<IterationMeasurement> {
    let text = tokio::fs::read_to_string(path).await.with_path(path)?;
    parse_perf_log(&text, sample).map_err(|e| e.with_context(format!("parsing {}", path.display())))
}

async fn read_report(path: &Path) -> String {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Telemetry report {:?} unreadable ({}), using defaults", path, e);
            String::new()
        }
    }
}

fn log_diagnosis(side: &str, d: &DiagnosisResult) {
    tracing::info!(
        "{} critical stage {} ({}), completion {:.3}, stall {:.3}, throughput {:.3}",
        side,
        d.stage,
        d.category,
        d.completion,
        d.stall,
        d.throughput
    );
}

impl std::fmt::Debug for TuningSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TuningSession")
            .field("host", &self.transport.host())
            .field("iterations", &self.iterations)
            .field("sample_index", &self.sample_index)
            .field("state", &self.state)
            .finish()
    }
}

/// Fail fast with a config error when `iterations > 0` cannot be scheduled
pub fn check_schedulable(config: &Config) -> Result<()> {
    config.server.iteration_count()?;
    config.server.duration_secs()?;
    if config.address.remote_ip.is_empty() {
        return Err(PipeTuneError::config("remote_ip is required to reach the remote peer"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::{ContentionCategory, PipelineStage};
    use crate::remote::LocalTransport;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    const CONFIG: &str = "\
kAppCoreNum : 3
kDispQueueNum : 2

workload : 1 : tx : 8 : 2-3|4 : 5|6

numa : 0
phy_port : 0
iteration : 2
duration : 0

local_ip : 10.0.0.1
remote_ip : 10.0.0.2
";

    const LOG_BLOCK: &str = "\
DPerf Statistics    Thpl. (Mpps)        Avg. [/P]           Avg. Stall [/P]
------------------------------------------------------------------------
End-to-end          12.500              0.080
app_tx              12.500              0.900               0.300
app_rx              12.400              0.700               0.100
disp_tx             12.500              0.400               0.050
disp_rx             12.400              0.350               0.020
nic_tx              12.500              0.200
nic_rx              12.400              0.000
";

    const REPORT: &str = "\
avg_cpu_util: 40.00%
LLC-load-misses-rate : 0.25
-----Socket 0-----
IO Read Miss Rate : 0.10
IO Write Miss Rate : 0.20
";

    struct Recording(Arc<Mutex<Vec<IterationReport>>>);

    impl TuningPolicy for Recording {
        fn name(&self) -> &str {
            "recording"
        }

        fn apply(&mut self, report: &IterationReport, _config: &mut Config) -> Result<()> {
            self.0.lock().unwrap().push(report.clone());
            Ok(())
        }
    }

    struct Fixture {
        dir: TempDir,
        config_path: PathBuf,
        options: SessionOptions,
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let root = dir.path().join("local");
        let remote_root = dir.path().join("remote");
        std::fs::create_dir_all(root.join("config")).unwrap();

        let config_path = root.join("config/send_config");
        std::fs::write(&config_path, CONFIG).unwrap();
        let log = dir.path().join("fixture.log");
        std::fs::write(&log, format!("{}{}", LOG_BLOCK, LOG_BLOCK)).unwrap();
        let report = dir.path().join("fixture_report.txt");
        std::fs::write(&report, REPORT).unwrap();

        let mut options = SessionOptions::from_roots(&root, &remote_root);
        options.executable = format!("cat {}", log.display());
        options.remote_executable = options.executable.clone();
        options.telemetry = format!("cp {} {{report}}", report.display());
        options.remote_telemetry = options.telemetry.clone();
        options.remote_tuner = "cp {config} {config}.out".to_string();
        options.op_timeout = Some(Duration::from_secs(30));

        Fixture {
            dir,
            config_path,
            options,
        }
    }

    fn transport(f: &Fixture) -> Arc<dyn RemoteTransport> {
        Arc::new(LocalTransport::new(f.dir.path()))
    }

    #[tokio::test]
    async fn test_two_iteration_session() {
        let f = fixture();
        let mut options = f.options.clone();
        options.validate_each_iteration = true;
        let config = Config::load(&f.config_path).unwrap();
        let reports = Arc::new(Mutex::new(Vec::new()));

        let mut session = TuningSession::new(config, 2, options, transport(&f))
            .unwrap()
            .with_policy(Box::new(Recording(Arc::clone(&reports))));
        assert_eq!(session.state(), SessionState::Idle);
        assert_eq!(session.sample_index(), 1);

        session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Done);

        let reports = reports.lock().unwrap();
        assert_eq!(reports.len(), 2);
        for (i, report) in reports.iter().enumerate() {
            assert_eq!(report.iteration, i as u32);
            assert_eq!(report.local_diagnosis.stage, PipelineStage::AppTx);
            assert_eq!(report.local_diagnosis.category, ContentionCategory::ComputeOrIoDominated);
            assert_eq!(report.local_diagnosis.telemetry.io_read_miss_rate, 0.10);
            assert_eq!(report.remote_diagnosis, report.local_diagnosis);
            assert_eq!(report.local.throughput, 12.5);
        }
        assert_eq!(reports[0].local_diagnosis, reports[1].local_diagnosis);

        let remote = session.remote_config().unwrap();
        assert!(remote.same_settings(session.config()));
        assert!(session.config().output_path().exists());
        assert!(f.options.local_log(1).exists());
        assert!(session.last_report().is_some());
    }

    #[tokio::test]
    async fn test_zero_iterations_writes_baseline_only() {
        let f = fixture();
        let config = Config::load(&f.config_path).unwrap();
        let out = config.output_path().to_path_buf();

        let mut session = TuningSession::new(config, 0, f.options.clone(), transport(&f)).unwrap();
        assert!(out.exists());

        session.run().await.unwrap();
        assert_eq!(session.state(), SessionState::Done);
        assert!(session.remote_config().is_none());
        assert!(!f.options.remote_config_path(&f.config_path).exists());
    }

    #[tokio::test]
    async fn test_remote_init_failure_runs_no_iteration() {
        let f = fixture();
        let mut options = f.options.clone();
        options.remote_tuner = "exit 1".to_string();
        let config = Config::load(&f.config_path).unwrap();

        let mut session = TuningSession::new(config, 2, options, transport(&f)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, PipeTuneError::RemoteTransport { .. }));
        assert_eq!(session.state(), SessionState::Failed);
        assert!(!f.options.local_log(0).exists());
    }

    #[tokio::test]
    async fn test_missing_sample_fails_session() {
        let f = fixture();
        let mut options = f.options.clone();
        options.executable = "echo no statistics here".to_string();
        let config = Config::load(&f.config_path).unwrap();

        let mut session = TuningSession::new(config, 2, options, transport(&f)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(err.to_string().contains("sample iteration not found"));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_hung_run_times_out() {
        let f = fixture();
        let mut options = f.options.clone();
        options.remote_executable = "sleep 5".to_string();
        options.op_timeout = Some(Duration::from_millis(200));
        let config = Config::load(&f.config_path).unwrap();

        let mut session = TuningSession::new(config, 1, options, transport(&f)).unwrap();
        let err = session.run().await.unwrap_err();

        assert!(matches!(err, PipeTuneError::Timeout { .. }));
        assert_eq!(session.state(), SessionState::Failed);
    }

    #[tokio::test]
    async fn test_telemetry_starts_after_delay() {
        let f = fixture();
        std::fs::write(&f.config_path, CONFIG.replace("duration : 0", "duration : 1")).unwrap();
        let order = f.dir.path().join("order");
        let log = f.dir.path().join("fixture.log");
        let report = f.dir.path().join("fixture_report.txt");

        let run = |marker: &Path| format!("sleep 0.5 && touch {} && cat {}", marker.display(), log.display());
        let telemetry = |marker: &Path| {
            format!(
                "if [ -e {m} ]; then echo after >> {o}; else echo before >> {o}; fi; rm -f {m}; cp {r} {{report}}",
                m = marker.display(),
                o = order.display(),
                r = report.display()
            )
        };
        let local_marker = f.dir.path().join("local_running");
        let remote_marker = f.dir.path().join("remote_running");

        let mut options = f.options.clone();
        options.executable = run(&local_marker);
        options.remote_executable = run(&remote_marker);
        options.telemetry = telemetry(&local_marker);
        options.remote_telemetry = telemetry(&remote_marker);
        let config = Config::load(&f.config_path).unwrap();

        let mut session = TuningSession::new(config, 2, options, transport(&f)).unwrap();
        let start = std::time::Instant::now();
        session.run().await.unwrap();

        // 2 iterations x 1 s run length, half of it waited per iteration
        assert!(start.elapsed() >= Duration::from_secs(2));
        let lines: Vec<String> = std::fs::read_to_string(&order)
            .unwrap()
            .lines()
            .map(str::to_string)
            .collect();
        assert_eq!(lines, vec!["after"; 4]);
        assert_eq!(session.state(), SessionState::Done);
    }

    #[test]
    fn test_requires_iteration_and_duration() {
        let f = fixture();
        let text = CONFIG.replace("iteration : 2\n", "");
        let config = Config::parse(&text, &f.config_path).unwrap();
        let err = TuningSession::new(config.clone(), 1, f.options.clone(), transport(&f)).unwrap_err();
        assert!(err.is_config_error());
        assert!(check_schedulable(&config).is_err());

        let ok = Config::parse(CONFIG, &f.config_path).unwrap();
        assert!(check_schedulable(&ok).is_ok());
    }
}
