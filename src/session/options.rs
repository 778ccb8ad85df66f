//! Tuning session options
//!
//! Paths and command templates for one session. Command templates are shell
//! strings; `{config}` expands to a configuration path and `{report}` to a
//! telemetry report path.

use crate::config::output_path_for;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Placeholder for a configuration path in command templates
pub const CONFIG_PLACEHOLDER: &str = "{config}";

/// Placeholder for a telemetry report path in command templates
pub const REPORT_PLACEHOLDER: &str = "{report}";

/// Slack added to the derived operation timeout
const TIMEOUT_SLACK_SECS: u64 = 60;

/// Expand `{config}` / `{report}` in a command template
pub fn expand(template: &str, config: Option<&Path>, report: Option<&Path>) -> String {
    let mut out = template.to_string();
    if let Some(config) = config {
        out = out.replace(CONFIG_PLACEHOLDER, &config.to_string_lossy());
    }
    if let Some(report) = report {
        out = out.replace(REPORT_PLACEHOLDER, &report.to_string_lossy());
    }
    out
}

/// Paths and commands used by a tuning session
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Local scratch directory for logs and reports
    pub scratch_dir: PathBuf,
    /// Scratch directory on the remote host
    pub remote_scratch_dir: PathBuf,
    /// Directory on the remote host receiving the pushed configuration
    pub remote_config_dir: PathBuf,
    /// Local data-path command template
    pub executable: String,
    /// Remote data-path command template
    pub remote_executable: String,
    /// Local telemetry command template
    pub telemetry: String,
    /// Remote telemetry command template
    pub remote_telemetry: String,
    /// Remote command that loads `{config}` and writes back `{config}.out`
    pub remote_tuner: String,
    /// Deadline per background operation (None derives it from the run length)
    pub op_timeout: Option<Duration>,
    /// Validate the configuration after every write-back
    pub validate_each_iteration: bool,
    /// Print the tunable parameters after every write-back
    pub print_each_iteration: bool,
}

impl SessionOptions {
    /// Standard layout under a local and a remote project root
    pub fn from_roots(root: &Path, remote_root: &Path) -> Self {
        Self {
            scratch_dir: root.join("tmp"),
            remote_scratch_dir: remote_root.join("tmp"),
            remote_config_dir: remote_root.join("config"),
            executable: format!("sudo {}", root.join("build/pipetune").display()),
            remote_executable: format!("sudo {}", remote_root.join("build/pipetune").display()),
            telemetry: format!(
                "sudo bash {} {}",
                root.join("scripts/host-metric/collect.sh").display(),
                REPORT_PLACEHOLDER
            ),
            remote_telemetry: format!(
                "sudo bash {} {}",
                remote_root.join("scripts/host-metric/collect.sh").display(),
                REPORT_PLACEHOLDER
            ),
            remote_tuner: format!(
                "cd {} && pipetune --config {} tune --iterations 0",
                remote_root.display(),
                CONFIG_PLACEHOLDER
            ),
            op_timeout: None,
            validate_each_iteration: false,
            print_each_iteration: false,
        }
    }

    /// Local perf log of iteration `i`
    pub fn local_log(&self, i: u32) -> PathBuf {
        self.scratch_dir.join(format!("pipetune_iter_{}.log", i))
    }

    /// Local telemetry report of iteration `i`
    pub fn local_report(&self, i: u32) -> PathBuf {
        self.scratch_dir.join(format!("host_metric_iter_{}.txt", i))
    }

    /// Perf log of iteration `i` on the remote host
    pub fn remote_log(&self, i: u32) -> PathBuf {
        self.remote_scratch_dir.join(format!("pipetune_iter_{}.log", i))
    }

    /// Telemetry report of iteration `i` on the remote host
    pub fn remote_report(&self, i: u32) -> PathBuf {
        self.remote_scratch_dir.join(format!("host_metric_iter_{}.txt", i))
    }

    /// Local copy of the remote perf log of iteration `i`
    pub fn pulled_remote_log(&self, i: u32) -> PathBuf {
        self.scratch_dir.join(format!("remote_pipetune_iter_{}.log", i))
    }

    /// Local copy of the remote telemetry report of iteration `i`
    pub fn pulled_remote_report(&self, i: u32) -> PathBuf {
        self.scratch_dir.join(format!("remote_host_metric_iter_{}.txt", i))
    }

    /// Where the local configuration is pushed on the remote host
    pub fn remote_config_path(&self, local_config: &Path) -> PathBuf {
        let name = local_config
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "pipetune.conf".into());
        self.remote_config_dir.join(name)
    }

    /// Local copy of the remote peer's written-back configuration
    pub fn pulled_remote_config(&self, local_config: &Path) -> PathBuf {
        let name = local_config
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "pipetune.conf".to_string());
        self.scratch_dir.join(format!("remote_{}", name))
    }

    /// Write-back path the remote peer produces for a pushed configuration
    pub fn remote_output_path(&self, local_config: &Path) -> PathBuf {
        output_path_for(&self.remote_config_path(local_config))
    }

    /// Deadline for each background operation of a run
    pub fn operation_timeout(&self, iteration: u64, duration_secs: u64) -> Duration {
        self.op_timeout.unwrap_or_else(|| {
            Duration::from_secs(
                iteration
                    .saturating_mul(duration_secs)
                    .saturating_mul(2)
                    .saturating_add(TIMEOUT_SLACK_SECS),
            )
        })
    }
}

/// Delay before telemetry starts: half of the configured run length
pub fn telemetry_delay(iteration: u64, duration_secs: u64) -> Duration {
    Duration::from_millis(iteration.saturating_mul(duration_secs).saturating_mul(500))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_placeholders() {
        let cmd = expand(
            "collect {report} --cfg {config}",
            Some(Path::new("/c.out")),
            Some(Path::new("/r.txt")),
        );
        assert_eq!(cmd, "collect /r.txt --cfg /c.out");
        assert_eq!(expand("run {config}", None, None), "run {config}");
    }

    #[test]
    fn test_iteration_scoped_paths() {
        let opts = SessionOptions::from_roots(Path::new("/pt"), Path::new("/peer"));
        assert_eq!(opts.local_log(3), PathBuf::from("/pt/tmp/pipetune_iter_3.log"));
        assert_eq!(opts.remote_log(3), PathBuf::from("/peer/tmp/pipetune_iter_3.log"));
        assert_ne!(opts.pulled_remote_log(3), opts.local_log(3));
        assert_ne!(opts.local_report(0), opts.local_report(1));
        assert_eq!(opts.executable, "sudo /pt/build/pipetune");
    }

    #[test]
    fn test_remote_config_paths() {
        let opts = SessionOptions::from_roots(Path::new("/pt"), Path::new("/peer"));
        let local = Path::new("/pt/config/send_config");
        assert_eq!(opts.remote_config_path(local), PathBuf::from("/peer/config/send_config"));
        assert_eq!(opts.remote_output_path(local), PathBuf::from("/peer/config/send_config.out"));
        assert_eq!(opts.pulled_remote_config(local), PathBuf::from("/pt/tmp/remote_send_config"));
    }

    #[test]
    fn test_timing() {
        let mut opts = SessionOptions::from_roots(Path::new("/a"), Path::new("/b"));
        assert_eq!(telemetry_delay(10, 3), Duration::from_secs(15));
        assert_eq!(telemetry_delay(3, 1), Duration::from_millis(1500));
        assert_eq!(opts.operation_timeout(10, 3), Duration::from_secs(120));
        assert_eq!(opts.operation_timeout(u64::MAX / 2, 1), Duration::from_secs(u64::MAX));
        assert_eq!(opts.operation_timeout(u64::MAX, u64::MAX), Duration::from_secs(u64::MAX));
        assert_eq!(telemetry_delay(u64::MAX, 2), Duration::from_millis(u64::MAX));
        opts.op_timeout = Some(Duration::from_secs(5));
        assert_eq!(opts.operation_timeout(10, 3), Duration::from_secs(5));
    }
}
