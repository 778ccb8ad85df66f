//! OpenSSH transport
//!
//! Shells out to `ssh` and `scp`. When a control path is configured all
//! invocations multiplex over one master connection, which keeps the many
//! short copy/exec calls of a tuning session cheap.

use super::{CopyDirection, RemoteTransport};
use crate::error::{PipeTuneError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Connection options for the OpenSSH client
#[derive(Debug, Clone)]
pub struct SshOptions {
    /// Remote user
    pub user: String,
    /// Remote host name or IP
    pub host: String,
    /// SSH port
    pub port: u16,
    /// Private key path
    pub key_path: Option<PathBuf>,
    /// ControlMaster socket path (None disables multiplexing)
    pub control_path: Option<PathBuf>,
    /// ControlPersist timeout in seconds
    pub control_persist: u32,
    /// Connect timeout in seconds
    pub connect_timeout: u32,
    /// Batch mode (disable password prompts)
    pub batch_mode: bool,
    /// Strict host key checking
    pub strict_host_key_checking: bool,
    /// ssh client binary
    pub ssh_program: PathBuf,
    /// scp client binary
    pub scp_program: PathBuf,
}

impl SshOptions {
    /// Options for `user@host` with defaults suited to unattended runs
    pub fn new(user: impl Into<String>, host: impl Into<String>) -> Self {
        let user = user.into();
        let host = host.into();
        let control_path = std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".ssh")
                .join(format!("pipetune-{}@{}", user, host))
        });

        Self {
            user,
            host,
            port: 22,
            key_path: None,
            control_path,
            control_persist: 600,
            connect_timeout: 10,
            batch_mode: true,
            strict_host_key_checking: true,
            ssh_program: PathBuf::from("ssh"),
            scp_program: PathBuf::from("scp"),
        }
    }

    /// `user@host`
    pub fn destination(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    /// Options shared by ssh and scp; `port_flag` is `-p` for ssh, `-P` for scp
    pub fn common_args(&self, port_flag: &str) -> Vec<String> {
        let mut args = vec![
            port_flag.to_string(),
            self.port.to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout),
        ];

        if let Some(ref control_path) = self.control_path {
            args.push("-o".to_string());
            args.push("ControlMaster=auto".to_string());
            args.push("-o".to_string());
            args.push(format!("ControlPath={}", control_path.display()));
            args.push("-o".to_string());
            args.push(format!("ControlPersist={}", self.control_persist));
        }

        if self.batch_mode {
            args.push("-o".to_string());
            args.push("BatchMode=yes".to_string());
        }

        if !self.strict_host_key_checking {
            args.push("-o".to_string());
            args.push("StrictHostKeyChecking=no".to_string());
            args.push("-o".to_string());
            args.push("UserKnownHostsFile=/dev/null".to_string());
        }

        if let Some(ref key_path) = self.key_path {
            args.push("-i".to_string());
            args.push(key_path.to_string_lossy().to_string());
        }

        args
    }
}

/// Remote transport over the OpenSSH command-line client
pub struct SshTransport {
    options: SshOptions,
}

impl SshTransport {
    /// Create a transport
    pub fn new(options: SshOptions) -> Self {
        Self { options }
    }

    /// Connection options
    pub fn options(&self) -> &SshOptions {
        &self.options
    }

    async fn run(&self, mut cmd: Command, what: &str) -> Result<String> {
        // a timed-out exec or copy must not leave the client running
        let output = cmd
            .kill_on_drop(true)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| PipeTuneError::remote(&self.options.host, format!("{}: {}", what, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipeTuneError::remote(
                &self.options.host,
                format!("{} exited with {}: {}", what, output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

#[async_trait]
impl RemoteTransport for SshTransport {
    fn host(&self) -> &str {
        &self.options.host
    }

    async fn exec(&self, command: &str) -> Result<String> {
        tracing::debug!("ssh {}: {}", self.options.destination(), command);

        let mut cmd = Command::new(&self.options.ssh_program);
        cmd.args(self.options.common_args("-p"))
            .arg(self.options.destination())
            .arg(command);

        self.run(cmd, "ssh").await
    }

    async fn copy(&self, local: &Path, remote: &Path, direction: CopyDirection) -> Result<()> {
        let remote_spec = format!("{}:{}", self.options.destination(), remote.display());
        let local_spec = local.to_string_lossy().to_string();
        let (from, to) = match direction {
            CopyDirection::Push => (local_spec, remote_spec),
            CopyDirection::Pull => (remote_spec, local_spec),
        };

        tracing::debug!("scp {} -> {}", from, to);

        let mut cmd = Command::new(&self.options.scp_program);
        cmd.args(self.options.common_args("-P")).arg("-q").arg(&from).arg(&to);

        self.run(cmd, "scp").await.map(|_| ())
    }
}
