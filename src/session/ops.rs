//! Background operations of one iteration
//!
//! Each operation runs as a spawned task bounded by its own deadline. A
//! timed-out local child is killed when its handle is dropped.

use crate::error::{PipeTuneError, Result};
use crate::remote::RemoteTransport;
use futures::future::join_all;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;
use tokio::task::JoinHandle;

/// A spawned background operation
pub struct BackgroundOp {
    name: String,
    handle: JoinHandle<Result<()>>,
}

impl BackgroundOp {
    /// Operation name used in logs and errors
    pub fn name(&self) -> &str {
        &self.name
    }

    fn spawn<F>(name: &str, deadline: Duration, fut: F) -> Self
    where
        F: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let op = name.to_string();
        let handle = tokio::spawn(async move {
            match tokio::time::timeout(deadline, fut).await {
                Ok(result) => result,
                Err(_) => Err(PipeTuneError::Timeout { operation: op, deadline }),
            }
        });

        Self {
            name: name.to_string(),
            handle,
        }
    }
}

fn shell(command: &str) -> Command {
    let mut cmd = Command::new("sh");
    cmd.arg("-c").arg(command).stdin(Stdio::null()).kill_on_drop(true);
    cmd
}

async fn wait_child(mut cmd: Command, command: String) -> Result<()> {
    let status = cmd
        .spawn()
        .map_err(|e| PipeTuneError::process(&command, e.to_string()))?
        .wait()
        .await
        .map_err(|e| PipeTuneError::process(&command, e.to_string()))?;

    if status.success() {
        Ok(())
    } else {
        Err(PipeTuneError::process(command, format!("exited with {}", status)))
    }
}

/// Start a local command with stdout redirected to a fresh `log` file
pub fn spawn_logged(name: &str, command: String, log: &Path, deadline: Duration) -> Result<BackgroundOp> {
    let file = std::fs::File::create(log).map_err(|e| PipeTuneError::io(log, e))?;
    let mut cmd = shell(&command);
    cmd.stdout(Stdio::from(file));

    tracing::debug!("{}: {} > {:?}", name, command, log);
    Ok(BackgroundOp::spawn(name, deadline, wait_child(cmd, command)))
}

/// Start a local command whose output is discarded
pub fn spawn_local(name: &str, command: String, deadline: Duration) -> BackgroundOp {
    let mut cmd = shell(&command);
    cmd.stdout(Stdio::null());

    tracing::debug!("{}: {}", name, command);
    BackgroundOp::spawn(name, deadline, wait_child(cmd, command))
}

/// Run a command on the remote host
pub fn spawn_remote(
    name: &str,
    transport: Arc<dyn RemoteTransport>,
    command: String,
    deadline: Duration,
) -> BackgroundOp {
    tracing::debug!("{} on {}: {}", name, transport.host(), command);
    BackgroundOp::spawn(name, deadline, async move {
        transport.exec(&command).await.map(|_| ())
    })
}

/// Remote command writing its stdout to a fresh `log` on the remote host
pub fn remote_logged_command(command: &str, log: &Path) -> String {
    let dir = log.parent().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    format!(
        "mkdir -p {dir} && : > {log} && {command} > {log}",
        dir = dir.display(),
        log = log.display(),
        command = command
    )
}

/// Wait for every operation; the first failure is returned after all complete
pub async fn wait_all(ops: Vec<BackgroundOp>) -> Result<()> {
    let (names, handles): (Vec<String>, Vec<_>) = ops.into_iter().map(|op| (op.name, op.handle)).unzip();
    let results = join_all(handles).await;

    let mut first_error = None;
    for (name, joined) in names.into_iter().zip(results) {
        let result = match joined {
            Ok(result) => result,
            Err(e) => Err(PipeTuneError::process(&name, format!("task join error: {}", e))),
        };

        match result {
            Ok(()) => tracing::debug!("{} completed", name),
            Err(e) => {
                tracing::warn!("{} failed: {}", name, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::LocalTransport;
    use tempfile::TempDir;

    const LONG: Duration = Duration::from_secs(30);

    #[tokio::test]
    async fn test_logged_output_replaces_previous_contents() {
        let dir = TempDir::new().unwrap();
        let log = dir.path().join("run.log");
        std::fs::write(&log, "stale line from an earlier run\n").unwrap();

        let op = spawn_logged("local run", "echo fresh".to_string(), &log, LONG).unwrap();
        wait_all(vec![op]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "fresh\n");
    }

    #[tokio::test]
    async fn test_waits_for_all_before_reporting_failure() {
        let dir = TempDir::new().unwrap();
        let marker = dir.path().join("done");
        let ops = vec![
            spawn_local("failing", "exit 4".to_string(), LONG),
            spawn_local("slow", format!("sleep 0.2 && touch {}", marker.display()), LONG),
        ];

        let err = wait_all(ops).await.unwrap_err();
        assert!(matches!(err, PipeTuneError::Process { .. }));
        assert!(marker.exists());
    }

    #[tokio::test]
    async fn test_timeout() {
        let op = spawn_local("stuck", "sleep 5".to_string(), Duration::from_millis(100));
        assert_eq!(op.name(), "stuck");
        let err = wait_all(vec![op]).await.unwrap_err();
        assert!(matches!(err, PipeTuneError::Timeout { .. }));
        assert_eq!(err.to_string(), "Operation 'stuck' timed out after 100ms");
    }

    #[tokio::test]
    async fn test_remote_logged_command() {
        let dir = TempDir::new().unwrap();
        let transport: Arc<dyn RemoteTransport> = Arc::new(LocalTransport::new(dir.path()));
        let log = dir.path().join("peer/tmp/run.log");

        let cmd = remote_logged_command("echo remote", &log);
        wait_all(vec![spawn_remote("remote run", transport, cmd, LONG)]).await.unwrap();

        assert_eq!(std::fs::read_to_string(&log).unwrap(), "remote\n");
    }
}
