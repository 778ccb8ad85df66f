//! Loopback transport
//!
//! Runs "remote" commands through the local shell and copies files on the
//! local filesystem. Used for single-host experiments and in tests.

use super::{CopyDirection, RemoteTransport};
use crate::error::{IoResultExt, PipeTuneError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

/// Transport executing everything on this host
#[derive(Debug, Clone)]
pub struct LocalTransport {
    workdir: PathBuf,
}

impl LocalTransport {
    /// Commands run with `workdir` as their working directory
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }
}

#[async_trait]
impl RemoteTransport for LocalTransport {
    fn host(&self) -> &str {
        "localhost"
    }

    async fn exec(&self, command: &str) -> Result<String> {
        tracing::debug!("loopback exec: {}", command);

        let output = Command::new("sh")
            .arg("-c")
            .arg(command)
            .current_dir(&self.workdir)
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| PipeTuneError::remote(self.host(), e.to_string()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(PipeTuneError::remote(
                self.host(),
                format!("'{}' exited with {}: {}", command, output.status, stderr.trim()),
            ));
        }

        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    async fn copy(&self, local: &Path, remote: &Path, direction: CopyDirection) -> Result<()> {
        let (from, to) = match direction {
            CopyDirection::Push => (local, remote),
            CopyDirection::Pull => (remote, local),
        };

        if from == to {
            return Ok(());
        }

        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await.with_path(parent)?;
        }

        tokio::fs::copy(from, to)
            .await
            .map_err(|e| PipeTuneError::remote(self.host(), format!("copy {:?} -> {:?}: {}", from, to, e)))?;

        Ok(())
    }
}
