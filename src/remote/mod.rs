//! Remote execution transport
//!
//! The tuning session needs exactly two things from the remote host:
//! run a shell command, and copy a file in either direction.
//!
//! | Transport | Mechanism | Use Case |
//! |-----------|-----------|----------|
//! | `SshTransport` | OpenSSH `ssh` / `scp` | Real remote peer |
//! | `LocalTransport` | `sh -c` / file copy | Loopback runs and tests |

mod local;
mod ssh;

pub use local::*;
pub use ssh::*;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Direction of a file copy relative to the local host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    /// Local file to remote path
    Push,
    /// Remote file to local path
    Pull,
}

/// Command execution and file copy on the remote host
#[async_trait]
pub trait RemoteTransport: Send + Sync {
    /// Host name used in logs and errors
    fn host(&self) -> &str;

    /// Run a shell command on the remote host, returning its stdout
    async fn exec(&self, command: &str) -> Result<String>;

    /// Copy a file between `local` and `remote`
    async fn copy(&self, local: &Path, remote: &Path, direction: CopyDirection) -> Result<()>;
}
