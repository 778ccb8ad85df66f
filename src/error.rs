//! Error types for PipeTune
//!
//! Every failure in the tuning harness maps onto one of the categories below.
//! Configuration, log parsing and remote transport failures are hard stops;
//! telemetry gaps are handled inside the diagnoser and never surface here.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for PipeTune operations
#[derive(Error, Debug)]
pub enum PipeTuneError {
    /// I/O error while reading or writing a local file
    #[error("I/O error at '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Malformed or invariant-violating configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Grammar violation on a specific line of a configuration file
    #[error("Configuration error at line {line}: {message}")]
    ConfigLine { line: usize, message: String },

    /// Sample point missing or malformed measurement line in a perf log
    #[error("Log parse error: {0}")]
    LogParse(String),

    /// Measurement cannot be diagnosed
    #[error("Diagnosis error: {0}")]
    Diagnose(String),

    /// Remote command or file copy failed
    #[error("Remote transport error on '{host}': {message}")]
    RemoteTransport { host: String, message: String },

    /// Local child process failed to start or exited unsuccessfully
    #[error("Process '{command}' failed: {message}")]
    Process { command: String, message: String },

    /// A background operation exceeded its deadline
    #[error("Operation '{operation}' timed out after {}", humantime::format_duration(*.deadline))]
    Timeout { operation: String, deadline: Duration },

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<PipeTuneError>,
    },
}

impl PipeTuneError {
    /// Create an I/O error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a configuration error tied to a 1-based line number
    pub fn config_line(line: usize, message: impl Into<String>) -> Self {
        Self::ConfigLine {
            line,
            message: message.into(),
        }
    }

    /// Create a log parse error
    pub fn log_parse(message: impl Into<String>) -> Self {
        Self::LogParse(message.into())
    }

    /// Create a remote transport error
    pub fn remote(host: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RemoteTransport {
            host: host.into(),
            message: message.into(),
        }
    }

    /// Create a local process error
    pub fn process(command: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Process {
            command: command.into(),
            message: message.into(),
        }
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Check if this error is a configuration problem (detected before any run)
    pub fn is_config_error(&self) -> bool {
        match self {
            Self::Config(_) | Self::ConfigLine { .. } => true,
            Self::WithContext { source, .. } => source.is_config_error(),
            _ => false,
        }
    }

    /// Get the path associated with this error, if any
    pub fn path(&self) -> Option<&PathBuf> {
        match self {
            Self::Io { path, .. } => Some(path),
            Self::WithContext { source, .. } => source.path(),
            _ => None,
        }
    }
}

/// Result type alias for PipeTune operations
pub type Result<T> = std::result::Result<T, PipeTuneError>;

impl From<std::io::Error> for PipeTuneError {
    fn from(err: std::io::Error) -> Self {
        PipeTuneError::Io {
            path: PathBuf::new(),
            source: err,
        }
    }
}

impl From<serde_json::Error> for PipeTuneError {
    fn from(err: serde_json::Error) -> Self {
        PipeTuneError::Diagnose(format!("report serialization failed: {}", err))
    }
}

/// Extension trait for adding path context to std::io::Result
pub trait IoResultExt<T> {
    /// Add path context to an I/O error
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T>;
}

impl<T> IoResultExt<T> for std::io::Result<T> {
    fn with_path(self, path: impl Into<PathBuf>) -> Result<T> {
        self.map_err(|e| PipeTuneError::io(path, e))
    }
}
