//! Tuning configuration file model
//!
//! Loads, validates and writes back the line-oriented parameter file read by
//! both the tuner and the data-path executable:
//!
//! ```text
//! # comment
//! kAppCoreNum : 4
//! workload : 1 : tx,rx : 8,9 : 2-4|5 : 10|11
//! numa : 0
//! local_mac : 0c:42:a1:00:00:01
//! ```
//!
//! The written-back file uses the same grammar, so `load(write_back(cfg))`
//! always yields the same settings.

use super::params::{TunableParameters, KNOB_PREFIX};
use super::topology::{WorkloadTopology, WORKLOAD_TAG};
use crate::error::{IoResultExt, PipeTuneError, Result};
use console::style;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

/// Suffix appended to the source path to form the write-back path
pub const OUTPUT_SUFFIX: &str = ".out";

/// Server section keys in write-back order
pub const SERVER_KEYS: [&str; 4] = ["numa", "phy_port", "iteration", "duration"];

/// Address section keys in write-back order
pub const ADDRESS_KEYS: [&str; 5] = ["local_ip", "remote_ip", "local_mac", "remote_mac", "device_pcie"];

/// Server settings, stored as the raw strings found in the file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    /// NUMA node the data path runs on
    pub numa: String,
    /// Physical port identifier
    pub phy_port: String,
    /// Number of measurement iterations per run
    pub iteration: String,
    /// Seconds per measurement iteration
    pub duration: String,
}

fn required_int(key: &str, raw: &str) -> Result<u64> {
    if raw.is_empty() {
        return Err(PipeTuneError::config(format!("server setting '{}' is not set", key)));
    }
    raw.parse::<u64>().map_err(|_| {
        PipeTuneError::config(format!("server setting '{}' must be an integer, got '{}'", key, raw))
    })
}

impl ServerSettings {
    fn slot(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "numa" => Some(&mut self.numa),
            "phy_port" => Some(&mut self.phy_port),
            "iteration" => Some(&mut self.iteration),
            "duration" => Some(&mut self.duration),
            _ => None,
        }
    }

    fn values(&self) -> [&str; 4] {
        [&self.numa, &self.phy_port, &self.iteration, &self.duration]
    }

    /// NUMA node id (defaults to 0 when unset)
    pub fn numa_node(&self) -> Result<u32> {
        if self.numa.is_empty() {
            return Ok(0);
        }
        self.numa.parse::<u32>().map_err(|_| {
            PipeTuneError::config(format!("server setting 'numa' must be an integer, got '{}'", self.numa))
        })
    }

    /// Configured iteration count; required for a tuning session
    pub fn iteration_count(&self) -> Result<u64> {
        required_int("iteration", &self.iteration)
    }

    /// Configured per-iteration duration in seconds; required for a tuning session
    pub fn duration_secs(&self) -> Result<u64> {
        required_int("duration", &self.duration)
    }
}

/// Address settings; opaque strings passed through to the executable
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressSettings {
    /// Local IP address
    pub local_ip: String,
    /// Remote IP address (also the remote host for the transport)
    pub remote_ip: String,
    /// Local MAC address
    pub local_mac: String,
    /// Remote MAC address
    pub remote_mac: String,
    /// PCIe identifier of the NIC under test
    pub device_pcie: String,
}

impl AddressSettings {
    fn slot(&mut self, key: &str) -> Option<&mut String> {
        match key {
            "local_ip" => Some(&mut self.local_ip),
            "remote_ip" => Some(&mut self.remote_ip),
            "local_mac" => Some(&mut self.local_mac),
            "remote_mac" => Some(&mut self.remote_mac),
            "device_pcie" => Some(&mut self.device_pcie),
            _ => None,
        }
    }

    fn values(&self) -> [&str; 5] {
        [
            &self.local_ip,
            &self.remote_ip,
            &self.local_mac,
            &self.remote_mac,
            &self.device_pcie,
        ]
    }
}

/// Full configuration loaded from one file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Tunable knobs
    pub params: TunableParameters,
    /// Workload topology
    pub topology: WorkloadTopology,
    /// Server settings
    pub server: ServerSettings,
    /// Address settings
    pub address: AddressSettings,
    source_path: PathBuf,
    output_path: PathBuf,
}

/// Derive the write-back path for a configuration file
pub fn output_path_for(path: &Path) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(OUTPUT_SUFFIX);
    PathBuf::from(os)
}

fn at_line(line: usize, err: PipeTuneError) -> PipeTuneError {
    match err {
        PipeTuneError::Config(message) => PipeTuneError::config_line(line, message),
        other => other,
    }
}

impl Config {
    /// Load a configuration file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).with_path(path)?;
        let config = Self::parse(&text, path)?;
        tracing::debug!(
            "Loaded {:?}: {} workloads, output {:?}",
            path,
            config.topology.len(),
            config.output_path
        );
        Ok(config)
    }

    /// Parse configuration text as if it had been read from `path`
    pub fn parse(text: &str, path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config = Self {
            params: TunableParameters::default(),
            topology: WorkloadTopology::new(),
            server: ServerSettings::default(),
            address: AddressSettings::default(),
            source_path: path.to_path_buf(),
            output_path: output_path_for(path),
        };

        for (idx, raw) in text.lines().enumerate() {
            config.parse_line(raw).map_err(|e| at_line(idx + 1, e))?;
        }

        Ok(config)
    }

    fn parse_line(&mut self, raw: &str) -> Result<()> {
        let line = raw.trim();
        if line.is_empty() || line.starts_with('#') {
            return Ok(());
        }

        let (key, value) = line
            .split_once(':')
            .ok_or_else(|| PipeTuneError::config(format!("missing ':' separator in '{}'", line)))?;
        let key = key.trim();
        let value = value.trim();

        if key == WORKLOAD_TAG {
            self.topology.insert_line(line)?;
            return Ok(());
        }

        // MAC addresses and PCIe ids legitimately contain ':'
        if let Some(slot) = self.address.slot(key) {
            *slot = value.to_string();
            return Ok(());
        }

        if value.contains(':') {
            return Err(PipeTuneError::config(format!(
                "multi-valued line must start with '{}', got '{}'",
                WORKLOAD_TAG, key
            )));
        }

        if key.starts_with(KNOB_PREFIX) {
            return self.params.set_by_name(key, value);
        }

        match self.server.slot(key) {
            Some(slot) => {
                *slot = value.to_string();
                Ok(())
            }
            None => Err(PipeTuneError::config(format!("unknown configuration key '{}'", key))),
        }
    }

    /// Path the configuration was loaded from
    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    /// Path `write_back` writes to
    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    /// Check cross-field invariants; does not modify state
    pub fn validate(&self) -> Result<()> {
        self.topology.validate(&self.params)
    }

    /// Render the full configuration in the load grammar
    pub fn render(&self) -> String {
        let mut out = String::new();

        out.push_str("# -----------------PipeTune Tuner Configuration-----------------\n");
        for (name, value) in self.params.iter() {
            let _ = writeln!(out, "{} : {}", name, value);
        }

        out.push('\n');
        out.push_str("# -----------------PipeTune Datapath Configuration-----------------\n");
        for (id, spec) in self.topology.iter() {
            let _ = writeln!(out, "{}", spec.to_line(*id));
        }

        out.push('\n');
        for (key, value) in SERVER_KEYS.iter().zip(self.server.values()) {
            let _ = writeln!(out, "{} : {}", key, value);
        }

        out.push('\n');
        for (key, value) in ADDRESS_KEYS.iter().zip(self.address.values()) {
            let _ = writeln!(out, "{} : {}", key, value);
        }

        out
    }

    /// Write the configuration to its output path
    pub fn write_back(&self) -> Result<&Path> {
        std::fs::write(&self.output_path, self.render()).with_path(&self.output_path)?;
        tracing::debug!("Wrote configuration to {:?}", self.output_path);
        Ok(&self.output_path)
    }

    /// Load without blocking the async runtime
    pub async fn load_async(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.with_path(path)?;
        Self::parse(&text, path)
    }

    /// `write_back` without blocking the async runtime
    pub async fn write_back_async(&self) -> Result<&Path> {
        tokio::fs::write(&self.output_path, self.render())
            .await
            .with_path(&self.output_path)?;
        tracing::debug!("Wrote configuration to {:?}", self.output_path);
        Ok(&self.output_path)
    }

    /// True when every section matches `other`, ignoring file paths
    pub fn same_settings(&self, other: &Config) -> bool {
        self.params == other.params
            && self.topology == other.topology
            && self.server == other.server
            && self.address == other.address
    }

    /// Print every tunable knob
    pub fn print_summary(&self) {
        println!(
            "{}",
            style("==========Current Tunable Parameter Values:==========").yellow().bold()
        );
        for (name, value) in self.params.iter() {
            println!("{}: {}", name, value);
        }
    }
}
