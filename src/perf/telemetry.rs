//! Host telemetry report extraction
//!
//! Reads the handful of fields the diagnoser uses from the collector's
//! report. Socket-scoped IO miss rates are only taken from the section of
//! the configured NUMA node; LLC miss rates and CPU utilisation are global.
//! Missing or malformed fields default to zero.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const SOCKET_TAG: &str = "Socket";
const IO_READ_MISS: &str = "IO Read Miss Rate";
const IO_WRITE_MISS: &str = "IO Write Miss Rate";
const LLC_LOAD_MISS: &str = "LLC-load-misses-rate";
const LLC_STORE_MISS: &str = "LLC-store-misses-rate";
const AVG_CPU_UTIL: &str = "avg_cpu_util";
const CORE_TAG: &str = "core";

/// Fields extracted from a telemetry report
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TelemetryReport {
    /// IO read miss rate on the configured socket
    pub io_read_miss_rate: f64,
    /// IO write miss rate on the configured socket
    pub io_write_miss_rate: f64,
    /// LLC load miss rate
    pub llc_load_miss_rate: f64,
    /// LLC store miss rate
    pub llc_store_miss_rate: f64,
    /// Average CPU utilisation in percent
    pub avg_cpu_util: f64,
    /// Per-core utilisation in percent
    pub core_util: BTreeMap<u32, f64>,
}

/// Socket id named by a section header such as `------Socket 1------`
fn socket_header(line: &str) -> Option<u32> {
    let rest = &line[line.find(SOCKET_TAG)? + SOCKET_TAG.len()..];
    let digits: String = rest
        .trim_start()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    digits.parse().ok()
}

fn value_after_colon(line: &str, name: &str) -> f64 {
    let raw = line.split(':').nth(1).map(str::trim).unwrap_or("");
    match raw.trim_end_matches('%').trim().parse::<f64>() {
        Ok(v) => v,
        Err(_) => {
            tracing::warn!("Telemetry field '{}' is malformed ('{}'), using 0", name, raw);
            0.0
        }
    }
}

impl TelemetryReport {
    /// Extract the report fields for `numa_node`
    pub fn parse(text: &str, numa_node: u32) -> Self {
        let mut report = Self::default();
        let mut in_socket = false;

        for line in text.lines() {
            if let Some(socket) = socket_header(line) {
                in_socket = socket == numa_node;
                continue;
            }

            if line.contains(IO_READ_MISS) {
                if in_socket {
                    report.io_read_miss_rate = value_after_colon(line, IO_READ_MISS);
                }
            } else if line.contains(IO_WRITE_MISS) {
                if in_socket {
                    report.io_write_miss_rate = value_after_colon(line, IO_WRITE_MISS);
                }
            } else if line.contains(LLC_LOAD_MISS) {
                report.llc_load_miss_rate = value_after_colon(line, LLC_LOAD_MISS);
            } else if line.contains(LLC_STORE_MISS) {
                report.llc_store_miss_rate = value_after_colon(line, LLC_STORE_MISS);
            } else if line.contains(AVG_CPU_UTIL) {
                report.avg_cpu_util = value_after_colon(line, AVG_CPU_UTIL);
            } else if let Some(rest) = line.trim_start().strip_prefix(CORE_TAG) {
                let core = rest.split(':').next().map(str::trim).and_then(|c| c.parse::<u32>().ok());
                if let Some(core) = core {
                    report.core_util.insert(core, value_after_colon(line, CORE_TAG));
                }
            }
        }

        if report == Self::default() {
            tracing::warn!("Telemetry report has none of the expected fields; diagnosing with zeros");
        }

        report
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) const REPORT: &str = "\
core 2 : 97.50%
core 3 : 12.25%
avg_cpu_util: 54.88%
LLC-load-misses-rate : 0.31
LLC-store-misses-rate : 0.07
------Socket 0------
IO Read Miss Rate : 0.10
IO Write Miss Rate : 0.20
------Socket 1------
IO Read Miss Rate : 0.45
IO Write Miss Rate : 0.55
";

    #[test]
    fn test_socket_scoping() {
        let r0 = TelemetryReport::parse(REPORT, 0);
        assert_eq!(r0.io_read_miss_rate, 0.10);
        assert_eq!(r0.io_write_miss_rate, 0.20);

        let r1 = TelemetryReport::parse(REPORT, 1);
        assert_eq!(r1.io_read_miss_rate, 0.45);
        assert_eq!(r1.io_write_miss_rate, 0.55);
        assert_eq!(r1.llc_load_miss_rate, 0.31);
        assert_eq!(r1.llc_store_miss_rate, 0.07);
    }

    #[test]
    fn test_cpu_utilisation() {
        let r = TelemetryReport::parse(REPORT, 0);
        assert_eq!(r.avg_cpu_util, 54.88);
        assert_eq!(r.core_util.get(&2), Some(&97.5));
        assert_eq!(r.core_util.len(), 2);
    }

    #[test]
    fn test_missing_socket_defaults_to_zero() {
        let r = TelemetryReport::parse(REPORT, 3);
        assert_eq!(r.io_read_miss_rate, 0.0);
        assert_eq!(r.io_write_miss_rate, 0.0);
        assert_eq!(r.llc_load_miss_rate, 0.31);
    }

    #[test]
    fn test_malformed_and_empty() {
        let r = TelemetryReport::parse("LLC-load-misses-rate : n/a\n", 0);
        assert_eq!(r.llc_load_miss_rate, 0.0);
        assert_eq!(TelemetryReport::parse("", 0), TelemetryReport::default());
    }

    #[test]
    fn test_socket_header_forms() {
        assert_eq!(socket_header("------Socket 1------"), Some(1));
        assert_eq!(socket_header("Socket 12 summary"), Some(12));
        assert_eq!(socket_header("Socket info"), None);
    }
}
