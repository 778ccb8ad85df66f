//! Perf statistics log parser
//!
//! The data-path executable prints a fixed-format block once per measurement
//! iteration:
//!
//! ```text
//! DPerf Statistics    Thpl. (Mpps)        Avg. [/P]           Avg. Stall [/P] ...
//! -----------------------------------------------------------------------------
//! End-to-end          12.500              0.080
//! app_tx              12.500              0.900               0.300 ...
//! app_rx              12.400              0.700               0.100 ...
//! disp_tx             12.500              0.400               0.050
//! disp_rx             12.400              0.350               0.020
//! nic_tx              12.500              0.200
//! nic_rx              12.400              0.000
//! ```
//!
//! Only the block at the sample index is read.

use crate::error::{IoResultExt, PipeTuneError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Marker opening each measurement block
pub const PERF_MARKER: &str = "Perf Statistics";

/// Tag of the end-to-end throughput line
pub const END_TO_END_TAG: &str = "End-to-end";

/// Lines scanned per block, starting at the marker line
pub const BLOCK_WINDOW: usize = 9;

const COMPLETION_FIELD: usize = 2;
const STALL_FIELD: usize = 3;
const THROUGHPUT_FIELD: usize = 1;

/// Pipeline stage, in tie-break order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Application transmit
    AppTx,
    /// Application receive
    AppRx,
    /// Dispatcher transmit
    DispTx,
    /// Dispatcher receive
    DispRx,
    /// NIC transmit
    NicTx,
    /// NIC receive
    NicRx,
}

impl PipelineStage {
    /// All stages in slot order
    pub const ALL: [PipelineStage; 6] = [
        PipelineStage::AppTx,
        PipelineStage::AppRx,
        PipelineStage::DispTx,
        PipelineStage::DispRx,
        PipelineStage::NicTx,
        PipelineStage::NicRx,
    ];

    /// Name as printed in the perf log
    pub fn name(self) -> &'static str {
        match self {
            Self::AppTx => "app_tx",
            Self::AppRx => "app_rx",
            Self::DispTx => "disp_tx",
            Self::DispRx => "disp_rx",
            Self::NicTx => "nic_tx",
            Self::NicRx => "nic_rx",
        }
    }

    /// Slot index in the completion-time vector
    pub fn index(self) -> usize {
        self as usize
    }

    /// Whether the stage reports a stall time (NIC stages do not)
    pub fn has_stall(self) -> bool {
        !matches!(self, Self::NicTx | Self::NicRx)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Timing data of one sampled measurement window
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct IterationMeasurement {
    /// Completion time per stage (app-tx, app-rx, disp-tx, disp-rx, nic-tx, nic-rx)
    pub completion: [f64; 6],
    /// Stall time per stage (app-tx, app-rx, disp-tx, disp-rx)
    pub stall: [f64; 4],
    /// End-to-end throughput
    pub throughput: f64,
}

impl IterationMeasurement {
    /// Completion time of a stage
    pub fn completion_of(&self, stage: PipelineStage) -> f64 {
        self.completion[stage.index()]
    }

    /// Stall time of a stage; always zero for NIC stages
    pub fn stall_of(&self, stage: PipelineStage) -> f64 {
        if stage.has_stall() {
            self.stall[stage.index()]
        } else {
            0.0
        }
    }
}

/// Sample block for a run of `iteration_count` iterations (the midpoint)
pub fn sample_index(iteration_count: u64) -> usize {
    (iteration_count / 2) as usize
}

fn field(line: &str, idx: usize, what: &str) -> Result<f64> {
    let token = line.split_whitespace().nth(idx).ok_or_else(|| {
        PipeTuneError::log_parse(format!("{}: missing field {} in '{}'", what, idx, line.trim()))
    })?;
    token.parse::<f64>().map_err(|_| {
        PipeTuneError::log_parse(format!("{}: '{}' is not a number", what, token))
    })
}

/// Parse the measurement block at `sample_index` (1-based)
pub fn parse_perf_log(text: &str, sample_index: usize) -> Result<IterationMeasurement> {
    let lines: Vec<&str> = text.lines().collect();

    let start = sample_index
        .checked_sub(1)
        .and_then(|nth| {
            lines
                .iter()
                .enumerate()
                .filter(|(_, line)| line.contains(PERF_MARKER))
                .nth(nth)
        })
        .map(|(idx, _)| idx)
        .ok_or_else(|| {
            PipeTuneError::log_parse(format!("sample iteration not found ({})", sample_index))
        })?;

    let mut m = IterationMeasurement::default();
    let end = (start + BLOCK_WINDOW).min(lines.len());

    for line in &lines[start..end] {
        if line.contains(END_TO_END_TAG) {
            m.throughput = field(line, THROUGHPUT_FIELD, END_TO_END_TAG)?;
            continue;
        }

        // nic_rx completion is not reliable upstream and stays at zero
        let stage = PipelineStage::ALL[..5]
            .iter()
            .copied()
            .find(|stage| line.contains(stage.name()));

        if let Some(stage) = stage {
            m.completion[stage.index()] = field(line, COMPLETION_FIELD, stage.name())?;
            if stage.has_stall() {
                m.stall[stage.index()] = field(line, STALL_FIELD, stage.name())?;
            }
        }
    }

    Ok(m)
}

/// Read and parse a perf log file
pub fn parse_perf_log_file(path: &Path, sample_index: usize) -> Result<IterationMeasurement> {
    let text = std::fs::read_to_string(path).with_path(path)?;
    parse_perf_log(&text, sample_index)
        .map_err(|e| e.with_context(format!("parsing {}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(app_tx: (f64, f64), e2e: f64) -> String {
        format!(
            "DPerf Statistics    Thpl. (Mpps)        Avg. [/P]           Avg. Stall [/P]\n\
             ------------------------------------------------------------------------\n\
             End-to-end          {e2e:.3}              0.080\n\
             app_tx              12.500              {:.3}               {:.3}\n\
             app_rx              12.400              0.700               0.100\n\
             disp_tx             12.500              0.400               0.050\n\
             disp_rx             12.400              0.350               0.020\n\
             nic_tx              12.500              0.200\n\
             nic_rx              12.400              9.999\n\
             ------------------------------------------------------------------------\n\n",
            app_tx.0, app_tx.1
        )
    }

    #[test]
    fn test_parses_selected_block_only() {
        let text = format!("boot\n{}{}{}", block((1.0, 0.5), 10.0), block((2.0, 1.5), 20.0), block((3.0, 0.1), 30.0));
        let m = parse_perf_log(&text, 2).unwrap();
        assert_eq!(m.completion[0], 2.0);
        assert_eq!(m.stall[0], 1.5);
        assert_eq!(m.throughput, 20.0);
        assert_eq!(m.completion_of(PipelineStage::AppRx), 0.7);
        assert_eq!(m.stall_of(PipelineStage::DispRx), 0.02);
        assert_eq!(m.completion_of(PipelineStage::NicTx), 0.2);
    }

    #[test]
    fn test_nic_rx_is_never_read() {
        let m = parse_perf_log(&block((1.0, 0.5), 10.0), 1).unwrap();
        assert_eq!(m.completion_of(PipelineStage::NicRx), 0.0);
        assert_eq!(m.stall_of(PipelineStage::NicTx), 0.0);
    }

    #[test]
    fn test_sample_not_found() {
        let text = block((1.0, 0.5), 10.0);
        let err = parse_perf_log(&text, 2).unwrap_err();
        assert!(err.to_string().contains("sample iteration not found"));
        assert!(parse_perf_log(&text, 0).is_err());
    }

    #[test]
    fn test_absent_stages_default_to_zero() {
        let text = "Perf Statistics\napp_rx x 4.0 1.0\n";
        let m = parse_perf_log(text, 1).unwrap();
        assert_eq!(m.completion, [0.0, 4.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(m.stall, [0.0, 1.0, 0.0, 0.0]);
        assert_eq!(m.throughput, 0.0);
    }

    #[test]
    fn test_lines_beyond_window_ignored() {
        let mut text = String::from("Perf Statistics\n");
        for _ in 0..8 {
            text.push_str("filler\n");
        }
        text.push_str("app_tx 1 5.0 2.0\n");
        let m = parse_perf_log(&text, 1).unwrap();
        assert_eq!(m.completion[0], 0.0);
    }

    #[test]
    fn test_malformed_matched_line_is_error() {
        let text = "Perf Statistics\ndisp_tx 1.0 abc 0.1\n";
        let err = parse_perf_log(text, 1).unwrap_err();
        assert!(matches!(err, PipeTuneError::LogParse(_)));

        let text = "Perf Statistics\napp_tx 1.0 2.0\n";
        assert!(parse_perf_log(text, 1).is_err());
    }

    #[test]
    fn test_sample_index_is_midpoint() {
        assert_eq!(sample_index(10), 5);
        assert_eq!(sample_index(7), 3);
        assert_eq!(sample_index(1), 0);
    }
}
