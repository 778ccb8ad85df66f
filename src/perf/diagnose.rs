//! Bottleneck diagnosis
//!
//! Picks the stage with the highest completion time and splits it into one
//! of two remediation families by comparing its stall time with the rest of
//! its completion time.

use super::log::{IterationMeasurement, PipelineStage};
use super::telemetry::TelemetryReport;
use crate::error::{PipeTuneError, Result};
use serde::{Deserialize, Serialize};

/// Coarse contention classification of the critical stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ContentionCategory {
    /// Stage spends most of its time stalled (consumer side / backpressure)
    #[serde(rename = "C1")]
    StallDominated,
    /// Active processing dominates (memory or IO hierarchy contention)
    #[serde(rename = "C2-or-C4")]
    ComputeOrIoDominated,
}

impl ContentionCategory {
    /// Short label
    pub fn label(self) -> &'static str {
        match self {
            Self::StallDominated => "C1",
            Self::ComputeOrIoDominated => "C2-or-C4",
        }
    }

    /// Human-readable hint for the remediation family
    pub fn hint(self) -> &'static str {
        match self {
            Self::StallDominated => "stall-dominated: stage is blocked on its consumer, relieve backpressure downstream",
            Self::ComputeOrIoDominated => "compute/IO-dominated: check memory and IO contention (see miss rates)",
        }
    }
}

impl std::fmt::Display for ContentionCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Outcome of one diagnosis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosisResult {
    /// Critical (slowest) stage
    pub stage: PipelineStage,
    /// Contention category
    pub category: ContentionCategory,
    /// Completion time of the critical stage
    pub completion: f64,
    /// Stall time of the critical stage
    pub stall: f64,
    /// End-to-end throughput of the sampled window
    pub throughput: f64,
    /// Telemetry the classification was made alongside
    pub telemetry: TelemetryReport,
}

impl DiagnosisResult {
    /// Print a short report
    pub fn print_summary(&self, side: &str) {
        println!("=== {} Diagnosis ===", side);
        println!("Critical stage:  {}", self.stage);
        println!("Completion time: {:.3}", self.completion);
        println!("Stall time:      {:.3}", self.stall);
        println!("Throughput:      {:.3}", self.throughput);
        println!("Contention:      {} ({})", self.category, self.category.hint());
        println!(
            "IO miss rate:    read {:.2} / write {:.2}",
            self.telemetry.io_read_miss_rate, self.telemetry.io_write_miss_rate
        );
        println!(
            "LLC miss rate:   load {:.2} / store {:.2}",
            self.telemetry.llc_load_miss_rate, self.telemetry.llc_store_miss_rate
        );
        if self.telemetry.avg_cpu_util > 0.0 {
            println!("CPU utilisation: {:.2}%", self.telemetry.avg_cpu_util);
        }
    }
}

/// Index of the maximum completion time; ties resolve to the lowest index
pub fn critical_stage(m: &IterationMeasurement) -> PipelineStage {
    let mut best = 0;
    for (idx, value) in m.completion.iter().enumerate() {
        if *value > m.completion[best] {
            best = idx;
        }
    }
    PipelineStage::ALL[best]
}

/// Classify the critical stage's contention from its completion and stall time
pub fn classify(completion: f64, stall: f64) -> ContentionCategory {
    let slack = completion - stall;
    if slack < stall {
        ContentionCategory::StallDominated
    } else {
        ContentionCategory::ComputeOrIoDominated
    }
}

/// Diagnose one side's measurement against its telemetry report text
pub fn diagnose(
    measurement: &IterationMeasurement,
    numa_node: u32,
    telemetry_text: &str,
) -> Result<DiagnosisResult> {
    if let Some(bad) = measurement
        .completion
        .iter()
        .chain(measurement.stall.iter())
        .find(|v| !v.is_finite())
    {
        return Err(PipeTuneError::Diagnose(format!(
            "measurement contains a non-finite value ({})",
            bad
        )));
    }

    let telemetry = TelemetryReport::parse(telemetry_text, numa_node);
    let stage = critical_stage(measurement);
    let completion = measurement.completion_of(stage);
    let stall = measurement.stall_of(stage);
    let category = classify(completion, stall);

    tracing::debug!(
        "Critical stage {} (completion {:.3}, stall {:.3}) -> {}",
        stage,
        completion,
        stall,
        category
    );

    Ok(DiagnosisResult {
        stage,
        category,
        completion,
        stall,
        throughput: measurement.throughput,
        telemetry,
    })
}
