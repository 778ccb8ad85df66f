//! Parameter adjustment policy
//!
//! The session hands every completed iteration to a [`TuningPolicy`] before
//! writing the configuration back. The default [`HoldPolicy`] keeps every
//! knob as it is.

use crate::config::Config;
use crate::error::Result;
use crate::perf::{DiagnosisResult, IterationMeasurement};
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Everything observed during one iteration
#[derive(Debug, Clone, Serialize)]
pub struct IterationReport {
    /// Zero-based iteration number
    pub iteration: u32,
    /// When the iteration launched its runs
    pub started_at: DateTime<Utc>,
    /// When diagnosis finished
    pub finished_at: DateTime<Utc>,
    /// Local sampled measurement
    pub local: IterationMeasurement,
    /// Remote sampled measurement
    pub remote: IterationMeasurement,
    /// Local diagnosis
    pub local_diagnosis: DiagnosisResult,
    /// Remote diagnosis
    pub remote_diagnosis: DiagnosisResult,
}

/// Decides the next parameter values from an iteration's outcome
pub trait TuningPolicy: Send {
    /// Policy name for logs
    fn name(&self) -> &str;

    /// Adjust `config` in place after iteration `report`
    fn apply(&mut self, report: &IterationReport, config: &mut Config) -> Result<()>;
}

/// Leaves every parameter unchanged
#[derive(Debug, Default, Clone, Copy)]
pub struct HoldPolicy;

impl TuningPolicy for HoldPolicy {
    fn name(&self) -> &str {
        "hold"
    }

    fn apply(&mut self, report: &IterationReport, _config: &mut Config) -> Result<()> {
        tracing::debug!(
            "Iteration {}: holding parameters (local {} / remote {})",
            report.iteration,
            report.local_diagnosis.category,
            report.remote_diagnosis.category
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::perf::{ContentionCategory, PipelineStage, TelemetryReport};

    fn report() -> IterationReport {
        let diagnosis = DiagnosisResult {
            stage: PipelineStage::DispRx,
            category: ContentionCategory::StallDominated,
            completion: 0.4,
            stall: 0.3,
            throughput: 11.0,
            telemetry: TelemetryReport::default(),
        };
        IterationReport {
            iteration: 0,
            started_at: Utc::now(),
            finished_at: Utc::now(),
            local: IterationMeasurement::default(),
            remote: IterationMeasurement::default(),
            local_diagnosis: diagnosis.clone(),
            remote_diagnosis: diagnosis,
        }
    }

    #[test]
    fn test_hold_policy_keeps_parameters() {
        let mut config = Config::parse("kAppCoreNum : 4\nkDispQueueNum : 2\n", "/tmp/hold.conf").unwrap();
        let before = config.clone();

        let mut policy = HoldPolicy;
        policy.apply(&report(), &mut config).unwrap();

        assert_eq!(policy.name(), "hold");
        assert!(config.same_settings(&before));
    }

    #[test]
    fn test_report_serializes() {
        let json = serde_json::to_value(report()).unwrap();
        assert_eq!(json["local_diagnosis"]["category"], "C1");
        assert_eq!(json["local_diagnosis"]["stage"], "disp_rx");
        assert!(json["started_at"].is_string());
    }
}
