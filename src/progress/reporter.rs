//! Iteration progress reporter
//!
//! Uses indicatif for a single bar with:
//! - Iterations completed out of the requested total
//! - The session state as the bar message
//! - Elapsed time in the template

use indicatif::{ProgressBar, ProgressDrawTarget, ProgressStyle};
use std::time::Duration;

/// Progress reporter for a tuning session
pub struct ProgressReporter {
    bar: ProgressBar,
}

impl ProgressReporter {
    /// Create a reporter for `total` iterations
    pub fn new(total: u64) -> Self {
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.cyan} {prefix:.bold.dim} [{bar:30.cyan/blue}] {pos}/{len} iterations ({elapsed}) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("=> "),
        );
        bar.set_prefix("Tuning");
        bar.enable_steady_tick(Duration::from_millis(200));

        Self { bar }
    }

    /// Create a disabled progress reporter (for quiet mode)
    pub fn disabled() -> Self {
        Self {
            bar: ProgressBar::hidden(),
        }
    }

    /// Show the current session state
    pub fn set_state(&self, state: &str) {
        self.bar.set_message(state.to_string());
    }

    /// Mark one more iteration as complete
    pub fn inc(&self) {
        self.bar.inc(1);
    }

    /// Iterations completed so far
    pub fn position(&self) -> u64 {
        self.bar.position()
    }

    /// Finish progress with success message
    pub fn finish_success(&self, message: &str) {
        self.bar.finish_with_message(format!("✓ {}", message));
    }

    /// Finish progress with error message
    pub fn finish_error(&self, message: &str) {
        self.bar.abandon_with_message(format!("✗ {}", message));
    }

    /// Hide the bar, e.g. when stderr is not a terminal
    pub fn hide(&self) {
        self.bar.set_draw_target(ProgressDrawTarget::hidden());
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::disabled()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disabled_reporter_counts() {
        let progress = ProgressReporter::disabled();
        progress.set_state("running");
        progress.inc();
        progress.inc();
        assert_eq!(progress.position(), 2);
        progress.finish_success("done");
    }

    #[test]
    fn test_hide() {
        let progress = ProgressReporter::new(3);
        progress.hide();
        progress.inc();
        assert_eq!(progress.position(), 1);
        progress.finish_error("failed");
    }
}
