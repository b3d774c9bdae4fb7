//! Convergence metrics.
//!
//! Recorded through the `metrics` facade; with no recorder installed every
//! call is a no-op.
//!
//! ## Metrics
//!
//! ### Counters
//! - `stagewright_resources_created_total` - Objects created, by kind
//! - `stagewright_resources_present_total` - Objects found already present, by kind
//! - `stagewright_convergence_total` - Convergence passes, by outcome
//!
//! ### Histograms
//! - `stagewright_convergence_duration_seconds` - Convergence pass duration

use metrics::{counter, histogram};
use std::time::Duration;

/// Record an object created by a convergence pass.
pub fn record_resource_created(kind: &str) {
    counter!(
        "stagewright_resources_created_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record an object that already existed, including lost create races.
pub fn record_resource_present(kind: &str) {
    counter!(
        "stagewright_resources_present_total",
        "kind" => kind.to_string()
    )
    .increment(1);
}

/// Record the outcome of a convergence pass: `converged`, `unchanged`, or
/// `failed`.
pub fn record_convergence(outcome: &str) {
    counter!(
        "stagewright_convergence_total",
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record convergence pass duration.
pub fn record_convergence_duration(duration: Duration, workflow_name: &str) {
    histogram!(
        "stagewright_convergence_duration_seconds",
        "workflow" => workflow_name.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_resource_created("Service");
        record_resource_present("Service");
        record_convergence("converged");
        record_convergence_duration(Duration::from_millis(5), "wf1");
    }
}
