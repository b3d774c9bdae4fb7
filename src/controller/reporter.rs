//! Convergence observers.
//!
//! The controller never logs through global state directly. It reports to an
//! injected [`Reporter`]; [`TracingReporter`] forwards to `tracing` and the
//! metrics facade.

use std::time::Duration;

use tracing::{debug, error, info};

use super::{ConvergeReport, Step};
use crate::error::Error;
use crate::metrics;
use crate::resources::ObjectKey;

/// Observer of convergence progress. Every method defaults to doing nothing.
pub trait Reporter: Send + Sync {
    fn step_started(&self, _workflow: &str, _step: Step) {}

    fn resource_created(&self, _workflow: &str, _step: Step, _key: &ObjectKey) {}

    /// `raced` is true when a concurrent pass created the object between
    /// lookup and create.
    fn resource_present(&self, _workflow: &str, _step: Step, _key: &ObjectKey, _raced: bool) {}

    fn converged(&self, _report: &ConvergeReport, _elapsed: Duration) {}

    /// `step` is `None` when the desired spec failed validation.
    fn failed(&self, _workflow: &str, _step: Option<Step>, _error: &Error) {}
}

/// Discards every observation.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl Reporter for NoopReporter {}

/// Structured log events plus counters.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl Reporter for TracingReporter {
    fn step_started(&self, workflow: &str, step: Step) {
        debug!(workflow = %workflow, step = %step, "Ensuring step");
    }

    fn resource_created(&self, workflow: &str, step: Step, key: &ObjectKey) {
        info!(workflow = %workflow, step = %step, object = %key, "Created object");
        metrics::record_resource_created(key.kind.as_str());
    }

    fn resource_present(&self, workflow: &str, step: Step, key: &ObjectKey, raced: bool) {
        if raced {
            info!(
                workflow = %workflow,
                step = %step,
                object = %key,
                "Object created concurrently, treating as present"
            );
        } else {
            debug!(workflow = %workflow, step = %step, object = %key, "Object present");
        }
        metrics::record_resource_present(key.kind.as_str());
    }

    fn converged(&self, report: &ConvergeReport, elapsed: Duration) {
        info!(
            workflow = %report.workflow,
            namespace = %report.namespace,
            created = report.created.len(),
            present = report.present.len(),
            duration_ms = elapsed.as_millis() as u64,
            "Convergence complete"
        );
        metrics::record_convergence(if report.is_unchanged() {
            "unchanged"
        } else {
            "converged"
        });
        metrics::record_convergence_duration(elapsed, &report.workflow);
    }

    fn failed(&self, workflow: &str, step: Option<Step>, err: &Error) {
        match step {
            Some(step) => error!(
                workflow = %workflow,
                step = %step,
                code = err.code(),
                error = %err,
                "Convergence failed"
            ),
            None => error!(
                workflow = %workflow,
                code = err.code(),
                error = %err,
                "Desired state rejected"
            ),
        }
        metrics::record_convergence("failed");
    }
}
