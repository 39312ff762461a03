//! Structured observability hooks for substrate lifecycle events.
//!
//! Events are emitted at `info!` (configurable via the `RUST_LOG` env
//! var); set `CRS_LOG_FORMAT=json` for structured output (see
//! [`crate::telemetry`]).

use tracing::{info, warn};

/// RAII guard that enters a task-scoped tracing span for the duration of
/// a unit of work tied to one task id.
pub struct TaskSpan {
    _span: tracing::span::EnteredSpan,
}

impl TaskSpan {
    pub fn enter(task_id: &str) -> Self {
        let span = tracing::info_span!("crs.task", task_id = %task_id);
        Self {
            _span: span.entered(),
        }
    }
}

pub fn emit_pov_pending(key: &str) {
    info!(event = "pov.pending", key = %key);
}

pub fn emit_pov_resolved(key: &str, did_crash: bool) {
    info!(event = "pov.resolved", key = %key, did_crash = did_crash);
}

pub fn emit_pov_race_lost(key: &str, target: &str) {
    info!(event = "pov.race_lost", key = %key, target = %target);
}

pub fn emit_task_cancelled(task_id: &str, reason: &str) {
    info!(event = "task.cancelled", task_id = %task_id, reason = %reason);
}

pub fn emit_bundle_submitted(task_id: &str, vuln_id: &str, patch_id: &str) {
    info!(
        event = "bundle.submitted",
        task_id = %task_id, vuln_id = %vuln_id, patch_id = %patch_id,
    );
}

pub fn emit_queue_poison_dropped(queue: &str, item_id: &str, times_delivered: u64) {
    warn!(
        event = "queue.poison_dropped",
        queue = %queue, item_id = %item_id, times_delivered = times_delivered,
    );
}

pub fn emit_subserve_tick(name: &str, did_work: bool) {
    info!(event = "scheduler.subserve_tick", subserve = %name, did_work = did_work);
}

pub fn emit_background_task_error(name: &str, error: &dyn std::fmt::Display, consecutive: u64) {
    warn!(
        event = "scheduler.background_task_error",
        task = %name, error = %error, consecutive_errors = consecutive,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_span_does_not_panic() {
        let _span = TaskSpan::enter("T1");
    }
}
