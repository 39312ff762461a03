//! Lightweight process-wide counters, flushed to a single log line at
//! natural boundaries rather than per-increment.

use std::sync::atomic::{AtomicU64, Ordering};

pub static METRICS: Metrics = Metrics::new();

#[derive(Debug)]
pub struct Metrics {
    pub queue_pushed: AtomicU64,
    pub queue_popped: AtomicU64,
    pub queue_acked: AtomicU64,
    pub queue_autoclaimed: AtomicU64,
    pub queue_dropped_poison: AtomicU64,
    pub pov_requests: AtomicU64,
    pub pov_resolved: AtomicU64,
    pub pov_race_losses: AtomicU64,
    pub bundles_submitted: AtomicU64,
    pub tasks_cancelled: AtomicU64,
}

impl Metrics {
    pub const fn new() -> Self {
        Self {
            queue_pushed: AtomicU64::new(0),
            queue_popped: AtomicU64::new(0),
            queue_acked: AtomicU64::new(0),
            queue_autoclaimed: AtomicU64::new(0),
            queue_dropped_poison: AtomicU64::new(0),
            pov_requests: AtomicU64::new(0),
            pov_resolved: AtomicU64::new(0),
            pov_race_losses: AtomicU64::new(0),
            bundles_submitted: AtomicU64::new(0),
            tasks_cancelled: AtomicU64::new(0),
        }
    }

    pub fn inc_queue_pushed(&self) {
        self.queue_pushed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queue_pushed");
    }

    pub fn inc_queue_popped(&self) {
        self.queue_popped.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queue_popped");
    }

    pub fn inc_queue_acked(&self) {
        self.queue_acked.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queue_acked");
    }

    pub fn inc_queue_autoclaimed(&self) {
        self.queue_autoclaimed.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queue_autoclaimed");
    }

    pub fn inc_queue_dropped_poison(&self) {
        self.queue_dropped_poison.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "queue_dropped_poison");
    }

    pub fn inc_pov_requests(&self) {
        self.pov_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pov_resolved(&self) {
        self.pov_resolved.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_pov_race_losses(&self) {
        self.pov_race_losses.fetch_add(1, Ordering::Relaxed);
        tracing::trace!(counter = "pov_race_losses");
    }

    pub fn inc_bundles_submitted(&self) {
        self.bundles_submitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_tasks_cancelled(&self) {
        self.tasks_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Emit one summary log line with the current values of every counter.
    pub fn flush(&self) {
        tracing::info!(
            queue_pushed = self.queue_pushed.load(Ordering::Relaxed),
            queue_popped = self.queue_popped.load(Ordering::Relaxed),
            queue_acked = self.queue_acked.load(Ordering::Relaxed),
            queue_autoclaimed = self.queue_autoclaimed.load(Ordering::Relaxed),
            queue_dropped_poison = self.queue_dropped_poison.load(Ordering::Relaxed),
            pov_requests = self.pov_requests.load(Ordering::Relaxed),
            pov_resolved = self.pov_resolved.load(Ordering::Relaxed),
            pov_race_losses = self.pov_race_losses.load(Ordering::Relaxed),
            bundles_submitted = self.bundles_submitted.load(Ordering::Relaxed),
            tasks_cancelled = self.tasks_cancelled.load(Ordering::Relaxed),
            "metrics flush"
        );
    }

    /// Reset all counters to zero. Test-only.
    pub fn reset(&self) {
        self.queue_pushed.store(0, Ordering::Relaxed);
        self.queue_popped.store(0, Ordering::Relaxed);
        self.queue_acked.store(0, Ordering::Relaxed);
        self.queue_autoclaimed.store(0, Ordering::Relaxed);
        self.queue_dropped_poison.store(0, Ordering::Relaxed);
        self.pov_requests.store(0, Ordering::Relaxed);
        self.pov_resolved.store(0, Ordering::Relaxed);
        self.pov_race_losses.store(0, Ordering::Relaxed);
        self.bundles_submitted.store(0, Ordering::Relaxed);
        self.tasks_cancelled.store(0, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_increment_independently() {
        METRICS.reset();
        METRICS.inc_queue_pushed();
        METRICS.inc_queue_pushed();
        METRICS.inc_pov_race_losses();
        assert_eq!(METRICS.queue_pushed.load(Ordering::Relaxed), 2);
        assert_eq!(METRICS.pov_race_losses.load(Ordering::Relaxed), 1);
        METRICS.reset();
    }
}
