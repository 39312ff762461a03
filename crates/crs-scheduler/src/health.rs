//! Health snapshot (§4.7): last-run and error counts per sub-serve,
//! plus aggregated background-task status. `healthy` is the single
//! boolean an operator's liveness probe should check.

use std::collections::HashMap;
use std::sync::Mutex;

use serde::Serialize;

use crate::background::BackgroundTaskStatus;

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubServeHealth {
    pub last_run_epoch_secs: Option<i64>,
    pub last_did_work: bool,
    pub error_count: u64,
}

/// Records one tick's outcome per named sub-serve. Shared across the
/// scheduler loop (single-threaded, but `Mutex` keeps the type `Sync`
/// for the health-snapshot HTTP/CLI surface that reads it concurrently).
#[derive(Default)]
pub struct HealthTracker {
    subserves: Mutex<HashMap<String, SubServeHealth>>,
}

impl HealthTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str, now: i64, did_work: bool, errored: bool) {
        let mut map = self.subserves.lock().unwrap();
        let entry = map.entry(name.to_string()).or_default();
        entry.last_run_epoch_secs = Some(now);
        entry.last_did_work = did_work;
        if errored {
            entry.error_count += 1;
        }
    }

    pub fn snapshot(&self) -> HashMap<String, SubServeHealth> {
        self.subserves.lock().unwrap().clone()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthSnapshot {
    pub subserves: HashMap<String, SubServeHealth>,
    pub background_tasks: Vec<BackgroundTaskStatus>,
    pub healthy: bool,
}

/// `healthy` iff every background task is alive and under the
/// consecutive-error threshold (§4.7).
pub fn build_snapshot(
    subserves: HashMap<String, SubServeHealth>,
    background_tasks: Vec<BackgroundTaskStatus>,
    max_consecutive_errors: u64,
) -> HealthSnapshot {
    let healthy = background_tasks
        .iter()
        .all(|t| t.alive && t.consecutive_errors < max_consecutive_errors);
    HealthSnapshot { subserves, background_tasks, healthy }
}
