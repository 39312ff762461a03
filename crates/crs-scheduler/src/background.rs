//! Background-task supervisor (§4.7, §9): every long-running side task
//! (POV reproduction, corpus merging, scratch cleanup) gets its own
//! named interval, its own consecutive-error counter, and a `healthy`
//! predicate, running on a dedicated worker thread so it never blocks
//! the scheduler's cooperative loop. Grounded on the original's
//! inferred `BackgroundTask` / `BackgroundTaskManager` contract
//! (`scheduler/background_tasks.py`, exercised by
//! `test_background_tasks.py`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Serialize;
use tokio::task::JoinHandle;

/// One unit of recurring side work. `execute` returns `Ok(true)` if it
/// did something this tick, `Ok(false)` if there was nothing to do, and
/// `Err` on failure — counted but never allowed to kill the task loop.
#[async_trait]
pub trait BackgroundTask: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn execute(&self) -> anyhow::Result<bool>;
}

#[derive(Debug, Clone, Serialize)]
pub struct BackgroundTaskStatus {
    pub name: String,
    pub interval_ms: u64,
    pub success_count: u64,
    pub error_count: u64,
    pub consecutive_errors: u64,
    pub last_run_epoch_secs: Option<i64>,
    pub alive: bool,
}

struct Counters {
    success_count: AtomicU64,
    error_count: AtomicU64,
    consecutive_errors: AtomicU64,
    last_run_epoch_secs: AtomicU64,
    has_run: AtomicBool,
}

impl Default for Counters {
    fn default() -> Self {
        Self {
            success_count: AtomicU64::new(0),
            error_count: AtomicU64::new(0),
            consecutive_errors: AtomicU64::new(0),
            last_run_epoch_secs: AtomicU64::new(0),
            has_run: AtomicBool::new(false),
        }
    }
}

/// Owns one spawned background task: its name, interval, shared
/// counters, and the `JoinHandle` used to check liveness.
pub struct Handle {
    name: String,
    interval_ms: u64,
    counters: Arc<Counters>,
    join: JoinHandle<()>,
}

impl Handle {
    pub fn status(&self) -> BackgroundTaskStatus {
        let last_run = self.counters.has_run.load(Ordering::Relaxed).then(|| {
            self.counters.last_run_epoch_secs.load(Ordering::Relaxed) as i64
        });
        BackgroundTaskStatus {
            name: self.name.clone(),
            interval_ms: self.interval_ms,
            success_count: self.counters.success_count.load(Ordering::Relaxed),
            error_count: self.counters.error_count.load(Ordering::Relaxed),
            consecutive_errors: self.counters.consecutive_errors.load(Ordering::Relaxed),
            last_run_epoch_secs: last_run,
            alive: !self.join.is_finished(),
        }
    }

    pub fn abort(&self) {
        self.join.abort();
    }
}

/// Spawns `task` onto its own `tokio` task looping at `interval`,
/// tracking success/error counts independently of every other
/// background task.
pub fn spawn(task: Arc<dyn BackgroundTask>, interval: Duration) -> Handle {
    let counters = Arc::new(Counters::default());
    let name = task.name().to_string();
    let interval_ms = interval.as_millis() as u64;

    let loop_counters = counters.clone();
    let loop_name = name.clone();
    let join = tokio::spawn(async move {
        loop {
            tokio::time::sleep(interval).await;
            let now = chrono::Utc::now().timestamp();
            match task.execute().await {
                Ok(_) => {
                    loop_counters.success_count.fetch_add(1, Ordering::Relaxed);
                    loop_counters.consecutive_errors.store(0, Ordering::Relaxed);
                }
                Err(e) => {
                    loop_counters.error_count.fetch_add(1, Ordering::Relaxed);
                    let consecutive = loop_counters.consecutive_errors.fetch_add(1, Ordering::Relaxed) + 1;
                    crs_core::obs::emit_background_task_error(&loop_name, &e, consecutive);
                }
            }
            loop_counters.last_run_epoch_secs.store(now as u64, Ordering::Relaxed);
            loop_counters.has_run.store(true, Ordering::Relaxed);
        }
    });

    Handle { name, interval_ms, counters, join }
}

/// Owns every background task's `Handle` and aggregates their status.
#[derive(Default)]
pub struct BackgroundTaskManager {
    handles: Vec<Handle>,
}

impl BackgroundTaskManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn BackgroundTask>, interval: Duration) {
        self.handles.push(spawn(task, interval));
    }

    pub fn statuses(&self) -> Vec<BackgroundTaskStatus> {
        self.handles.iter().map(Handle::status).collect()
    }

    pub fn shutdown(&self) {
        for handle in &self.handles {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;

    struct CountingTask {
        name: &'static str,
        calls: Arc<AtomicU32>,
        fail: bool,
    }

    #[async_trait]
    impl BackgroundTask for CountingTask {
        fn name(&self) -> &str {
            self.name
        }

        async fn execute(&self) -> anyhow::Result<bool> {
            self.calls.fetch_add(1, Ordering::Relaxed);
            if self.fail {
                anyhow::bail!("boom");
            }
            Ok(true)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn successful_task_accumulates_success_count() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = Arc::new(CountingTask { name: "t", calls: calls.clone(), fail: false });
        let mut manager = BackgroundTaskManager::new();
        manager.register(task, Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(35)).await;
        tokio::task::yield_now().await;

        let statuses = manager.statuses();
        assert_eq!(statuses.len(), 1);
        assert!(statuses[0].success_count >= 1);
        assert!(statuses[0].alive);
        manager.shutdown();
    }

    #[tokio::test(start_paused = true)]
    async fn failing_task_increments_consecutive_errors() {
        let calls = Arc::new(AtomicU32::new(0));
        let task = Arc::new(CountingTask { name: "t", calls, fail: true });
        let mut manager = BackgroundTaskManager::new();
        manager.register(task, Duration::from_millis(10));

        tokio::time::advance(Duration::from_millis(25)).await;
        tokio::task::yield_now().await;

        let statuses = manager.statuses();
        assert!(statuses[0].consecutive_errors >= 1);
        manager.shutdown();
    }
}
