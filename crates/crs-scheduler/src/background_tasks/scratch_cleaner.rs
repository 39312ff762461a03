//! Scratch cleaner background task: removes per-task scratch
//! directories once a task has been expired for
//! `delete_old_tasks_scratch_delta_seconds`. Grounded on
//! `test_scratch_cleaner.py`'s fixtures (expired task with an existing
//! directory gets removed, a live task's is left alone); this port
//! sweeps every currently-expired task in one pass rather than one per
//! call, since the interval loop already re-invokes on a fixed cadence
//! regardless. Deletion failures are logged and ignored.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crs_registry::TaskRegistry;

use crate::background::BackgroundTask;

pub struct ScratchCleanerTask {
    registry: Arc<TaskRegistry>,
    scratch_dir: PathBuf,
    delete_old_tasks_scratch_delta_seconds: i64,
}

impl ScratchCleanerTask {
    pub fn new(registry: Arc<TaskRegistry>, scratch_dir: impl Into<PathBuf>, delete_old_tasks_scratch_delta_seconds: i64) -> Self {
        Self { registry, scratch_dir: scratch_dir.into(), delete_old_tasks_scratch_delta_seconds }
    }
}

#[async_trait]
impl BackgroundTask for ScratchCleanerTask {
    fn name(&self) -> &str {
        "scratch-cleaner"
    }

    async fn execute(&self) -> anyhow::Result<bool> {
        let tasks = self.registry.iterate().await?;
        let now = chrono::Utc::now().timestamp();

        let mut did_work = false;
        for task in tasks {
            let expired = self
                .registry
                .is_expired(&task.task_id, self.delete_old_tasks_scratch_delta_seconds, now)
                .await?;
            if !expired {
                continue;
            }
            let task_dir = self.scratch_dir.join(&task.task_id);
            if !task_dir.exists() {
                continue;
            }
            match std::fs::remove_dir_all(&task_dir) {
                Ok(()) => {
                    debug!(task_id = %task.task_id, dir = %task_dir.display(), "removed expired scratch directory");
                    did_work = true;
                }
                Err(e) => {
                    warn!(task_id = %task.task_id, dir = %task_dir.display(), error = %e, "failed to remove scratch directory");
                }
            }
        }
        Ok(did_work)
    }
}
