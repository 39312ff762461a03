//! Sub-serve 1 (§4.7): ready-task to build-request fan-out. Grounded
//! on `scheduler.py`'s `serve_ready_task` / `process_ready_task`. A
//! real task-type decoder belongs to the harness-orchestration layer
//! (out of scope, §1); this sub-serve fans a task out to the fixed set
//! of needed build variants.

use std::sync::Arc;

use tracing::{error, info};

use crs_core::domain::{BuildRequest, BuildType, Task, TaskReady};
use crs_queue::{drop_if_poison, ReliableQueue};

const NEEDED_VARIANTS: &[(&str, BuildType)] = &[
    ("address", BuildType::Fuzzer),
    ("coverage", BuildType::Coverage),
];

fn build_requests_for(task: &Task) -> Vec<BuildRequest> {
    NEEDED_VARIANTS
        .iter()
        .map(|(sanitizer, build_type)| BuildRequest {
            task_id: task.task_id.clone(),
            package_name: task.project_name.clone(),
            engine: "libfuzzer".to_string(),
            sanitizer: sanitizer.to_string(),
            build_type: *build_type,
            source_path: format!("/tasks_storage/{}/src/{}", task.task_id, task.project_name),
            ossfuzz_path: format!("/tasks_storage/{}/fuzz-tooling", task.task_id),
            internal_patch_id: String::new(),
        })
        .collect()
}

pub struct ReadyTaskSubserve {
    ready_queue: Arc<ReliableQueue<TaskReady>>,
    build_requests_queue: Arc<ReliableQueue<BuildRequest>>,
    poison_threshold: u64,
}

impl ReadyTaskSubserve {
    pub fn new(
        ready_queue: Arc<ReliableQueue<TaskReady>>,
        build_requests_queue: Arc<ReliableQueue<BuildRequest>>,
        poison_threshold: u64,
    ) -> Self {
        Self { ready_queue, build_requests_queue, poison_threshold }
    }

    pub async fn serve(&self) -> anyhow::Result<bool> {
        let Some(item) = self.ready_queue.pop().await? else {
            return Ok(false);
        };

        if drop_if_poison(&self.ready_queue, &item.item_id, self.poison_threshold).await? {
            return Ok(true);
        }

        let task = item.deserialized.task;
        info!(task_id = %task.task_id, "processing ready task");
        match self.fan_out(&task).await {
            Ok(()) => {
                self.ready_queue.ack(&item.item_id).await?;
                Ok(true)
            }
            Err(e) => {
                error!(task_id = %task.task_id, error = %e, "failed to process ready task, leaving unacked");
                Ok(false)
            }
        }
    }

    async fn fan_out(&self, task: &Task) -> anyhow::Result<()> {
        for req in build_requests_for(task) {
            self.build_requests_queue.push(&req).await?;
            info!(task_id = %task.task_id, build_type = ?req.build_type, "pushed build request");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_core::domain::TaskType;
    use crs_store::fakes::MemoryStore;
    use crs_store::Store;

    async fn setup() -> ReadyTaskSubserve {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let ready = Arc::new(ReliableQueue::new(store.clone(), "ready_tasks", "scheduler_ready_tasks", "c1", 1000, None).await.unwrap());
        let build = Arc::new(ReliableQueue::new(store, "build", "scheduler", "c1", 1000, None).await.unwrap());
        ReadyTaskSubserve::new(ready, build, 10)
    }

    fn task() -> Task {
        Task {
            task_id: "T1".into(),
            project_name: "libpng".into(),
            deadline: 10_000_000_000,
            task_type: TaskType::Full,
            sources: vec![],
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn empty_queue_reports_no_work() {
        let s = setup().await;
        assert!(!s.serve().await.unwrap());
    }

    #[tokio::test]
    async fn ready_task_fans_out_build_requests_and_acks() {
        let s = setup().await;
        s.ready_queue.push(&TaskReady { task: task() }).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert_eq!(s.build_requests_queue.size().await.unwrap(), 2);
        assert!(!s.serve().await.unwrap());
    }
}
