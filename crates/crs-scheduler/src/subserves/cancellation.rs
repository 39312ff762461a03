//! Sub-serve 3 (§4.7): cancellation. Drains one `TaskDelete` request,
//! then sweeps the registry once per tick for deadline-expired live
//! tasks, judged against the tick's injected `now` rather than reading
//! the wall clock itself. Grounded on `cancellation.py`'s
//! `Cancellation`.

use std::sync::Arc;

use tracing::info;

use crs_core::domain::TaskDelete;
use crs_queue::ReliableQueue;
use crs_registry::TaskRegistry;

pub struct CancellationSubserve {
    delete_queue: Arc<ReliableQueue<TaskDelete>>,
    registry: Arc<TaskRegistry>,
}

impl CancellationSubserve {
    pub fn new(delete_queue: Arc<ReliableQueue<TaskDelete>>, registry: Arc<TaskRegistry>) -> Self {
        Self { delete_queue, registry }
    }

    pub async fn serve(&self, now: i64) -> anyhow::Result<bool> {
        let mut did_work = self.process_delete_request().await?;
        did_work |= self.check_timeouts(now).await?;
        Ok(did_work)
    }

    async fn process_delete_request(&self) -> anyhow::Result<bool> {
        let Some(item) = self.delete_queue.pop().await? else {
            return Ok(false);
        };

        let task_id = &item.deserialized.task_id;
        info!(task_id = %task_id, "processing delete request");
        if self.registry.get(task_id).await?.is_some() {
            self.registry.mark_cancelled(task_id).await?;
            self.delete_queue.ack(&item.item_id).await?;
            info!(task_id = %task_id, "task marked as cancelled");
            Ok(true)
        } else {
            info!(task_id = %task_id, "no task found for delete request");
            self.delete_queue.ack(&item.item_id).await?;
            Ok(false)
        }
    }

    async fn check_timeouts(&self, now: i64) -> anyhow::Result<bool> {
        let tasks = self.registry.iterate().await?;
        let mut any_cancelled = false;
        for task in tasks {
            if task.cancelled {
                continue;
            }
            if task.deadline < now {
                info!(task_id = %task.task_id, "task timed out, marking as cancelled");
                self.registry.mark_cancelled(&task.task_id).await?;
                any_cancelled = true;
            }
        }
        Ok(any_cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_core::domain::{Task, TaskType};
    use crs_store::fakes::MemoryStore;
    use crs_store::Store;

    async fn setup() -> CancellationSubserve {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let queue = Arc::new(ReliableQueue::new(store.clone(), "delete_task", "scheduler", "c1", 1000, None).await.unwrap());
        CancellationSubserve::new(queue, Arc::new(TaskRegistry::new(store)))
    }

    fn task(id: &str, deadline: i64) -> Task {
        Task {
            task_id: id.to_string(),
            project_name: "libpng".into(),
            deadline,
            task_type: TaskType::Full,
            sources: vec![],
            cancelled: false,
        }
    }

    #[tokio::test]
    async fn nothing_to_do_reports_no_work() {
        let s = setup().await;
        assert!(!s.serve(0).await.unwrap());
    }

    #[tokio::test]
    async fn delete_request_marks_known_task_cancelled() {
        let s = setup().await;
        s.registry.set(&task("T1", 10_000_000_000)).await.unwrap();
        s.delete_queue.push(&TaskDelete { task_id: "T1".into() }).await.unwrap();
        assert!(s.serve(0).await.unwrap());
        assert!(s.registry.is_cancelled("T1").await.unwrap());
    }

    #[tokio::test]
    async fn delete_request_for_unknown_task_acks_without_work() {
        let s = setup().await;
        s.delete_queue.push(&TaskDelete { task_id: "ghost".into() }).await.unwrap();
        assert!(!s.serve(0).await.unwrap());
    }

    #[tokio::test]
    async fn expired_live_task_is_swept_and_cancelled() {
        let s = setup().await;
        s.registry.set(&task("T1", 50)).await.unwrap();
        assert!(!s.serve(0).await.unwrap(), "not yet past its deadline at now=0");
        assert!(!s.registry.is_cancelled("T1").await.unwrap());
        assert!(s.serve(100).await.unwrap(), "past its deadline at now=100");
        assert!(s.registry.is_cancelled("T1").await.unwrap());
    }
}
