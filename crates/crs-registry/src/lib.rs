//! Task Registry (C3): stores `Task` records; maintains
//! cancelled/succeeded/errored auxiliary sets; enforces "should stop"
//! checks. Grounded on the original's `TaskRegistry` dataclass.

pub mod error;

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;

use lru::LruCache;
use tracing::instrument;

use crs_core::domain::Task;
use crs_store::Store;
use std::sync::Arc;

pub use error::{RegistryError, RegistryResult};

pub const TASKS_HASH: &str = "orchestrator_tasks_registry";
pub const CANCELLED_SET: &str = "cancelled_tasks";
pub const SUCCEEDED_SET: &str = "succeeded_tasks";
pub const ERRORED_SET: &str = "errored_tasks";

/// Bounded memoization of task deadlines (§9: the only legitimate
/// process-local cache besides the PoV terminal-state cache, and it
/// must be bounded).
const DEADLINE_CACHE_CAPACITY: usize = 1000;

pub struct TaskRegistry {
    store: Arc<dyn Store>,
    deadline_cache: Mutex<LruCache<String, i64>>,
}

impl TaskRegistry {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            deadline_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(DEADLINE_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    fn key(task_id: &str) -> String {
        task_id.to_lowercase()
    }

    #[instrument(skip(self, task), fields(task_id = %task.task_id))]
    pub async fn set(&self, task: &Task) -> RegistryResult<()> {
        let key = Self::key(&task.task_id);
        let payload = serde_json::to_vec(task).map_err(|e| RegistryError::Corrupt {
            task_id: key.clone(),
            source: e,
        })?;
        self.store.hset(TASKS_HASH, &key, &payload).await?;
        self.deadline_cache.lock().unwrap().put(key, task.deadline);
        Ok(())
    }

    /// Returns the task with `cancelled` populated from the set — the
    /// set is authoritative, not whatever was last written to the hash.
    pub async fn get(&self, task_id: &str) -> RegistryResult<Option<Task>> {
        let key = Self::key(task_id);
        let Some(bytes) = self.store.hget(TASKS_HASH, &key).await? else {
            return Ok(None);
        };
        let mut task: Task =
            serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupt { task_id: key.clone(), source: e })?;
        task.cancelled = self.store.sismember(CANCELLED_SET, &key).await?;
        Ok(Some(task))
    }

    /// Removes the hash entry and the cancelled-set entry. Not wrapped
    /// in a backend transaction (the substrate contract exposes no
    /// generic multi-key atomic primitive); a reader observing the
    /// window between the two writes sees a momentarily-inconsistent
    /// view, which §4.3 explicitly tolerates.
    pub async fn delete(&self, task_id: &str) -> RegistryResult<()> {
        let key = Self::key(task_id);
        self.store.hdel(TASKS_HASH, &key).await?;
        self.store.srem(CANCELLED_SET, &key).await?;
        self.deadline_cache.lock().unwrap().pop(&key);
        Ok(())
    }

    pub async fn mark_cancelled(&self, task_id: &str) -> RegistryResult<()> {
        let key = Self::key(task_id);
        self.store.sadd(CANCELLED_SET, &key).await?;
        crs_core::metrics::METRICS.inc_tasks_cancelled();
        Ok(())
    }

    pub async fn is_cancelled(&self, task_id: &str) -> RegistryResult<bool> {
        Ok(self.store.sismember(CANCELLED_SET, &Self::key(task_id)).await?)
    }

    pub async fn mark_successful(&self, task_id: &str) -> RegistryResult<()> {
        self.store.sadd(SUCCEEDED_SET, &Self::key(task_id)).await?;
        Ok(())
    }

    pub async fn is_successful(&self, task_id: &str) -> RegistryResult<bool> {
        Ok(self.store.sismember(SUCCEEDED_SET, &Self::key(task_id)).await?)
    }

    pub async fn mark_errored(&self, task_id: &str) -> RegistryResult<()> {
        self.store.sadd(ERRORED_SET, &Self::key(task_id)).await?;
        Ok(())
    }

    pub async fn is_errored(&self, task_id: &str) -> RegistryResult<bool> {
        Ok(self.store.sismember(ERRORED_SET, &Self::key(task_id)).await?)
    }

    async fn get_deadline(&self, task_id: &str) -> RegistryResult<Option<i64>> {
        let key = Self::key(task_id);
        if let Some(deadline) = self.deadline_cache.lock().unwrap().get(&key) {
            return Ok(Some(*deadline));
        }
        let Some(task) = self.get(task_id).await? else {
            return Ok(None);
        };
        self.deadline_cache.lock().unwrap().put(key, task.deadline);
        Ok(Some(task.deadline))
    }

    /// Tasks that do not exist are treated as not-expired, so callers
    /// never race a registry-delete into a false "should stop."
    pub async fn is_expired(&self, task_id: &str, delta_seconds: i64, now: i64) -> RegistryResult<bool> {
        match self.get_deadline(task_id).await? {
            Some(deadline) => Ok(deadline + delta_seconds <= now),
            None => Ok(false),
        }
    }

    /// Cancelled OR expired. `cancelled_ids`, if given, lets a caller
    /// amortize the cancelled-set lookup across many tasks in one tick
    /// instead of one `sismember` per task.
    pub async fn should_stop_processing(
        &self,
        task_id: &str,
        cancelled_ids: Option<&HashSet<String>>,
        now: i64,
    ) -> RegistryResult<bool> {
        let key = Self::key(task_id);
        let cancelled = match cancelled_ids {
            Some(set) => set.contains(&key),
            None => self.is_cancelled(task_id).await?,
        };
        if cancelled {
            return Ok(true);
        }
        self.is_expired(task_id, 0, now).await
    }

    /// One pass over every task, joined against the cancelled set.
    pub async fn iterate(&self) -> RegistryResult<Vec<Task>> {
        let entries = self.store.hgetall(TASKS_HASH).await?;
        let cancelled: HashSet<String> = self.store.smembers(CANCELLED_SET).await?.into_iter().collect();
        let mut out = Vec::with_capacity(entries.len());
        for (key, bytes) in entries {
            let mut task: Task =
                serde_json::from_slice(&bytes).map_err(|e| RegistryError::Corrupt { task_id: key.clone(), source: e })?;
            task.cancelled = cancelled.contains(&key);
            out.push(task);
        }
        Ok(out)
    }

    pub async fn get_live_tasks(&self, now: i64) -> RegistryResult<Vec<Task>> {
        let all = self.iterate().await?;
        let mut live = Vec::new();
        for task in all {
            if task.cancelled {
                continue;
            }
            if task.deadline <= now {
                continue;
            }
            live.push(task);
        }
        Ok(live)
    }

    pub async fn get_cancelled_task_ids(&self) -> RegistryResult<HashSet<String>> {
        Ok(self.store.smembers(CANCELLED_SET).await?.into_iter().collect())
    }

    pub async fn len(&self) -> RegistryResult<u64> {
        self.store.hlen(TASKS_HASH).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_core::domain::{TaskType};
    use crs_store::fakes::MemoryStore;

    fn task(id: &str, deadline: i64) -> Task {
        Task {
            task_id: id.to_string(),
            project_name: "libpng".to_string(),
            deadline,
            task_type: TaskType::Full,
            sources: vec![],
            cancelled: false,
        }
    }

    fn registry() -> TaskRegistry {
        TaskRegistry::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn get_reflects_cancelled_set_authoritatively() {
        let reg = registry();
        reg.set(&task("T1", 1000)).await.unwrap();
        assert!(!reg.get("T1").await.unwrap().unwrap().cancelled);
        reg.mark_cancelled("T1").await.unwrap();
        assert!(reg.get("T1").await.unwrap().unwrap().cancelled);
        assert!(reg.is_cancelled("t1").await.unwrap());
    }

    #[tokio::test]
    async fn missing_task_is_never_expired() {
        let reg = registry();
        assert!(!reg.is_expired("ghost", 0, 999_999_999).await.unwrap());
    }

    #[tokio::test]
    async fn should_stop_processing_is_monotone_until_delete() {
        let reg = registry();
        reg.set(&task("T1", 50)).await.unwrap();
        assert!(!reg.should_stop_processing("T1", None, 10).await.unwrap());
        assert!(reg.should_stop_processing("T1", None, 60).await.unwrap());
        // once expired, stays true for any later "now"
        assert!(reg.should_stop_processing("T1", None, 1000).await.unwrap());
        reg.delete("T1").await.unwrap();
        // post-delete the task no longer exists; treated as not-expired,
        // but this is a distinct lifecycle phase from "should stop."
        assert!(!reg.is_expired("T1", 0, 1000).await.unwrap());
    }

    #[tokio::test]
    async fn get_live_tasks_excludes_cancelled_and_expired() {
        let reg = registry();
        reg.set(&task("T1", 1000)).await.unwrap();
        reg.set(&task("T2", 1000)).await.unwrap();
        reg.set(&task("T3", 10)).await.unwrap();
        reg.mark_cancelled("T2").await.unwrap();
        let live = reg.get_live_tasks(500).await.unwrap();
        let ids: HashSet<_> = live.iter().map(|t| t.task_id.clone()).collect();
        assert_eq!(ids, HashSet::from(["T1".to_string()]));
    }

    proptest::proptest! {
        #[test]
        fn should_stop_processing_never_reverts_to_false(deadline in 0i64..10_000, now_a in 0i64..20_000, now_b in 0i64..20_000) {
            let (earlier, later) = if now_a <= now_b { (now_a, now_b) } else { (now_b, now_a) };
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let reg = registry();
                reg.set(&task("T1", deadline)).await.unwrap();
                let was_stopping = reg.should_stop_processing("T1", None, earlier).await.unwrap();
                let is_stopping = reg.should_stop_processing("T1", None, later).await.unwrap();
                if was_stopping {
                    assert!(is_stopping);
                }
            });
        }
    }
}
