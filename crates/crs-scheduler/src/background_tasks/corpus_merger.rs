//! Corpus merger background task: for each weighted harness, take the
//! per-`(task, harness)` merge lock and, if acquired, run the external
//! merge command against a `FUZZER` build. Grounded on
//! `corpus_merger.py`'s `MergerBot.run_task`, with the actual merge
//! logic (corpus diffing, libFuzzer `-merge=1`) out of scope (§1) and
//! represented here as an opaque external command.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rand::seq::SliceRandom;
use tracing::{debug, info, warn};

use crs_core::domain::BuildType;
use crs_index::{BuildMap, HarnessWeights};
use crs_store::lock::try_lock;
use crs_store::Store;

use crate::background::BackgroundTask;

const ADDRESS_SANITIZER: &str = "address";

/// Skip merging when the local corpus is too small to be worth the
/// lock-and-run overhead.
const MERGE_LIMIT_COUNT: u64 = 100;

pub struct CorpusMergerTask {
    store: Arc<dyn Store>,
    harness_weights: Arc<HarnessWeights>,
    builds: Arc<BuildMap>,
    merge_lock_ttl_secs: u64,
    merge_command: String,
    merge_timeout: Duration,
}

impl CorpusMergerTask {
    pub fn new(
        store: Arc<dyn Store>,
        harness_weights: Arc<HarnessWeights>,
        builds: Arc<BuildMap>,
        merge_lock_ttl_secs: u64,
        merge_command: String,
        merge_timeout: Duration,
    ) -> Self {
        Self { store, harness_weights, builds, merge_lock_ttl_secs, merge_command, merge_timeout }
    }

    fn lock_key(task_id: &str, harness_name: &str) -> String {
        format!("merge_lock:{task_id}:{harness_name}")
    }

    async fn corpus_count(&self, task_id: &str, harness_name: &str) -> anyhow::Result<u64> {
        Ok(self.store.scard(&format!("corpus:{task_id}:{harness_name}")).await?)
    }
}

#[async_trait]
impl BackgroundTask for CorpusMergerTask {
    fn name(&self) -> &str {
        "corpus-merger"
    }

    async fn execute(&self) -> anyhow::Result<bool> {
        let harnesses = self.harness_weights.list_harnesses().await?;
        let Some(harness) = harnesses.choose(&mut rand::thread_rng()) else {
            return Ok(false);
        };

        let corpus_count = self.corpus_count(&harness.task_id, &harness.harness_name).await?;
        if corpus_count < MERGE_LIMIT_COUNT {
            debug!(
                task_id = %harness.task_id, harness = %harness.harness_name,
                "skipping merge, corpus too small",
            );
            return Ok(false);
        }

        let lock_key = Self::lock_key(&harness.task_id, &harness.harness_name);
        let Some(_guard) = try_lock(&self.store, &lock_key, self.merge_lock_ttl_secs).await? else {
            debug!(task_id = %harness.task_id, harness = %harness.harness_name, "merge already in progress elsewhere");
            return Ok(false);
        };

        let builds = self.builds.get_builds(&harness.task_id, BuildType::Fuzzer, "").await?;
        let build = builds
            .iter()
            .find(|b| b.sanitizer == ADDRESS_SANITIZER)
            .or_else(|| builds.choose(&mut rand::thread_rng()));
        let Some(build) = build else {
            warn!(task_id = %harness.task_id, "no fuzzer build available for merge");
            return Ok(false);
        };

        info!(task_id = %harness.task_id, harness = %harness.harness_name, "running merge pass");
        let cmd = vec![
            self.merge_command.clone(),
            build.task_dir.clone(),
            harness.harness_name.clone(),
        ];
        let result = crs_runner::run(&cmd, &build.task_dir, self.merge_timeout).await?;
        if !result.success {
            warn!(task_id = %harness.task_id, harness = %harness.harness_name, "merge command failed");
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_core::domain::{BuildOutput, WeightedHarness};
    use crs_store::fakes::MemoryStore;

    #[tokio::test]
    async fn empty_harness_weights_reports_no_work() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let task = CorpusMergerTask::new(
            store.clone(),
            Arc::new(HarnessWeights::new(store.clone())),
            Arc::new(BuildMap::new(store)),
            900,
            "/bin/true".into(),
            Duration::from_secs(5),
        );
        assert!(!task.execute().await.unwrap());
    }

    #[tokio::test]
    async fn small_corpus_is_skipped() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let harness_weights = Arc::new(HarnessWeights::new(store.clone()));
        harness_weights
            .push_harness(&WeightedHarness {
                task_id: "T1".into(),
                package_name: "libpng".into(),
                harness_name: "fuzz_png".into(),
                weight: 1.0,
            })
            .await
            .unwrap();
        let builds = Arc::new(BuildMap::new(store.clone()));
        builds
            .add_build(&BuildOutput {
                task_id: "T1".into(),
                build_type: BuildType::Fuzzer,
                sanitizer: ADDRESS_SANITIZER.into(),
                engine: "libfuzzer".into(),
                package_name: "libpng".into(),
                internal_patch_id: String::new(),
                task_dir: "/out".into(),
            })
            .await
            .unwrap();

        let task = CorpusMergerTask::new(store, harness_weights, builds, 900, "/bin/true".into(), Duration::from_secs(5));
        assert!(!task.execute().await.unwrap());
    }
}
