//! Sub-serve 2 (§4.7): build-output indexing. Grounded on
//! `scheduler.py`'s `serve_build_output` / `process_build_output`.

use std::path::PathBuf;
use std::sync::Arc;

use tracing::{error, info};

use crs_core::domain::{BuildOutput, BuildType, WeightedHarness};
use crs_index::{BuildMap, HarnessWeights};
use crs_queue::{drop_if_poison, ReliableQueue};

use crate::external::FuzzTargetLister;

pub struct BuildOutputSubserve {
    build_output_queue: Arc<ReliableQueue<BuildOutput>>,
    build_map: Arc<BuildMap>,
    harness_weights: Arc<HarnessWeights>,
    target_lister: Arc<dyn FuzzTargetLister>,
    poison_threshold: u64,
}

impl BuildOutputSubserve {
    pub fn new(
        build_output_queue: Arc<ReliableQueue<BuildOutput>>,
        build_map: Arc<BuildMap>,
        harness_weights: Arc<HarnessWeights>,
        target_lister: Arc<dyn FuzzTargetLister>,
        poison_threshold: u64,
    ) -> Self {
        Self { build_output_queue, build_map, harness_weights, target_lister, poison_threshold }
    }

    pub async fn serve(&self) -> anyhow::Result<bool> {
        let Some(item) = self.build_output_queue.pop().await? else {
            return Ok(false);
        };

        if drop_if_poison(&self.build_output_queue, &item.item_id, self.poison_threshold).await? {
            return Ok(true);
        }

        let build_output = item.deserialized;
        info!(
            task_id = %build_output.task_id, package = %build_output.package_name,
            engine = %build_output.engine, sanitizer = %build_output.sanitizer,
            "processing build output",
        );

        match self.process(&build_output).await {
            Ok(count) => {
                self.build_output_queue.ack(&item.item_id).await?;
                info!(task_id = %build_output.task_id, harnesses = count, "indexed build output");
                Ok(true)
            }
            Err(e) => {
                error!(task_id = %build_output.task_id, error = %e, "failed to index build output");
                Ok(false)
            }
        }
    }

    async fn process(&self, build_output: &BuildOutput) -> anyhow::Result<usize> {
        self.build_map.add_build(build_output).await?;

        if build_output.build_type != BuildType::Fuzzer {
            return Ok(0);
        }

        let build_dir = PathBuf::from(&build_output.task_dir)
            .join("build")
            .join("out")
            .join(&build_output.package_name);
        let targets = self.target_lister.list_targets(&build_dir.to_string_lossy());

        for target in &targets {
            self.harness_weights
                .push_harness(&WeightedHarness {
                    task_id: build_output.task_id.clone(),
                    package_name: build_output.package_name.clone(),
                    harness_name: target.clone(),
                    weight: 1.0,
                })
                .await?;
        }
        Ok(targets.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;
    use crs_store::Store;

    struct FixedLister(Vec<String>);
    impl FuzzTargetLister for FixedLister {
        fn list_targets(&self, _build_dir: &str) -> Vec<String> {
            self.0.clone()
        }
    }

    async fn setup(lister: Arc<dyn FuzzTargetLister>) -> BuildOutputSubserve {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let queue = Arc::new(ReliableQueue::new(store.clone(), "build_output", "scheduler_build_output", "c1", 1000, None).await.unwrap());
        BuildOutputSubserve::new(queue, Arc::new(BuildMap::new(store.clone())), Arc::new(HarnessWeights::new(store)), lister, 10)
    }

    fn build(build_type: BuildType) -> BuildOutput {
        BuildOutput {
            task_id: "T1".into(),
            build_type,
            sanitizer: "address".into(),
            engine: "libfuzzer".into(),
            package_name: "libpng".into(),
            internal_patch_id: String::new(),
            task_dir: "/out".into(),
        }
    }

    #[tokio::test]
    async fn non_fuzzer_build_is_indexed_without_listing_targets() {
        let s = setup(Arc::new(FixedLister(vec!["ignored".into()]))).await;
        s.build_output_queue.push(&build(BuildType::Coverage)).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert!(s.harness_weights.list_harnesses().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn fuzzer_build_pushes_weighted_harnesses() {
        let s = setup(Arc::new(FixedLister(vec!["fuzz_png".into(), "fuzz_read".into()]))).await;
        s.build_output_queue.push(&build(BuildType::Fuzzer)).await.unwrap();
        assert!(s.serve().await.unwrap());
        let harnesses = s.harness_weights.list_harnesses().await.unwrap();
        assert_eq!(harnesses.len(), 2);
    }
}
