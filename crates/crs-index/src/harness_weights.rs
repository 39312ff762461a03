//! `HarnessWeights`: a single hash of weighted harnesses, advisory
//! sampling inputs for the scheduler's steering decisions.

use std::sync::Arc;

use crs_core::canonical::harness_key;
use crs_core::domain::WeightedHarness;
use crs_store::Store;

use crate::error::IndexResult;

pub const HARNESS_WEIGHTS_HASH: &str = "harness_weights";

pub struct HarnessWeights {
    store: Arc<dyn Store>,
}

impl HarnessWeights {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn push_harness(&self, h: &WeightedHarness) -> IndexResult<()> {
        let key = harness_key(&h.package_name, &h.harness_name, &h.task_id);
        let payload = serde_json::to_vec(h)?;
        self.store.hset(HARNESS_WEIGHTS_HASH, &key, &payload).await?;
        Ok(())
    }

    pub async fn list_harnesses(&self) -> IndexResult<Vec<WeightedHarness>> {
        let entries = self.store.hgetall(HARNESS_WEIGHTS_HASH).await?;
        let mut out = Vec::with_capacity(entries.len());
        for (_, bytes) in entries {
            out.push(serde_json::from_slice(&bytes)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;

    #[tokio::test]
    async fn push_then_list_round_trips() {
        let weights = HarnessWeights::new(Arc::new(MemoryStore::new()));
        weights
            .push_harness(&WeightedHarness {
                task_id: "T1".into(),
                package_name: "libpng".into(),
                harness_name: "fuzz_png".into(),
                weight: 1.0,
            })
            .await
            .unwrap();
        let all = weights.list_harnesses().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].harness_name, "fuzz_png");
    }
}
