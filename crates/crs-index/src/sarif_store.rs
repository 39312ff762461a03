//! Append-only SARIF blob list per task (§6, §12). Referenced in the
//! external-interfaces contract as `sarif:{task_id_lowercase}` but left
//! unspecified operationally; supplemented from the original's
//! `sarif_store.py`.

use std::sync::Arc;

use crs_store::Store;

use crate::error::IndexResult;

fn key(task_id: &str) -> String {
    format!("sarif:{}", task_id.to_lowercase())
}

pub struct SarifStore {
    store: Arc<dyn Store>,
}

impl SarifStore {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn append(&self, task_id: &str, sarif_json: &serde_json::Value) -> IndexResult<()> {
        let payload = serde_json::to_vec(sarif_json)?;
        self.store.rpush(&key(task_id), &payload).await?;
        Ok(())
    }

    pub async fn list(&self, task_id: &str) -> IndexResult<Vec<serde_json::Value>> {
        let blobs = self.store.lrange_all(&key(task_id)).await?;
        let mut out = Vec::with_capacity(blobs.len());
        for blob in blobs {
            out.push(serde_json::from_slice(&blob)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;
    use serde_json::json;

    #[tokio::test]
    async fn append_is_order_preserving() {
        let store = SarifStore::new(Arc::new(MemoryStore::new()));
        store.append("T1", &json!({"rule": "a"})).await.unwrap();
        store.append("T1", &json!({"rule": "b"})).await.unwrap();
        let all = store.list("T1").await.unwrap();
        assert_eq!(all, vec![json!({"rule": "a"}), json!({"rule": "b"})]);
    }
}
