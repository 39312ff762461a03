//! `CoverageMap`: per-`(harness, package, task)` hash of function
//! coverage. Writers overwrite; readers enumerate; idempotent.

use std::sync::Arc;

use crs_core::canonical::{coverage_entry_key, coverage_map_name};
use crs_core::domain::FunctionCoverage;
use crs_store::Store;

use crate::error::IndexResult;

pub struct CoverageMap {
    store: Arc<dyn Store>,
}

impl CoverageMap {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn set_function_coverage(
        &self,
        harness: &str,
        package: &str,
        task: &str,
        coverage: FunctionCoverage,
    ) -> IndexResult<()> {
        let coverage = coverage.normalized();
        let hash_name = coverage_map_name(harness, package, task);
        let field = coverage_entry_key(&coverage.function_name, &coverage.function_paths);
        let payload = serde_json::to_vec(&coverage)?;
        self.store.hset(&hash_name, &field, &payload).await?;
        Ok(())
    }

    pub async fn get_function_coverage(
        &self,
        harness: &str,
        package: &str,
        task: &str,
        function_name: &str,
        function_paths: &[String],
    ) -> IndexResult<Option<FunctionCoverage>> {
        let hash_name = coverage_map_name(harness, package, task);
        let field = coverage_entry_key(function_name, function_paths);
        match self.store.hget(&hash_name, &field).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn list_function_coverage(
        &self,
        harness: &str,
        package: &str,
        task: &str,
    ) -> IndexResult<Vec<FunctionCoverage>> {
        let hash_name = coverage_map_name(harness, package, task);
        let entries = self.store.hgetall(&hash_name).await?;
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
    async fn writers_overwrite_same_function_key() {
        let map = CoverageMap::new(Arc::new(MemoryStore::new()));
        let cov = FunctionCoverage {
            function_name: "png_read".into(),
            function_paths: vec!["src/png.c".into()],
            total_lines: 100,
            covered_lines: 40,
        };
        map.set_function_coverage("fuzz_png", "libpng", "T1", cov.clone()).await.unwrap();
        let mut updated = cov.clone();
        updated.covered_lines = 60;
        map.set_function_coverage("fuzz_png", "libpng", "T1", updated).await.unwrap();

        let all = map.list_function_coverage("fuzz_png", "libpng", "T1").await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].covered_lines, 60);
    }
}
