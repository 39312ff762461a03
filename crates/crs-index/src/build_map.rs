//! `BuildMap`: indexed lookup for build artifacts, grounded on the
//! original's `BuildMap`.

use std::sync::Arc;

use crs_core::canonical::{build_output_key, build_san_set_key};
use crs_core::domain::{BuildOutput, BuildType};
use crs_store::Store;
use tracing::instrument;

use crate::error::{IndexError, IndexResult};

pub struct BuildMap {
    store: Arc<dyn Store>,
}

impl BuildMap {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// `sadd`s the sanitizer onto `(task, build_type)`'s set, then
    /// writes the output record. These are two separate writes (no
    /// cross-key transaction on the substrate); `get_builds` tolerates
    /// the crash-between-writes case by skipping missing entries.
    #[instrument(skip(self, build), fields(task_id = %build.task_id, build_type = ?build.build_type))]
    pub async fn add_build(&self, build: &BuildOutput) -> IndexResult<()> {
        build.check_invariant().map_err(|e| IndexError::Store(crs_store::StoreError::Backend(e.to_string())))?;
        let san_set = build_san_set_key(&build.task_id, build.build_type.as_str());
        self.store.sadd(&san_set, &build.sanitizer).await?;
        let output_key = build_output_key(
            &build.task_id,
            build.build_type.as_str(),
            &build.sanitizer,
            &build.internal_patch_id,
        );
        let payload = serde_json::to_vec(build)?;
        self.store.set(&output_key, &payload).await?;
        Ok(())
    }

    /// Enumerates the sanitizer set then reads each output; missing
    /// entries are silently skipped.
    pub async fn get_builds(
        &self,
        task_id: &str,
        build_type: BuildType,
        patch_id: &str,
    ) -> IndexResult<Vec<BuildOutput>> {
        if matches!(build_type, BuildType::Patch) && patch_id.is_empty() {
            return Err(IndexError::MissingPatchId);
        }
        let san_set = build_san_set_key(task_id, build_type.as_str());
        let sanitizers = self.store.smembers(&san_set).await?;
        let mut out = Vec::new();
        for sanitizer in sanitizers {
            let key = build_output_key(task_id, build_type.as_str(), &sanitizer, patch_id);
            if let Some(bytes) = self.store.get(&key).await? {
                out.push(serde_json::from_slice(&bytes)?);
            }
        }
        Ok(out)
    }

    pub async fn get_build_from_san(
        &self,
        task_id: &str,
        build_type: BuildType,
        sanitizer: &str,
        patch_id: &str,
    ) -> IndexResult<Option<BuildOutput>> {
        if matches!(build_type, BuildType::Patch) && patch_id.is_empty() {
            return Err(IndexError::MissingPatchId);
        }
        let key = build_output_key(task_id, build_type.as_str(), sanitizer, patch_id);
        match self.store.get(&key).await? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;

    fn build(sanitizer: &str, patch_id: &str, build_type: BuildType) -> BuildOutput {
        BuildOutput {
            task_id: "T1".into(),
            build_type,
            sanitizer: sanitizer.into(),
            engine: "libfuzzer".into(),
            package_name: "libpng".into(),
            internal_patch_id: patch_id.into(),
            task_dir: "/out".into(),
        }
    }

    #[tokio::test]
    async fn get_builds_tolerates_missing_output_entry() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let map = BuildMap::new(store.clone());
        map.add_build(&build("address", "", BuildType::Fuzzer)).await.unwrap();
        // simulate a crash between the two writes: sanitizer registered, output missing.
        let san_set = build_san_set_key("T1", "FUZZER");
        store.sadd(&san_set, "memory").await.unwrap();

        let builds = map.get_builds("T1", BuildType::Fuzzer, "").await.unwrap();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].sanitizer, "address");
    }

    #[tokio::test]
    async fn patch_build_requires_non_empty_patch_id() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let map = BuildMap::new(store);
        let err = map.get_builds("T1", BuildType::Patch, "").await.unwrap_err();
        assert!(matches!(err, IndexError::MissingPatchId));
    }

    #[tokio::test]
    async fn add_build_rejects_contract_violation() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let map = BuildMap::new(store);
        let bad = build("address", "P1", BuildType::Fuzzer); // patch id set on a non-PATCH build
        assert!(map.add_build(&bad).await.is_err());
    }
}
