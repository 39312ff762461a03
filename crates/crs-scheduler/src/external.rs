//! Scheduler-owned external-collaborator contracts: crash
//! deduplication, fuzz-target discovery under a build output
//! directory, and a fabricated competition API for mock-mode local
//! development (grounded on the original's `mock_competition_api`).

use std::path::Path;

use async_trait::async_trait;
use tracing::debug;

use crs_core::domain::{Crash, SubmissionResult as Status};
use crs_submission::{ApiSubmissionResponse, CompetitionApi, SubmissionResult};

/// Stack-based crash deduplication (out of scope per §1: "stack
/// parsing... out of scope"). The trait lets the scheduler plug in a
/// real implementation later without touching the sub-serve; the
/// default treats every crash as unique, matching the original's
/// literal TODO.
pub trait CrashDeduper: Send + Sync {
    fn dedup(&self, crash: &Crash) -> Option<Crash>;
}

#[derive(Default)]
pub struct IdentityCrashDeduper;

impl CrashDeduper for IdentityCrashDeduper {
    fn dedup(&self, crash: &Crash) -> Option<Crash> {
        Some(crash.clone())
    }
}

/// Enumerates fuzz target binaries under a `FUZZER` build's output
/// directory, grounded on ClusterFuzz's `get_fuzz_targets`: regular,
/// executable files directly under the directory, excluding known
/// non-harness artifacts.
pub trait FuzzTargetLister: Send + Sync {
    fn list_targets(&self, build_dir: &str) -> Vec<String>;
}

#[derive(Default)]
pub struct FilesystemFuzzTargetLister;

const EXCLUDED_SUFFIXES: &[&str] = &[".so", ".options", ".sh", ".par", ".json", ".zip"];
const EXCLUDED_NAMES: &[&str] = &["llvm-symbolizer", "sancov"];

impl FuzzTargetLister for FilesystemFuzzTargetLister {
    fn list_targets(&self, build_dir: &str) -> Vec<String> {
        let dir = Path::new(build_dir);
        let Ok(entries) = std::fs::read_dir(dir) else {
            debug!(build_dir, "build output directory not found while listing fuzz targets");
            return Vec::new();
        };

        let mut targets = Vec::new();
        for entry in entries.flatten() {
            let Ok(file_type) = entry.file_type() else { continue };
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().into_owned();
            if EXCLUDED_NAMES.contains(&name.as_str()) {
                continue;
            }
            if EXCLUDED_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
                continue;
            }
            if !is_executable(&entry.path()) {
                continue;
            }
            targets.push(name);
        }
        targets.sort();
        targets
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|meta| meta.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> bool {
    true
}

/// Fabricates `ACCEPTED` responses with a random id for every
/// submission, standing in for a real competition API endpoint in
/// local/mock-mode runs (§9's `mock_competition_api` contract).
pub struct MockCompetitionApi;

#[async_trait]
impl CompetitionApi for MockCompetitionApi {
    async fn submit_crash(&self, task_id: &str, crash: &Crash) -> SubmissionResult<ApiSubmissionResponse> {
        debug!(task_id, harness = %crash.harness_name, "mock competition api: submit_crash");
        Ok(ApiSubmissionResponse { status: Status::Accepted, id: uuid::Uuid::new_v4().to_string() })
    }

    async fn submit_patch(&self, task_id: &str, vuln_id: &str, _diff: &str) -> SubmissionResult<ApiSubmissionResponse> {
        debug!(task_id, vuln_id, "mock competition api: submit_patch");
        Ok(ApiSubmissionResponse { status: Status::Passed, id: uuid::Uuid::new_v4().to_string() })
    }

    async fn submit_bundle(&self, task_id: &str, vuln_id: &str, patch_id: &str) -> SubmissionResult<ApiSubmissionResponse> {
        debug!(task_id, vuln_id, patch_id, "mock competition api: submit_bundle");
        Ok(ApiSubmissionResponse { status: Status::Accepted, id: uuid::Uuid::new_v4().to_string() })
    }
}
