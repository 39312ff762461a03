//! The data model of the work-coordination substrate.
//!
//! Every type here is a plain, serializable record; none owns a
//! connection or performs I/O. Canonical key encoding lives in
//! [`crate::canonical`].

use serde::{Deserialize, Serialize};

/// A challenge task: the unit of work a target project is evaluated under.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    /// Opaque id, case-normalized (lower-cased) whenever used as a storage key.
    pub task_id: String,
    pub project_name: String,
    /// Epoch-seconds deadline.
    pub deadline: i64,
    pub task_type: TaskType,
    pub sources: Vec<TaskSource>,
    /// Derived from the cancelled set; never itself persisted in the task hash.
    #[serde(skip_serializing, default)]
    pub cancelled: bool,
}

impl Task {
    /// The storage key this task is addressed by: its id, lower-cased.
    pub fn storage_key(&self) -> String {
        self.task_id.to_lowercase()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TaskType {
    Full,
    Delta,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSource {
    pub url: String,
    pub sha256: String,
}

/// One build artifact produced for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildOutput {
    pub task_id: String,
    pub build_type: BuildType,
    pub sanitizer: String,
    pub engine: String,
    pub package_name: String,
    /// Empty unless `build_type == Patch`.
    pub internal_patch_id: String,
    pub task_dir: String,
}

impl BuildOutput {
    /// `internal_patch_id` non-empty iff `build_type == Patch`.
    pub fn check_invariant(&self) -> Result<(), crate::error::CrsError> {
        let has_patch_id = !self.internal_patch_id.is_empty();
        let is_patch = matches!(self.build_type, BuildType::Patch);
        if has_patch_id != is_patch {
            return Err(crate::error::CrsError::ContractViolation(format!(
                "build_type={:?} but internal_patch_id={:?}",
                self.build_type, self.internal_patch_id
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildType {
    Fuzzer,
    Coverage,
    TracerNoDiff,
    Patch,
}

impl BuildType {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildType::Fuzzer => "FUZZER",
            BuildType::Coverage => "COVERAGE",
            BuildType::TracerNoDiff => "TRACER_NO_DIFF",
            BuildType::Patch => "PATCH",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedHarness {
    pub task_id: String,
    pub package_name: String,
    pub harness_name: String,
    pub weight: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionCoverage {
    pub function_name: String,
    /// Kept sorted and de-duplicated by the writer.
    pub function_paths: Vec<String>,
    pub total_lines: u64,
    pub covered_lines: u64,
}

impl FunctionCoverage {
    pub fn normalized(mut self) -> Self {
        self.function_paths.sort();
        self.function_paths.dedup();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crash {
    pub harness_name: String,
    pub crash_input_path: String,
    pub target: BuildOutput,
    pub stacktrace: String,
    pub crash_token: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TracedCrash {
    pub crash: Crash,
    pub tracer_stacktrace: String,
}

/// `(task_id, internal_patch_id, pov_path, sanitizer, harness_name)`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PovReproduceRequest {
    pub task_id: String,
    pub internal_patch_id: String,
    pub pov_path: String,
    pub sanitizer: String,
    pub harness_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PovReproduceResponse {
    pub request: PovReproduceRequest,
    pub did_crash: bool,
}

/// One submission's lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SubmissionResult {
    Pending,
    Accepted,
    Passed,
    Failed,
    Errored,
    DeadlineExceeded,
}

impl SubmissionResult {
    /// Terminal statuses: no further transition is expected.
    pub const TERMINAL: [SubmissionResult; 4] = [
        SubmissionResult::Passed,
        SubmissionResult::Failed,
        SubmissionResult::Errored,
        SubmissionResult::DeadlineExceeded,
    ];

    pub fn is_terminal(self) -> bool {
        Self::TERMINAL.contains(&self)
    }
}

/// Groups one vulnerability family's crashes, patches, and bundles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionEntry {
    pub crashes: Vec<String>,
    pub patches: Vec<String>,
    pub bundles: Vec<String>,
}

/// A reliable-queue item as handed back to a consumer.
#[derive(Debug, Clone, PartialEq)]
pub struct RqItem<T> {
    /// Stream-assigned id, opaque and ordered within a single stream.
    pub item_id: String,
    pub deserialized: T,
    pub consumer_name: Option<String>,
}

/// A bundle ready for submission: task, vulnerability, and patch id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReadyBundle {
    pub task_id: String,
    pub vuln_id: String,
    pub patch_id: String,
}

// -- Scheduler message payloads (§6) -----------------------------------
//
// Everything below is pushed/popped off the named streams of §6;
// unlike the data-model types above these are transient wire messages,
// never persisted by key in the substrate itself.

/// Signals that a downloaded task is ready for build-request fan-out.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskReady {
    pub task: Task,
}

/// Requests that a task be marked cancelled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDelete {
    pub task_id: String,
}

/// One needed build variant, emitted by the ready-task sub-serve and
/// consumed by build workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BuildRequest {
    pub task_id: String,
    pub package_name: String,
    pub engine: String,
    pub sanitizer: String,
    pub build_type: BuildType,
    pub source_path: String,
    pub ossfuzz_path: String,
    /// Non-empty iff `build_type == Patch`, mirroring [`BuildOutput`].
    pub internal_patch_id: String,
}

/// A crash confirmed unique and forwarded to the competition API,
/// paired with the vuln id the API assigned.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfirmedVulnerability {
    pub task_id: String,
    pub vuln_id: String,
    pub crash: Crash,
}

/// A patch produced by the (opaque) patcher, not yet submitted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patch {
    pub task_id: String,
    pub vuln_id: String,
    pub diff: String,
}

/// Request to the (opaque) static-analysis indexer. Only its queue
/// contract is in scope; the core never inspects the payload further.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRequest {
    pub task_id: String,
    pub source_path: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexOutput {
    pub task_id: String,
    pub index_path: String,
}
