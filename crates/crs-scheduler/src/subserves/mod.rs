pub mod build_output;
pub mod bundles;
pub mod cancellation;
pub mod crash_dedup;
pub mod patches;
pub mod ready_task;
pub mod vulnerabilities;

pub use build_output::BuildOutputSubserve;
pub use bundles::BundleSubmissionSubserve;
pub use cancellation::CancellationSubserve;
pub use crash_dedup::CrashDedupSubserve;
pub use patches::PatchSubmissionSubserve;
pub use ready_task::ReadyTaskSubserve;
pub use vulnerabilities::VulnerabilitySubmissionSubserve;
