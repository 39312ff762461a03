//! Crate-wide error type shared by domain validation across the workspace.
//!
//! Each storage/component crate defines its own narrower error enum at
//! its boundary (`crs_store::StoreError`, `crs_queue::QueueError`, …);
//! `CrsError` is for violations of the data model itself (§7 "contract
//! violation") that any crate depending on `crs-core` may need to raise.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CrsError {
    /// A programmer error: an invariant of the data model was violated.
    /// Per §7 this is fatal and should be raised, not retried.
    #[error("contract violation: {0}")]
    ContractViolation(String),

    #[error("serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),
}
