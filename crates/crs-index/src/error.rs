use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] crs_store::StoreError),

    #[error("record is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),

    /// Programmer error: `get_build_from_san(Patch, ...)` called with an
    /// empty `patch_id`. Fatal per §7's contract-violation policy.
    #[error("patch_id must be non-empty when build_type is PATCH")]
    MissingPatchId,
}

pub type IndexResult<T> = Result<T, IndexError>;
