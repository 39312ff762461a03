use thiserror::Error;

#[derive(Error, Debug)]
pub enum SubmissionError {
    #[error(transparent)]
    Store(#[from] crs_store::StoreError),

    #[error(transparent)]
    Registry(#[from] crs_registry::RegistryError),

    #[error("malformed key: {0}")]
    MalformedKey(String),

    #[error("unknown submission status: {0}")]
    UnknownStatus(String),

    /// The competition API external collaborator failed (§6). Never a
    /// contract violation; callers leave the underlying queue entry
    /// unacked and retry, or, for bundles, just skip this tick.
    #[error("competition api error: {0}")]
    Api(String),
}

pub type SubmissionResult<T> = Result<T, SubmissionError>;
