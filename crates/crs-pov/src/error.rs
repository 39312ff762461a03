use thiserror::Error;

#[derive(Error, Debug)]
pub enum PovError {
    #[error(transparent)]
    Store(#[from] crs_store::StoreError),

    #[error("pov key is malformed: {0}")]
    MalformedKey(#[from] serde_json::Error),
}

pub type PovResult<T> = Result<T, PovError>;
