use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error(transparent)]
    Store(#[from] crs_store::StoreError),

    #[error("task record for {task_id} is corrupt: {source}")]
    Corrupt {
        task_id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type RegistryResult<T> = Result<T, RegistryError>;
