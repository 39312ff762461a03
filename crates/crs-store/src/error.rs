//! Errors for the key/value + stream substrate adapter.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// Transient backend error (connection blip, pool exhaustion). Per
    /// §7 the caller should leave any in-flight queue item unacked and
    /// retry; this variant never represents data loss.
    #[error("store backend error: {0}")]
    Backend(String),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("consumer group {group} already exists on stream {stream}")]
    GroupExists { stream: String, group: String },

    #[error("no such stream entry: {stream}/{id}")]
    NoSuchEntry { stream: String, id: String },
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(err: deadpool_redis::PoolError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Serialization(err.to_string())
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
