use thiserror::Error;

#[derive(Error, Debug)]
pub enum QueueError {
    #[error(transparent)]
    Store(#[from] crs_store::StoreError),

    /// Parse/schema mismatch on a payload (§7). The caller decides
    /// whether to ack-and-drop or leave the item pending; this crate
    /// never does either on its own.
    #[error("malformed payload on {queue} item {item_id}: {source}")]
    MalformedPayload {
        queue: String,
        item_id: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type QueueResult<T> = Result<T, QueueError>;
