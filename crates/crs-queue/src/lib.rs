//! Reliable Queue (C2): at-least-once queues over streams with groups,
//! consumer names, auto-claim, and delivery counts, grounded on the
//! original's `ReliableQueue` / `RQItem`.

pub mod error;

use std::marker::PhantomData;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, instrument};

use crs_core::RqItem;
use crs_store::{MkStream, Store};

pub use error::{QueueError, QueueResult};

/// A named append-only stream with a single default consumer group.
/// Producers `push`; consumers `pop`, then either `ack` or leave the
/// item for another consumer to reclaim via autoclaim.
pub struct ReliableQueue<T> {
    store: Arc<dyn Store>,
    stream: String,
    group: String,
    consumer: String,
    /// Also used as `min_idle_ms` for autoclaim, per §4.2.
    task_timeout_ms: u64,
    /// `None` = non-blocking, used by the scheduler's multiplex loop.
    block_ms: Option<u64>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ReliableQueue<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Construct a queue bound to `stream`/`group`, creating the group
    /// (and stream) if needed. `consumer` should be stable across
    /// restarts of the same logical worker so in-flight entries remain
    /// attributable and reclaimable.
    pub async fn new(
        store: Arc<dyn Store>,
        stream: impl Into<String>,
        group: impl Into<String>,
        consumer: impl Into<String>,
        task_timeout_ms: u64,
        block_ms: Option<u64>,
    ) -> QueueResult<Self> {
        let stream = stream.into();
        let group = group.into();
        store
            .stream_create_group(&stream, &group, MkStream::Create)
            .await?;
        Ok(Self {
            store,
            stream,
            group,
            consumer: consumer.into(),
            task_timeout_ms,
            block_ms,
            _marker: PhantomData,
        })
    }

    #[instrument(skip(self, msg), fields(stream = %self.stream))]
    pub async fn push(&self, msg: &T) -> QueueResult<String> {
        let payload = serde_json::to_vec(msg).map_err(|e| QueueError::MalformedPayload {
            queue: self.stream.clone(),
            item_id: "<new>".to_string(),
            source: e,
        })?;
        let id = self.store.stream_add(&self.stream, &payload).await?;
        crs_core::metrics::METRICS.inc_queue_pushed();
        Ok(id)
    }

    /// Two-phase pop: an unseen entry first, then autoclaim a stale one
    /// from any consumer. `Ok(None)` if both phases are empty.
    #[instrument(skip(self), fields(stream = %self.stream, consumer = %self.consumer))]
    pub async fn pop(&self) -> QueueResult<Option<RqItem<T>>> {
        let mut entries = self
            .store
            .stream_read_group(&self.stream, &self.group, &self.consumer, 1, self.block_ms)
            .await?;

        if entries.is_empty() {
            entries = self
                .store
                .stream_autoclaim(
                    &self.stream,
                    &self.group,
                    &self.consumer,
                    self.task_timeout_ms,
                    "0",
                    1,
                )
                .await?;
            if !entries.is_empty() {
                crs_core::metrics::METRICS.inc_queue_autoclaimed();
                debug!(stream = %self.stream, "reclaimed entry via autoclaim");
            }
        }

        let Some(entry) = entries.into_iter().next() else {
            return Ok(None);
        };

        let deserialized: T =
            serde_json::from_slice(&entry.payload).map_err(|e| QueueError::MalformedPayload {
                queue: self.stream.clone(),
                item_id: entry.id.clone(),
                source: e,
            })?;

        crs_core::metrics::METRICS.inc_queue_popped();
        Ok(Some(RqItem {
            item_id: entry.id,
            deserialized,
            consumer_name: Some(self.consumer.clone()),
        }))
    }

    pub async fn ack(&self, item_id: &str) -> QueueResult<()> {
        self.store.stream_ack(&self.stream, &self.group, item_id).await?;
        crs_core::metrics::METRICS.inc_queue_acked();
        Ok(())
    }

    pub async fn times_delivered(&self, item_id: &str) -> QueueResult<Option<u64>> {
        Ok(self
            .store
            .stream_pending_count(&self.stream, &self.group, item_id)
            .await?)
    }

    /// Approximate stream length, including unacked entries.
    pub async fn size(&self) -> QueueResult<u64> {
        Ok(self.store.stream_len(&self.stream).await?)
    }

    pub fn consumer_name(&self) -> &str {
        &self.consumer
    }
}

/// Ack-and-drop a poison message once its delivery count crosses
/// `threshold` (§9, §12). Returns `true` if the message was dropped.
pub async fn drop_if_poison<T>(
    queue: &ReliableQueue<T>,
    item_id: &str,
    threshold: u64,
) -> QueueResult<bool>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    if let Some(count) = queue.times_delivered(item_id).await? {
        if count > threshold {
            crs_core::obs::emit_queue_poison_dropped(&queue.stream, item_id, count);
            crs_core::metrics::METRICS.inc_queue_dropped_poison();
            queue.ack(item_id).await?;
            return Ok(true);
        }
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;
    use serde::Deserialize;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Msg {
        value: String,
    }

    async fn queue(consumer: &str) -> ReliableQueue<Msg> {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        ReliableQueue::new(store, "q", "g", consumer, 1000, None)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn push_then_pop_returns_the_message() {
        let q = queue("c1").await;
        q.push(&Msg { value: "hello".into() }).await.unwrap();
        let item = q.pop().await.unwrap().expect("expected an item");
        assert_eq!(item.deserialized.value, "hello");
        q.ack(&item.item_id).await.unwrap();
    }

    #[tokio::test]
    async fn pop_on_empty_queue_returns_none() {
        let q = queue("c1").await;
        assert!(q.pop().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn shared_stream_two_consumers_autoclaim_recovers_dead_consumer() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let consumer_a = ReliableQueue::<Msg>::new(store.clone(), "q", "g", "a", 0, None)
            .await
            .unwrap();
        let consumer_b = ReliableQueue::<Msg>::new(store.clone(), "q", "g", "b", 0, None)
            .await
            .unwrap();

        consumer_a.push(&Msg { value: "x".into() }).await.unwrap();
        let picked_up = consumer_a.pop().await.unwrap().unwrap();
        // consumer_a "dies" without acking.
        let reclaimed = consumer_b.pop().await.unwrap().unwrap();
        assert_eq!(reclaimed.item_id, picked_up.item_id);
        assert_eq!(consumer_b.times_delivered(&reclaimed.item_id).await.unwrap(), Some(2));
        consumer_b.ack(&reclaimed.item_id).await.unwrap();
    }

    #[tokio::test]
    async fn poison_message_dropped_above_threshold() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let q = ReliableQueue::<Msg>::new(store, "q", "g", "a", 0, None).await.unwrap();
        q.push(&Msg { value: "x".into() }).await.unwrap();
        let mut item_id = q.pop().await.unwrap().unwrap().item_id;
        for _ in 0..5 {
            item_id = q.pop().await.unwrap().map(|i| i.item_id).unwrap_or(item_id);
        }
        assert!(drop_if_poison(&q, &item_id, 2).await.unwrap());
        assert_eq!(q.times_delivered(&item_id).await.unwrap(), None);
    }
}
