//! In-memory fake of [`Store`] for tests — stands in for Redis with no
//! external dependency, mirroring the fake-over-trait pattern used for
//! every other storage contract in this workspace.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use crate::error::{StoreError, StoreResult};
use crate::traits::{MkStream, StreamEntry, Store};

#[derive(Debug, Clone)]
struct PendingEntry {
    consumer: String,
    delivery_count: u64,
}

#[derive(Debug, Default)]
struct StreamState {
    entries: VecDeque<(String, Vec<u8>)>,
    groups: HashMap<String, GroupState>,
}

#[derive(Debug, Default)]
struct GroupState {
    /// Entries not yet delivered to any consumer, in stream order.
    cursor: usize,
    pending: HashMap<String, PendingEntry>,
}

#[derive(Debug, Default)]
struct Inner {
    hashes: HashMap<String, HashMap<String, Vec<u8>>>,
    sets: HashMap<String, HashSet<String>>,
    kv: HashMap<String, Vec<u8>>,
    lists: HashMap<String, Vec<Vec<u8>>>,
    streams: HashMap<String, StreamState>,
}

/// In-memory substrate. `id_seq` gives monotonically increasing stream
/// entry ids so ordering and autoclaim cursors behave sanely in tests.
#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    id_seq: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> String {
        let n = self.id_seq.fetch_add(1, Ordering::Relaxed);
        format!("{n}-0")
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner
            .hashes
            .entry(key.to_string())
            .or_default()
            .insert(field.to_string(), value.to_vec());
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(key).and_then(|h| h.get(field).cloned()))
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get_mut(key)
            .map(|h| h.remove(field).is_some())
            .unwrap_or(false))
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.contains_key(field))
            .unwrap_or(false))
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.hashes.get(key).map(|h| h.len() as u64).unwrap_or(0))
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .hashes
            .get(key)
            .map(|h| h.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .entry(key.to_string())
            .or_default()
            .insert(member.to_string()))
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get_mut(key)
            .map(|s| s.remove(member))
            .unwrap_or(false))
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.contains(member))
            .unwrap_or(false))
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .sets
            .get(key)
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default())
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.sets.get(key).map(|s| s.len() as u64).unwrap_or(0))
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        let removed = inner
            .sets
            .get_mut(src)
            .map(|s| s.remove(member))
            .unwrap_or(false);
        if removed {
            inner.sets.entry(dst.to_string()).or_default().insert(member.to_string());
        }
        Ok(removed)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.kv.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], _ttl_secs: u64) -> StoreResult<bool> {
        // TTL expiry is not modeled in-memory; tests exercise liveness
        // semantics against a real backend, not this fake.
        let mut inner = self.inner.lock().unwrap();
        if inner.kv.contains_key(key) {
            return Ok(false);
        }
        inner.kv.insert(key.to_string(), value.to_vec());
        Ok(true)
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.kv.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut inner = self.inner.lock().unwrap();
        Ok(inner.kv.remove(key).is_some())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.kv.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let inner = self.inner.lock().unwrap();
        // Only `*` (match-all) and exact patterns are needed by this workspace.
        if pattern == "*" {
            return Ok(inner.kv.keys().cloned().collect());
        }
        let prefix = pattern.trim_end_matches('*');
        Ok(inner
            .kv
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        inner.lists.entry(key.to_string()).or_default().push(value.to_vec());
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner.lists.get(key).cloned().unwrap_or_default())
    }

    async fn stream_create_group(&self, stream: &str, group: &str, mkstream: MkStream) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if !inner.streams.contains_key(stream) {
            if mkstream == MkStream::RequireExisting {
                return Err(StoreError::NoSuchEntry {
                    stream: stream.to_string(),
                    id: "*".to_string(),
                });
            }
            inner.streams.insert(stream.to_string(), StreamState::default());
        }
        let state = inner.streams.get_mut(stream).unwrap();
        state.groups.entry(group.to_string()).or_default();
        Ok(())
    }

    async fn stream_add(&self, stream: &str, payload: &[u8]) -> StoreResult<String> {
        let id = self.next_id();
        let mut inner = self.inner.lock().unwrap();
        inner
            .streams
            .entry(stream.to_string())
            .or_default()
            .entries
            .push_back((id.clone(), payload.to_vec()));
        Ok(id)
    }

    async fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .streams
            .get(stream)
            .map(|s| s.entries.len() as u64)
            .unwrap_or(0))
    }

    async fn stream_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        _block_ms: Option<u64>,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.streams.get_mut(stream) else {
            return Ok(Vec::new());
        };
        let entries = state.entries.clone();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        while group_state.cursor < entries.len() && out.len() < count {
            let (id, payload) = entries[group_state.cursor].clone();
            group_state.cursor += 1;
            group_state.pending.insert(
                id.clone(),
                PendingEntry {
                    consumer: consumer.to_string(),
                    delivery_count: 1,
                },
            );
            out.push(StreamEntry { id, payload });
        }
        Ok(out)
    }

    async fn stream_ack(&self, stream: &str, group: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.streams.get_mut(stream) {
            if let Some(group_state) = state.groups.get_mut(group) {
                group_state.pending.remove(id);
            }
        }
        Ok(())
    }

    async fn stream_autoclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        _min_idle_ms: u64,
        _start_id: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        // The fake has no wall-clock idle tracking; it reclaims whatever
        // is currently pending, which is sufficient for tests that
        // explicitly simulate "consumer died before acking."
        let mut inner = self.inner.lock().unwrap();
        let Some(state) = inner.streams.get_mut(stream) else {
            return Ok(Vec::new());
        };
        let entries: HashMap<String, Vec<u8>> = state.entries.iter().cloned().collect();
        let Some(group_state) = state.groups.get_mut(group) else {
            return Ok(Vec::new());
        };
        let mut out = Vec::new();
        let ids: Vec<String> = group_state.pending.keys().cloned().collect();
        for id in ids {
            if out.len() >= count {
                break;
            }
            if let Some(entry) = group_state.pending.get_mut(&id) {
                entry.consumer = consumer.to_string();
                entry.delivery_count += 1;
            }
            if let Some(payload) = entries.get(&id) {
                out.push(StreamEntry {
                    id,
                    payload: payload.clone(),
                });
            }
        }
        Ok(out)
    }

    async fn stream_pending_count(&self, stream: &str, group: &str, id: &str) -> StoreResult<Option<u64>> {
        let inner = self.inner.lock().unwrap();
        Ok(inner
            .streams
            .get(stream)
            .and_then(|s| s.groups.get(group))
            .and_then(|g| g.pending.get(id))
            .map(|p| p.delivery_count))
    }

    async fn stream_del(&self, stream: &str, id: &str) -> StoreResult<()> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(state) = inner.streams.get_mut(stream) {
            state.entries.retain(|(eid, _)| eid != id);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn smove_moves_exactly_once() {
        let store = MemoryStore::new();
        store.sadd("pending", "k1").await.unwrap();
        assert!(store.smove("pending", "mitigated", "k1").await.unwrap());
        assert!(!store.smove("pending", "mitigated", "k1").await.unwrap());
        assert!(store.sismember("mitigated", "k1").await.unwrap());
        assert!(!store.sismember("pending", "k1").await.unwrap());
    }

    #[tokio::test]
    async fn stream_round_trip_and_autoclaim() {
        let store = MemoryStore::new();
        store.stream_create_group("crash", "g", MkStream::Create).await.unwrap();
        store.stream_add("crash", b"payload-a").await.unwrap();

        let popped = store
            .stream_read_group("crash", "g", "consumer-a", 1, None)
            .await
            .unwrap();
        assert_eq!(popped.len(), 1);
        let id = popped[0].id.clone();

        // consumer-a "dies" without acking; consumer-b autoclaims.
        let reclaimed = store
            .stream_autoclaim("crash", "g", "consumer-b", 0, "0", 10)
            .await
            .unwrap();
        assert_eq!(reclaimed.len(), 1);
        assert_eq!(reclaimed[0].id, id);
        assert_eq!(
            store.stream_pending_count("crash", "g", &id).await.unwrap(),
            Some(2)
        );

        store.stream_ack("crash", "g", &id).await.unwrap();
        assert_eq!(store.stream_pending_count("crash", "g", &id).await.unwrap(), None);
    }
}
