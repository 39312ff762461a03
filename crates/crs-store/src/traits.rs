//! The substrate contract (§4.1): the minimal surface every higher
//! layer needs over hashes, sets, a flat key/value namespace, and
//! append-only streams with consumer groups.
//!
//! All identifiers are opaque bytes on the wire. Keys that encode
//! tuples go through [`crs_core::canonical`] so independent producers
//! agree on the bytes.

use async_trait::async_trait;

use crate::error::StoreResult;

/// One entry read back from a stream, whether freshly delivered or
/// reclaimed via autoclaim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamEntry {
    /// Stream-assigned id (`"<ms>-<seq>"` in Redis).
    pub id: String,
    pub payload: Vec<u8>,
}

/// Whether `stream_create_group` should also create the stream if it
/// does not yet exist (`MKSTREAM`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MkStream {
    Create,
    RequireExisting,
}

#[async_trait]
pub trait Store: Send + Sync {
    // -- hashes --------------------------------------------------------
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<()>;
    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>>;
    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool>;
    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool>;
    async fn hlen(&self, key: &str) -> StoreResult<u64>;
    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>>;

    // -- sets ------------------------------------------------------------
    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool>;
    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>>;
    async fn scard(&self, key: &str) -> StoreResult<u64>;
    /// Atomically move `member` from `src` to `dst`. Returns `true` iff
    /// the member was present in `src` (and therefore moved). This is
    /// the sole legal way to transition PoV-status sets — never emulate
    /// with `srem` + `sadd`, which opens a race window.
    async fn smove(&self, src: &str, dst: &str, member: &str) -> StoreResult<bool>;

    // -- flat key/value --------------------------------------------------
    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    /// `SET key value NX EX ttl_secs`; `true` iff the key was set (was absent).
    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<bool>;
    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;
    async fn delete(&self, key: &str) -> StoreResult<bool>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;
    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>>;
    /// Append one element to a list-shaped value keyed `key` (used by
    /// the SARIF store, §12).
    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<()>;
    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<Vec<u8>>>;

    // -- streams -----------------------------------------------------------
    async fn stream_create_group(&self, stream: &str, group: &str, mkstream: MkStream) -> StoreResult<()>;
    async fn stream_add(&self, stream: &str, payload: &[u8]) -> StoreResult<String>;
    async fn stream_len(&self, stream: &str) -> StoreResult<u64>;
    /// Non-blocking (or blocking up to `block_ms`) read of unseen
    /// entries for `consumer` in `group`. `block_ms = None` never blocks.
    async fn stream_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StoreResult<Vec<StreamEntry>>;
    async fn stream_ack(&self, stream: &str, group: &str, id: &str) -> StoreResult<()>;
    /// Reclaim entries idle longer than `min_idle_ms` from any consumer
    /// in `group`, assigning them to `consumer`.
    async fn stream_autoclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        start_id: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>>;
    /// Delivery count of a still-pending entry, if any.
    async fn stream_pending_count(&self, stream: &str, group: &str, id: &str) -> StoreResult<Option<u64>>;
    async fn stream_del(&self, stream: &str, id: &str) -> StoreResult<()>;
}
