//! Redis-backed implementation of [`crate::traits::Store`].
//!
//! Hash/set/kv operations go through `redis::AsyncCommands`. Stream
//! operations are issued as raw commands (`XADD`, `XREADGROUP`,
//! `XAUTOCLAIM`, …) because the high-level stream helpers differ across
//! `redis` crate versions more than the rest of the surface does, and
//! autoclaim's reply shape in particular is worth decoding explicitly
//! rather than trusting a wrapper.

use async_trait::async_trait;
use deadpool_redis::{Config, Pool, Runtime};
use redis::AsyncCommands;

use crate::error::{StoreError, StoreResult};
use crate::traits::{MkStream, StreamEntry, Store};

#[derive(Clone)]
pub struct RedisStore {
    pool: Pool,
}

impl RedisStore {
    /// Build a store from a `redis://` connection URL, sizing the pool
    /// to `max_size` connections.
    pub fn connect(url: &str, max_size: usize) -> StoreResult<Self> {
        let mut cfg = Config::from_url(url);
        cfg.pool = Some(deadpool_redis::PoolConfig::new(max_size));
        let pool = cfg
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::Backend(e.to_string()))?;
        Ok(Self { pool })
    }

    async fn conn(&self) -> StoreResult<deadpool_redis::Connection> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn hset(&self, key: &str, field: &str, value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.hset(key, field, value).await?;
        Ok(())
    }

    async fn hget(&self, key: &str, field: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.hget(key, field).await?)
    }

    async fn hgetall(&self, key: &str) -> StoreResult<Vec<(String, Vec<u8>)>> {
        let mut conn = self.conn().await?;
        let map: std::collections::HashMap<String, Vec<u8>> = conn.hgetall(key).await?;
        Ok(map.into_iter().collect())
    }

    async fn hdel(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.hdel(key, field).await?;
        Ok(removed > 0)
    }

    async fn hexists(&self, key: &str, field: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.hexists(key, field).await?)
    }

    async fn hlen(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.hlen(key).await?)
    }

    async fn hkeys(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.hkeys(key).await?)
    }

    async fn sadd(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let added: i64 = conn.sadd(key, member).await?;
        Ok(added > 0)
    }

    async fn srem(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.srem(key, member).await?;
        Ok(removed > 0)
    }

    async fn sismember(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.sismember(key, member).await?)
    }

    async fn smembers(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.smembers(key).await?)
    }

    async fn scard(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.scard(key).await?)
    }

    async fn smove(&self, src: &str, dst: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.smove(src, dst, member).await?)
    }

    async fn set(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.set(key, value).await?;
        Ok(())
    }

    async fn set_nx_ex(&self, key: &str, value: &[u8], ttl_secs: u64) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs)
            .query_async(&mut conn)
            .await?;
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.get(key).await?)
    }

    async fn delete(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        let removed: i64 = conn.del(key).await?;
        Ok(removed > 0)
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.conn().await?;
        Ok(conn.exists(key).await?)
    }

    async fn keys(&self, pattern: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.conn().await?;
        Ok(conn.keys(pattern).await?)
    }

    async fn rpush(&self, key: &str, value: &[u8]) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: () = conn.rpush(key, value).await?;
        Ok(())
    }

    async fn lrange_all(&self, key: &str) -> StoreResult<Vec<Vec<u8>>> {
        let mut conn = self.conn().await?;
        Ok(conn.lrange(key, 0, -1).await?)
    }

    async fn stream_create_group(&self, stream: &str, group: &str, mkstream: MkStream) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("XGROUP");
        cmd.arg("CREATE").arg(stream).arg(group).arg("$");
        if mkstream == MkStream::Create {
            cmd.arg("MKSTREAM");
        }
        let result: redis::RedisResult<()> = cmd.query_async(&mut conn).await;
        match result {
            Ok(()) => Ok(()),
            // BUSYGROUP: the group already exists. Swallowed per §4.2.
            Err(e) if e.to_string().contains("BUSYGROUP") => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn stream_add(&self, stream: &str, payload: &[u8]) -> StoreResult<String> {
        let mut conn = self.conn().await?;
        let id: String = redis::cmd("XADD")
            .arg(stream)
            .arg("*")
            .arg("payload")
            .arg(payload)
            .query_async(&mut conn)
            .await?;
        Ok(id)
    }

    async fn stream_len(&self, stream: &str) -> StoreResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(stream).await?)
    }

    async fn stream_read_group(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block_ms: Option<u64>,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut conn = self.conn().await?;
        let mut cmd = redis::cmd("XREADGROUP");
        cmd.arg("GROUP").arg(group).arg(consumer);
        if let Some(ms) = block_ms {
            cmd.arg("BLOCK").arg(ms);
        }
        cmd.arg("COUNT").arg(count).arg("STREAMS").arg(stream).arg(">");

        let reply: Option<redis::streams::StreamReadReply> = cmd.query_async(&mut conn).await?;
        Ok(decode_stream_read_reply(reply))
    }

    async fn stream_ack(&self, stream: &str, group: &str, id: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.xack(stream, group, &[id]).await?;
        Ok(())
    }

    async fn stream_autoclaim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle_ms: u64,
        start_id: &str,
        count: usize,
    ) -> StoreResult<Vec<StreamEntry>> {
        let mut conn = self.conn().await?;
        let reply: redis::Value = redis::cmd("XAUTOCLAIM")
            .arg(stream)
            .arg(group)
            .arg(consumer)
            .arg(min_idle_ms)
            .arg(start_id)
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;
        decode_autoclaim_reply(reply)
    }

    async fn stream_pending_count(&self, stream: &str, group: &str, id: &str) -> StoreResult<Option<u64>> {
        let mut conn = self.conn().await?;
        let reply: Vec<redis::Value> = redis::cmd("XPENDING")
            .arg(stream)
            .arg(group)
            .arg("IDLE")
            .arg(0)
            .arg(id)
            .arg(id)
            .arg(1)
            .query_async(&mut conn)
            .await?;
        if let Some(redis::Value::Bulk(entry)) = reply.into_iter().next() {
            if let Some(redis::Value::Int(count)) = entry.get(3).or_else(|| entry.get(1)) {
                return Ok(Some(*count as u64));
            }
        }
        Ok(None)
    }

    async fn stream_del(&self, stream: &str, id: &str) -> StoreResult<()> {
        let mut conn = self.conn().await?;
        let _: i64 = conn.xdel(stream, &[id]).await?;
        Ok(())
    }
}

fn decode_stream_read_reply(reply: Option<redis::streams::StreamReadReply>) -> Vec<StreamEntry> {
    let mut out = Vec::new();
    let Some(reply) = reply else { return out };
    for key in reply.keys {
        for id in key.ids {
            if let Some(redis::Value::Data(bytes)) = id.map.get("payload") {
                out.push(StreamEntry {
                    id: id.id,
                    payload: bytes.clone(),
                });
            }
        }
    }
    out
}

fn decode_autoclaim_reply(reply: redis::Value) -> StoreResult<Vec<StreamEntry>> {
    // XAUTOCLAIM replies: [next_cursor, [[id, [field, value, ...]], ...], [deleted_ids...]]
    let redis::Value::Bulk(top) = reply else {
        return Ok(Vec::new());
    };
    let Some(redis::Value::Bulk(entries)) = top.get(1) else {
        return Ok(Vec::new());
    };
    let mut out = Vec::new();
    for entry in entries {
        let redis::Value::Bulk(pair) = entry else { continue };
        let (Some(redis::Value::Data(id_bytes)), Some(redis::Value::Bulk(fields))) =
            (pair.first(), pair.get(1))
        else {
            continue;
        };
        let id = String::from_utf8_lossy(id_bytes).to_string();
        let mut payload = None;
        let mut i = 0;
        while i + 1 < fields.len() {
            if let (redis::Value::Data(f), redis::Value::Data(v)) = (&fields[i], &fields[i + 1]) {
                if f == b"payload" {
                    payload = Some(v.clone());
                }
            }
            i += 2;
        }
        if let Some(payload) = payload {
            out.push(StreamEntry { id, payload });
        }
    }
    Ok(out)
}
