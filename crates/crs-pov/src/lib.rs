//! PoV Reproduce Status (C5): a set-of-sets state machine tracking,
//! per `(task, patch, PoV, sanitizer, harness)` tuple, whether a PoV
//! has been confirmed mitigated, non-mitigated, pending, or expired.
//! Grounded on the original's `PoVReproduceStatus`.
//!
//! `smove` is the sole legal transition between sets; it is never
//! emulated with `srem` + `sadd`, which would open a race window
//! between two workers resolving the same key.

pub mod error;

use std::num::NonZeroUsize;
use std::sync::Arc;
use std::sync::Mutex;

use lru::LruCache;
use rand::seq::SliceRandom;
use tracing::instrument;

use crs_core::canonical::pov_key;
use crs_core::domain::{PovReproduceRequest, PovReproduceResponse};
use crs_store::Store;

pub use error::{PovError, PovResult};

pub const PENDING_SET: &str = "pov_reproduce_pending";
pub const MITIGATED_SET: &str = "pov_reproduce_mitigated";
pub const NON_MITIGATED_SET: &str = "pov_reproduce_non_mitigated";
/// Wire-compatible with the original's literal key name; this is the
/// "terminally expired" set, not an inverse of expiry.
pub const EXPIRED_SET: &str = "pov_reproduce_non_expired";
/// Hash of per-key "did not run" retry counters, mirroring the queue's
/// delivery-count poison cap but keyed on the PoV tuple instead of a
/// stream entry id, since these attempts span background-task ticks
/// rather than redeliveries of one queue message.
pub const ATTEMPTS_HASH: &str = "pov_reproduce_attempts";

const TERMINAL_CACHE_CAPACITY: usize = 1000;

fn key_of(req: &PovReproduceRequest) -> String {
    pov_key(
        &req.task_id,
        &req.internal_patch_id,
        &req.pov_path,
        &req.sanitizer,
        &req.harness_name,
    )
}

fn request_from_key(key: &str) -> PovResult<PovReproduceRequest> {
    let (task_id, internal_patch_id, pov_path, sanitizer, harness_name): (
        String,
        String,
        String,
        String,
        String,
    ) = serde_json::from_str(key)?;
    Ok(PovReproduceRequest {
        task_id,
        internal_patch_id,
        pov_path,
        sanitizer,
        harness_name,
    })
}

pub struct PovReproduceStatus {
    store: Arc<dyn Store>,
    /// Process-local cache of keys already known to be in a terminal
    /// state. Bounded per §9; never invalidated on re-entering pending
    /// because a key never legally re-enters pending once resolved.
    terminal_cache: Mutex<LruCache<String, bool>>,
}

impl PovReproduceStatus {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            terminal_cache: Mutex::new(LruCache::new(
                NonZeroUsize::new(TERMINAL_CACHE_CAPACITY).unwrap(),
            )),
        }
    }

    #[instrument(skip(self, req), fields(task_id = %req.task_id))]
    pub async fn request_status(
        &self,
        req: &PovReproduceRequest,
    ) -> PovResult<Option<PovReproduceResponse>> {
        crs_core::metrics::METRICS.inc_pov_requests();
        let key = key_of(req);

        if let Some(did_crash) = self.terminal_cache.lock().unwrap().get(&key).copied() {
            return Ok(Some(PovReproduceResponse {
                request: req.clone(),
                did_crash,
            }));
        }

        if self.store.sismember(PENDING_SET, &key).await? {
            return Ok(None);
        }
        if self.store.sismember(MITIGATED_SET, &key).await? {
            self.terminal_cache.lock().unwrap().put(key, false);
            return Ok(Some(PovReproduceResponse {
                request: req.clone(),
                did_crash: false,
            }));
        }
        if self.store.sismember(NON_MITIGATED_SET, &key).await? {
            self.terminal_cache.lock().unwrap().put(key, true);
            return Ok(Some(PovReproduceResponse {
                request: req.clone(),
                did_crash: true,
            }));
        }

        // First time this tuple has been seen: schedule it.
        self.store.sadd(PENDING_SET, &key).await?;
        crs_core::obs::emit_pov_pending(&key);
        Ok(None)
    }

    async fn mark(&self, req: &PovReproduceRequest, target: &str, did_crash: Option<bool>) -> PovResult<bool> {
        let key = key_of(req);
        let moved = self.store.smove(PENDING_SET, target, &key).await?;
        if moved {
            self.store.hdel(ATTEMPTS_HASH, &key).await?;
            if let Some(did_crash) = did_crash {
                self.terminal_cache.lock().unwrap().put(key.clone(), did_crash);
            }
            crs_core::metrics::METRICS.inc_pov_resolved();
            crs_core::obs::emit_pov_resolved(&key, did_crash.unwrap_or(false));
        } else {
            crs_core::metrics::METRICS.inc_pov_race_losses();
            crs_core::obs::emit_pov_race_lost(&key, target);
        }
        Ok(moved)
    }

    /// Returns `true` iff this call is the one that actually transitioned
    /// the key (the single-writer guarantee). A `false` result is not an
    /// error: another worker already resolved this request.
    pub async fn mark_mitigated(&self, req: &PovReproduceRequest) -> PovResult<bool> {
        self.mark(req, MITIGATED_SET, Some(false)).await
    }

    pub async fn mark_non_mitigated(&self, req: &PovReproduceRequest) -> PovResult<bool> {
        self.mark(req, NON_MITIGATED_SET, Some(true)).await
    }

    pub async fn mark_expired(&self, req: &PovReproduceRequest) -> PovResult<bool> {
        self.mark(req, EXPIRED_SET, None).await
    }

    /// Records one "did not run" retry for `req` and returns the new
    /// attempt count. The counter survives across ticks (unlike the
    /// process-local caches above) since retries span separate
    /// background-task invocations and possibly separate processes.
    pub async fn record_attempt(&self, req: &PovReproduceRequest) -> PovResult<u32> {
        let key = key_of(req);
        let previous = match self.store.hget(ATTEMPTS_HASH, &key).await? {
            Some(bytes) => std::str::from_utf8(&bytes)
                .ok()
                .and_then(|s| s.parse::<u32>().ok())
                .unwrap_or(0),
            None => 0,
        };
        let count = previous + 1;
        self.store.hset(ATTEMPTS_HASH, &key, count.to_string().as_bytes()).await?;
        Ok(count)
    }

    /// Picks a uniformly random pending request so concurrent
    /// reproducers diversify instead of colliding on the same key.
    pub async fn get_one_pending(&self) -> PovResult<Option<PovReproduceRequest>> {
        let pending = self.store.smembers(PENDING_SET).await?;
        let Some(key) = pending.choose(&mut rand::thread_rng()) else {
            return Ok(None);
        };
        Ok(Some(request_from_key(key)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;

    fn req(task: &str) -> PovReproduceRequest {
        PovReproduceRequest {
            task_id: task.into(),
            internal_patch_id: "P1".into(),
            pov_path: "/p1".into(),
            sanitizer: "address".into(),
            harness_name: "H".into(),
        }
    }

    fn status() -> PovReproduceStatus {
        PovReproduceStatus::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn happy_path_pov_lifecycle() {
        let s = status();
        let r = req("T1");
        assert!(s.request_status(&r).await.unwrap().is_none());
        assert!(s.mark_mitigated(&r).await.unwrap());
        let resolved = s.request_status(&r).await.unwrap().unwrap();
        assert!(!resolved.did_crash);
    }

    #[tokio::test]
    async fn concurrent_resolvers_exactly_one_wins() {
        let s = status();
        let r = req("T1");
        s.request_status(&r).await.unwrap();
        let a = s.mark_non_mitigated(&r).await.unwrap();
        let b = s.mark_non_mitigated(&r).await.unwrap();
        assert!(a ^ b, "exactly one of the two calls should win the race");
    }

    #[tokio::test]
    async fn get_one_pending_on_empty_returns_none() {
        let s = status();
        assert!(s.get_one_pending().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn get_one_pending_round_trips_the_request() {
        let s = status();
        let r = req("T1");
        s.request_status(&r).await.unwrap();
        let picked = s.get_one_pending().await.unwrap().unwrap();
        assert_eq!(picked, r);
    }

    #[tokio::test]
    async fn record_attempt_increments_and_mark_clears_it() {
        let s = status();
        let r = req("T1");
        s.request_status(&r).await.unwrap();
        assert_eq!(s.record_attempt(&r).await.unwrap(), 1);
        assert_eq!(s.record_attempt(&r).await.unwrap(), 2);
        s.mark_expired(&r).await.unwrap();
        // A fresh request for the same tuple starts the counter over.
        assert_eq!(s.record_attempt(&r).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn terminal_cache_short_circuits_storage() {
        let s = status();
        let r = req("T1");
        s.request_status(&r).await.unwrap();
        s.mark_mitigated(&r).await.unwrap();
        // Drain the pending set so a storage round-trip would now see
        // "not pending, not mitigated" -- the point is the cache means
        // we never get there.
        let resolved = s.request_status(&r).await.unwrap().unwrap();
        assert!(!resolved.did_crash);
    }

    proptest::proptest! {
        #[test]
        fn key_membership_is_exclusive(task in "[a-z]{1,8}") {
            tokio::runtime::Runtime::new().unwrap().block_on(async {
                let s = status();
                let r = req(&task);
                s.request_status(&r).await.unwrap();
                let key = key_of(&r);
                let memberships = futures::future::join_all(vec![
                    s.store.sismember(PENDING_SET, &key),
                    s.store.sismember(MITIGATED_SET, &key),
                    s.store.sismember(NON_MITIGATED_SET, &key),
                    s.store.sismember(EXPIRED_SET, &key),
                ]).await;
                let count = memberships.into_iter().filter(|m| *m.as_ref().unwrap()).count();
                assert!(count <= 1);
            });
        }
    }
}
