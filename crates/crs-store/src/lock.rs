//! Best-effort mutual exclusion with TTL-bound liveness (§5, §12),
//! grounded on the original's `RedisLock`: `SET key NX EX ttl`. A crash
//! while holding the lock is recovered from when the TTL expires; there
//! is no fencing token, so this is mutual exclusion under the
//! assumption that critical sections are shorter than the TTL, not a
//! correctness-grade distributed lock.

use std::sync::Arc;

use crate::error::StoreResult;
use crate::traits::Store;

#[derive(Debug, thiserror::Error)]
#[error("failed to acquire lock {0}")]
pub struct FailedToAcquireLock(pub String);

/// Acquire a named, TTL-bound lock. Returns `Ok(None)` if another
/// holder currently owns it.
pub async fn try_lock(
    store: &Arc<dyn Store>,
    key: &str,
    ttl_secs: u64,
) -> StoreResult<Option<LockGuard>> {
    let acquired = store.set_nx_ex(key, b"1", ttl_secs).await?;
    if !acquired {
        return Ok(None);
    }
    Ok(Some(LockGuard {
        key: key.to_string(),
    }))
}

/// Marker returned on successful acquisition. There is deliberately no
/// `Drop`-based release: an early release before the TTL would defeat
/// the "crash releases the lock via expiry" contract for the common
/// case (the process dying mid-critical-section), and Redis has no
/// synchronous-drop-safe way to unlock from a non-async `Drop`. Callers
/// let the TTL expire or explicitly let the key's natural lifetime run
/// out; a merge cycle is expected to complete well within `ttl_secs`.
#[derive(Debug, Clone)]
pub struct LockGuard {
    pub key: String,
}

/// Corpus-merge lock TTL: one fuzzing cycle, long enough that a crash
/// mid-merge releases the lock instead of wedging the harness forever.
pub const MERGE_LOCK_TTL_SECS: u64 = 15 * 60;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::MemoryStore;

    #[tokio::test]
    async fn second_locker_is_refused() {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let first = try_lock(&store, "merge:T1:H1", MERGE_LOCK_TTL_SECS).await.unwrap();
        assert!(first.is_some());
        let second = try_lock(&store, "merge:T1:H1", MERGE_LOCK_TTL_SECS).await.unwrap();
        assert!(second.is_none());
    }
}
