//! Sub-serve 4 (§4.7): crash deduplication. Pops a `TracedCrash`,
//! dedups via a pluggable `CrashDeduper` (stack parsing is out of
//! scope, §1), and forwards novel crashes to the unique-vulnerabilities
//! queue. Grounded on `vulnerabilities.py`'s `process_crashes` /
//! `dedup_crash`.

use std::sync::Arc;

use tracing::info;

use crs_core::domain::{Crash, TracedCrash};
use crs_queue::{drop_if_poison, ReliableQueue};

use crate::external::CrashDeduper;

pub struct CrashDedupSubserve {
    crash_queue: Arc<ReliableQueue<TracedCrash>>,
    unique_vulnerabilities_queue: Arc<ReliableQueue<Crash>>,
    deduper: Arc<dyn CrashDeduper>,
    poison_threshold: u64,
}

impl CrashDedupSubserve {
    pub fn new(
        crash_queue: Arc<ReliableQueue<TracedCrash>>,
        unique_vulnerabilities_queue: Arc<ReliableQueue<Crash>>,
        deduper: Arc<dyn CrashDeduper>,
        poison_threshold: u64,
    ) -> Self {
        Self { crash_queue, unique_vulnerabilities_queue, deduper, poison_threshold }
    }

    pub async fn serve(&self) -> anyhow::Result<bool> {
        let Some(item) = self.crash_queue.pop().await? else {
            return Ok(false);
        };

        if drop_if_poison(&self.crash_queue, &item.item_id, self.poison_threshold).await? {
            return Ok(true);
        }

        let traced = item.deserialized;
        match self.deduper.dedup(&traced.crash) {
            Some(unique) => {
                self.unique_vulnerabilities_queue.push(&unique).await?;
                info!(package = %unique.target.package_name, "forwarded novel crash to unique vulnerabilities queue");
            }
            None => {
                info!(package = %traced.crash.target.package_name, "crash deduplicated, not forwarding");
            }
        }
        self.crash_queue.ack(&item.item_id).await?;
        Ok(true)
    }
}
