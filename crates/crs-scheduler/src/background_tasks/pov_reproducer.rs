//! PoV reproducer background task: pulls one pending reproduce
//! request, checks whether its owning task is still live, and if so
//! runs it against the patched build via a `ReproduceDriver`. A
//! request that keeps coming back "did not run" (no patched build yet,
//! or the driver itself couldn't start) is retried up to
//! `max_retries` times before being marked expired rather than
//! retried forever. Grounded on `pov_reproducer_task.py`'s
//! `POVReproducerTask.execute`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crs_core::domain::BuildType;
use crs_index::BuildMap;
use crs_pov::PovReproduceStatus;
use crs_registry::TaskRegistry;
use crs_runner::ReproduceDriver;

use crate::background::BackgroundTask;

pub struct PovReproducerTask {
    pov_status: Arc<PovReproduceStatus>,
    registry: Arc<TaskRegistry>,
    builds: Arc<BuildMap>,
    driver: Arc<dyn ReproduceDriver>,
    reproduce_timeout: Duration,
    max_retries: u32,
}

impl PovReproducerTask {
    pub fn new(
        pov_status: Arc<PovReproduceStatus>,
        registry: Arc<TaskRegistry>,
        builds: Arc<BuildMap>,
        driver: Arc<dyn ReproduceDriver>,
        reproduce_timeout: Duration,
        max_retries: u32,
    ) -> Self {
        Self { pov_status, registry, builds, driver, reproduce_timeout, max_retries }
    }

    /// Records a "did not run" attempt for `entry`; once it has been
    /// retried more than `max_retries` times, gives up and marks it
    /// expired instead of leaving it pending forever.
    async fn retry_or_expire(
        &self,
        entry: &crs_core::domain::PovReproduceRequest,
        reason: &str,
    ) -> anyhow::Result<bool> {
        let attempts = self.pov_status.record_attempt(entry).await?;
        if attempts > self.max_retries {
            warn!(task_id = %entry.task_id, attempts, "pov reproduction exceeded max retries, marking expired");
            let marked = self.pov_status.mark_expired(entry).await?;
            if !marked {
                tracing::debug!(task_id = %entry.task_id, "pov was already resolved by another worker");
            }
            Ok(true)
        } else {
            warn!(task_id = %entry.task_id, attempts, reason, "will retry later");
            Ok(false)
        }
    }
}

#[async_trait]
impl BackgroundTask for PovReproducerTask {
    fn name(&self) -> &str {
        "pov-reproducer"
    }

    async fn execute(&self) -> anyhow::Result<bool> {
        let Some(entry) = self.pov_status.get_one_pending().await? else {
            return Ok(false);
        };

        let now = chrono::Utc::now().timestamp();
        if self.registry.should_stop_processing(&entry.task_id, None, now).await? {
            info!(task_id = %entry.task_id, "task cancelled or expired, will not reproduce pov");
            let marked = self.pov_status.mark_expired(&entry).await?;
            if !marked {
                tracing::debug!(task_id = %entry.task_id, "pov was already resolved by another worker");
            }
            return Ok(true);
        }

        let build = self
            .builds
            .get_build_from_san(&entry.task_id, BuildType::Patch, &entry.sanitizer, &entry.internal_patch_id)
            .await?;
        let Some(build) = build else {
            return self.retry_or_expire(&entry, "no patched build output found").await;
        };

        info!(task_id = %entry.task_id, harness = %entry.harness_name, pov_path = %entry.pov_path, "reproducing pov");
        let outcome = self
            .driver
            .reproduce(&build.task_dir, &entry.harness_name, &entry.pov_path, self.reproduce_timeout)
            .await?;

        if !outcome.did_run {
            return self.retry_or_expire(&entry, "reproduce did not run").await;
        }

        info!(task_id = %entry.task_id, pov_path = %entry.pov_path, did_crash = outcome.did_crash, "pov reproduction complete");
        let marked = if outcome.did_crash {
            self.pov_status.mark_non_mitigated(&entry).await?
        } else {
            self.pov_status.mark_mitigated(&entry).await?
        };
        if !marked {
            tracing::debug!(task_id = %entry.task_id, "pov was already resolved by another worker");
        }
        Ok(true)
    }
}
