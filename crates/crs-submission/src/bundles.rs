//! `Bundles`: submits ready vulnerability-patch pairs to the
//! competition API, grounded on the original's `Bundles.process_bundles`.

use std::sync::Arc;

use tracing::{error, info};

use crs_core::domain::SubmissionResult as Status;
use crs_registry::TaskRegistry;

use crate::error::SubmissionResult;
use crate::external::CompetitionApi;
use crate::tracker::SubmissionTracker;

pub struct Bundles {
    tracker: Arc<SubmissionTracker>,
    registry: Arc<TaskRegistry>,
    api: Arc<dyn CompetitionApi>,
}

impl Bundles {
    pub fn new(tracker: Arc<SubmissionTracker>, registry: Arc<TaskRegistry>, api: Arc<dyn CompetitionApi>) -> Self {
        Self { tracker, registry, api }
    }

    /// For each ready `(task, vuln, patch)` triple: skip if the task
    /// should stop processing; otherwise submit and, on acceptance,
    /// mark it submitted so it is never retried.
    ///
    /// On a submission exception the original forces the overall
    /// `processed` flag back to `false` even if earlier bundles in the
    /// same batch succeeded, so the scheduler throttles on any failure
    /// rather than racing ahead; that behavior is kept here.
    pub async fn process_bundles(&self, now: i64) -> SubmissionResult<bool> {
        let ready = self.tracker.get_ready_vulnerability_patch_bundles().await?;
        if ready.is_empty() {
            return Ok(false);
        }

        let mut processed = false;
        for bundle in ready {
            if self
                .registry
                .should_stop_processing(&bundle.task_id, None, now)
                .await?
            {
                info!(
                    task_id = %bundle.task_id, vuln_id = %bundle.vuln_id, patch_id = %bundle.patch_id,
                    "skipping bundle: task cancelled or expired",
                );
                continue;
            }

            match self
                .api
                .submit_bundle(&bundle.task_id, &bundle.vuln_id, &bundle.patch_id)
                .await
            {
                Ok(response) if response.is_accepted() => {
                    self.tracker
                        .mark_bundle_submitted(&bundle.task_id, &bundle.vuln_id, &bundle.patch_id)
                        .await?;
                    crs_core::obs::emit_bundle_submitted(&bundle.task_id, &bundle.vuln_id, &bundle.patch_id);
                    crs_core::metrics::METRICS.inc_bundles_submitted();
                    info!(
                        task_id = %bundle.task_id, vuln_id = %bundle.vuln_id, patch_id = %bundle.patch_id,
                        status = ?response.status, "bundle accepted",
                    );
                    processed = true;
                }
                Ok(response) => {
                    error!(
                        task_id = %bundle.task_id, vuln_id = %bundle.vuln_id, patch_id = %bundle.patch_id,
                        status = ?response.status, "bundle rejected",
                    );
                }
                Err(e) => {
                    error!(
                        task_id = %bundle.task_id, vuln_id = %bundle.vuln_id, patch_id = %bundle.patch_id,
                        error = %e, "bundle submission error",
                    );
                    processed = false;
                }
            }
        }

        Ok(processed)
    }
}
