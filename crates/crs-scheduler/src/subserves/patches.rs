//! Sub-serve 6 (§4.7): patch submission. Pops a `Patch`, submits it,
//! and on any response (accepted or not) acks the entry -- only a
//! transport-level submission error leaves it unacked for retry.
//! Grounded on `patches.py`'s `process_patches` / `submit_patch`.

use std::sync::Arc;

use tracing::{error, info, warn};

use crs_core::domain::Patch;
use crs_queue::ReliableQueue;
use crs_submission::{CompetitionApi, SubmissionTracker};

pub struct PatchSubmissionSubserve {
    patches_queue: Arc<ReliableQueue<Patch>>,
    tracker: Arc<SubmissionTracker>,
    api: Arc<dyn CompetitionApi>,
}

impl PatchSubmissionSubserve {
    pub fn new(patches_queue: Arc<ReliableQueue<Patch>>, tracker: Arc<SubmissionTracker>, api: Arc<dyn CompetitionApi>) -> Self {
        Self { patches_queue, tracker, api }
    }

    pub async fn serve(&self) -> anyhow::Result<bool> {
        let Some(item) = self.patches_queue.pop().await? else {
            return Ok(false);
        };

        let patch = item.deserialized;
        info!(task_id = %patch.task_id, vuln_id = %patch.vuln_id, "submitting patch");

        match self.api.submit_patch(&patch.task_id, &patch.vuln_id, &patch.diff).await {
            Ok(response) => {
                if response.is_accepted() {
                    info!(task_id = %patch.task_id, vuln_id = %patch.vuln_id, patch_id = %response.id, status = ?response.status, "patch accepted");
                } else {
                    warn!(task_id = %patch.task_id, vuln_id = %patch.vuln_id, status = ?response.status, "patch rejected");
                }
                self.tracker.update_patch_status(&patch.task_id, &response.id, response.status).await?;
                self.tracker.map_patch_to_vulnerability(&patch.task_id, &response.id, &patch.vuln_id).await?;
                self.patches_queue.ack(&item.item_id).await?;
            }
            Err(e) => {
                error!(task_id = %patch.task_id, vuln_id = %patch.vuln_id, error = %e, "patch submission error, leaving unacked");
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crs_core::domain::{Crash, SubmissionResult as Status};
    use crs_store::fakes::MemoryStore;
    use crs_store::Store;
    use crs_submission::{ApiSubmissionResponse, SubmissionResult};

    struct FixedApi(Status);
    #[async_trait]
    impl CompetitionApi for FixedApi {
        async fn submit_crash(&self, _task_id: &str, _crash: &Crash) -> SubmissionResult<ApiSubmissionResponse> {
            unreachable!()
        }
        async fn submit_patch(&self, _task_id: &str, _vuln_id: &str, _diff: &str) -> SubmissionResult<ApiSubmissionResponse> {
            Ok(ApiSubmissionResponse { status: self.0, id: "P1".into() })
        }
        async fn submit_bundle(&self, _task_id: &str, _vuln_id: &str, _patch_id: &str) -> SubmissionResult<ApiSubmissionResponse> {
            unreachable!()
        }
    }

    fn patch() -> Patch {
        Patch { task_id: "T1".into(), vuln_id: "V1".into(), diff: "--- a\n+++ b\n".into() }
    }

    async fn setup(api: Arc<dyn CompetitionApi>) -> PatchSubmissionSubserve {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let queue = Arc::new(ReliableQueue::new(store.clone(), "patches", "patcher", "c1", 1000, None).await.unwrap());
        PatchSubmissionSubserve::new(queue, Arc::new(SubmissionTracker::new(store)), api)
    }

    #[tokio::test]
    async fn accepted_patch_updates_status_and_mapping() {
        let s = setup(Arc::new(FixedApi(Status::Passed))).await;
        s.patches_queue.push(&patch()).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert_eq!(s.tracker.get_patch_status("T1", "P1").await.unwrap(), Some(Status::Passed));
        assert_eq!(s.tracker.get_vulnerability_for_patch("T1", "P1").await.unwrap(), Some("V1".to_string()));
    }

    #[tokio::test]
    async fn rejected_patch_still_acked_and_recorded() {
        let s = setup(Arc::new(FixedApi(Status::Failed))).await;
        s.patches_queue.push(&patch()).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert_eq!(s.tracker.get_patch_status("T1", "P1").await.unwrap(), Some(Status::Failed));
        assert_eq!(s.patches_queue.size().await.unwrap(), 1); // stream length counts acked entries too
    }
}
