//! Sub-serve 5 (§4.7): vulnerability submission. Pops a unique crash,
//! submits it via the competition API, and on acceptance forwards a
//! `ConfirmedVulnerability` to the patcher. Grounded on
//! `vulnerabilities.py`'s `process_unique_vulnerabilities` /
//! `submit_vulnerability`.

use std::sync::Arc;

use tracing::{error, info};

use crs_core::domain::{ConfirmedVulnerability, Crash};
use crs_queue::ReliableQueue;
use crs_submission::CompetitionApi;

pub struct VulnerabilitySubmissionSubserve {
    unique_vulnerabilities_queue: Arc<ReliableQueue<Crash>>,
    confirmed_vulnerabilities_queue: Arc<ReliableQueue<ConfirmedVulnerability>>,
    api: Arc<dyn CompetitionApi>,
}

impl VulnerabilitySubmissionSubserve {
    pub fn new(
        unique_vulnerabilities_queue: Arc<ReliableQueue<Crash>>,
        confirmed_vulnerabilities_queue: Arc<ReliableQueue<ConfirmedVulnerability>>,
        api: Arc<dyn CompetitionApi>,
    ) -> Self {
        Self { unique_vulnerabilities_queue, confirmed_vulnerabilities_queue, api }
    }

    pub async fn serve(&self) -> anyhow::Result<bool> {
        let Some(item) = self.unique_vulnerabilities_queue.pop().await? else {
            return Ok(false);
        };

        let crash = item.deserialized;
        let task_id = crash.target.task_id.clone();
        info!(task_id = %task_id, package = %crash.target.package_name, "submitting confirmed vulnerability");

        match self.api.submit_crash(&task_id, &crash).await {
            Ok(response) if response.is_accepted() => {
                self.confirmed_vulnerabilities_queue
                    .push(&ConfirmedVulnerability { task_id: task_id.clone(), vuln_id: response.id, crash })
                    .await?;
                self.unique_vulnerabilities_queue.ack(&item.item_id).await?;
                Ok(true)
            }
            Ok(response) => {
                error!(task_id = %task_id, status = ?response.status, "vulnerability submission rejected");
                self.unique_vulnerabilities_queue.ack(&item.item_id).await?;
                Ok(true)
            }
            Err(e) => {
                error!(task_id = %task_id, error = %e, "vulnerability submission failed, leaving unacked");
                Ok(false)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use crs_core::domain::{BuildOutput, BuildType, SubmissionResult as Status};
    use crs_store::fakes::MemoryStore;
    use crs_store::Store;
    use crs_submission::{ApiSubmissionResponse, SubmissionResult};

    struct FixedApi(Status);
    #[async_trait]
    impl CompetitionApi for FixedApi {
        async fn submit_crash(&self, _task_id: &str, _crash: &Crash) -> SubmissionResult<ApiSubmissionResponse> {
            Ok(ApiSubmissionResponse { status: self.0, id: "V1".into() })
        }
        async fn submit_patch(&self, _task_id: &str, _vuln_id: &str, _diff: &str) -> SubmissionResult<ApiSubmissionResponse> {
            unreachable!()
        }
        async fn submit_bundle(&self, _task_id: &str, _vuln_id: &str, _patch_id: &str) -> SubmissionResult<ApiSubmissionResponse> {
            unreachable!()
        }
    }

    fn crash() -> Crash {
        Crash {
            harness_name: "fuzz_png".into(),
            crash_input_path: "/pov1".into(),
            target: BuildOutput {
                task_id: "T1".into(),
                build_type: BuildType::Fuzzer,
                sanitizer: "address".into(),
                engine: "libfuzzer".into(),
                package_name: "libpng".into(),
                internal_patch_id: String::new(),
                task_dir: "/out".into(),
            },
            stacktrace: "frame1".into(),
            crash_token: "tok".into(),
        }
    }

    async fn setup(api: Arc<dyn CompetitionApi>) -> VulnerabilitySubmissionSubserve {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let unique = Arc::new(ReliableQueue::new(store.clone(), "unique_vulnerabilities", "unique_vulnerabilities", "c1", 1000, None).await.unwrap());
        let confirmed = Arc::new(ReliableQueue::new(store, "confirmed_vulnerabilities", "patcher", "c1", 1000, None).await.unwrap());
        VulnerabilitySubmissionSubserve::new(unique, confirmed, api)
    }

    #[tokio::test]
    async fn accepted_crash_is_forwarded_to_confirmed_queue() {
        let s = setup(Arc::new(FixedApi(Status::Accepted))).await;
        s.unique_vulnerabilities_queue.push(&crash()).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert_eq!(s.confirmed_vulnerabilities_queue.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn rejected_crash_is_acked_without_forwarding() {
        let s = setup(Arc::new(FixedApi(Status::Failed))).await;
        s.unique_vulnerabilities_queue.push(&crash()).await.unwrap();
        assert!(s.serve().await.unwrap());
        assert_eq!(s.confirmed_vulnerabilities_queue.size().await.unwrap(), 0);
    }
}
