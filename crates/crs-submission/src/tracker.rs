//! `SubmissionTracker`: status hashes for PoV/patch submissions plus
//! the vulnerability-to-patch mapping and bundle-submission markers.
//! Grounded on the original's `SubmissionTracker`.

use std::sync::Arc;

use chrono::Utc;
use crs_core::domain::{ReadyBundle, SubmissionResult as Status};
use crs_store::Store;
use tracing::info;

use crate::error::{SubmissionError, SubmissionResult};

const POV_STATUS_PREFIX: &str = "pov_status:";
const PATCH_STATUS_PREFIX: &str = "patch_status:";
const VULN_TO_PATCH_MAPPING_PREFIX: &str = "bundle_mapping:";
const BUNDLE_SUBMISSION_PREFIX: &str = "bundle_submission:";

fn status_to_str(status: Status) -> &'static str {
    match status {
        Status::Pending => "PENDING",
        Status::Accepted => "ACCEPTED",
        Status::Passed => "PASSED",
        Status::Failed => "FAILED",
        Status::Errored => "ERRORED",
        Status::DeadlineExceeded => "DEADLINE_EXCEEDED",
    }
}

fn status_from_str(s: &str) -> SubmissionResult<Status> {
    Ok(match s {
        "PENDING" => Status::Pending,
        "ACCEPTED" => Status::Accepted,
        "PASSED" => Status::Passed,
        "FAILED" => Status::Failed,
        "ERRORED" => Status::Errored,
        "DEADLINE_EXCEEDED" => Status::DeadlineExceeded,
        other => return Err(SubmissionError::UnknownStatus(other.to_string())),
    })
}

pub struct SubmissionTracker {
    store: Arc<dyn Store>,
}

impl SubmissionTracker {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    fn pov_key(task_id: &str, pov_id: &str) -> String {
        format!("{POV_STATUS_PREFIX}{task_id}:{pov_id}")
    }

    fn patch_key(task_id: &str, patch_id: &str) -> String {
        format!("{PATCH_STATUS_PREFIX}{task_id}:{patch_id}")
    }

    fn mapping_key(task_id: &str, vuln_id: &str) -> String {
        format!("{VULN_TO_PATCH_MAPPING_PREFIX}{task_id}:{vuln_id}")
    }

    fn bundle_submission_key(task_id: &str, vuln_id: &str, patch_id: &str) -> String {
        format!("{BUNDLE_SUBMISSION_PREFIX}{task_id}:{vuln_id}:{patch_id}")
    }

    async fn update_status(&self, key: &str, status: Status) -> SubmissionResult<()> {
        self.store.hset(key, "status", status_to_str(status).as_bytes()).await?;
        self.store
            .hset(key, "last_updated", Utc::now().timestamp().to_string().as_bytes())
            .await?;
        Ok(())
    }

    pub async fn update_pov_status(&self, task_id: &str, pov_id: &str, status: Status) -> SubmissionResult<()> {
        self.update_status(&Self::pov_key(task_id, pov_id), status).await?;
        info!(task_id = %task_id, pov_id = %pov_id, ?status, "updated PoV status");
        Ok(())
    }

    pub async fn update_patch_status(&self, task_id: &str, patch_id: &str, status: Status) -> SubmissionResult<()> {
        self.update_status(&Self::patch_key(task_id, patch_id), status).await?;
        info!(task_id = %task_id, patch_id = %patch_id, ?status, "updated patch status");
        Ok(())
    }

    async fn read_status(&self, key: &str) -> SubmissionResult<Option<Status>> {
        match self.store.hget(key, "status").await? {
            Some(bytes) => Ok(Some(status_from_str(&String::from_utf8_lossy(&bytes))?)),
            None => Ok(None),
        }
    }

    pub async fn get_pov_status(&self, task_id: &str, pov_id: &str) -> SubmissionResult<Option<Status>> {
        self.read_status(&Self::pov_key(task_id, pov_id)).await
    }

    pub async fn get_patch_status(&self, task_id: &str, patch_id: &str) -> SubmissionResult<Option<Status>> {
        self.read_status(&Self::patch_key(task_id, patch_id)).await
    }

    pub async fn map_patch_to_vulnerability(&self, task_id: &str, patch_id: &str, vuln_id: &str) -> SubmissionResult<()> {
        self.store
            .set(&Self::mapping_key(task_id, vuln_id), patch_id.as_bytes())
            .await?;
        Ok(())
    }

    /// Scans every `bundle_mapping:{task}:*` key looking for the one
    /// whose value equals `patch_id`.
    pub async fn get_vulnerability_for_patch(&self, task_id: &str, patch_id: &str) -> SubmissionResult<Option<String>> {
        let pattern = format!("{VULN_TO_PATCH_MAPPING_PREFIX}{task_id}:*");
        for key in self.store.keys(&pattern).await? {
            if let Some(value) = self.store.get(&key).await? {
                if value == patch_id.as_bytes() {
                    let vuln_id = key
                        .rsplit(':')
                        .next()
                        .ok_or_else(|| SubmissionError::MalformedKey(key.clone()))?;
                    return Ok(Some(vuln_id.to_string()));
                }
            }
        }
        Ok(None)
    }

    async fn get_pending(&self, prefix: &str) -> SubmissionResult<Vec<(String, String)>> {
        let pattern = format!("{prefix}*");
        let mut out = Vec::new();
        for key in self.store.keys(&pattern).await? {
            let rest = key.strip_prefix(prefix).ok_or_else(|| SubmissionError::MalformedKey(key.clone()))?;
            let mut parts = rest.splitn(2, ':');
            let (Some(task_id), Some(submission_id)) = (parts.next(), parts.next()) else {
                return Err(SubmissionError::MalformedKey(key));
            };
            let status = self.read_status(&key).await?;
            let is_terminal = status.map(|s| s.is_terminal()).unwrap_or(false);
            if !is_terminal {
                out.push((task_id.to_string(), submission_id.to_string()));
            }
        }
        Ok(out)
    }

    pub async fn get_pending_pov_submissions(&self) -> SubmissionResult<Vec<(String, String)>> {
        self.get_pending(POV_STATUS_PREFIX).await
    }

    pub async fn get_pending_patch_submissions(&self) -> SubmissionResult<Vec<(String, String)>> {
        self.get_pending(PATCH_STATUS_PREFIX).await
    }

    pub async fn mark_bundle_submitted(&self, task_id: &str, vuln_id: &str, patch_id: &str) -> SubmissionResult<()> {
        self.store
            .set(&Self::bundle_submission_key(task_id, vuln_id, patch_id), b"submitted")
            .await?;
        Ok(())
    }

    pub async fn is_bundle_submitted(&self, task_id: &str, vuln_id: &str, patch_id: &str) -> SubmissionResult<bool> {
        Ok(self
            .store
            .exists(&Self::bundle_submission_key(task_id, vuln_id, patch_id))
            .await?)
    }

    /// Scans every patch-status key; for each `PASSED` patch with a
    /// mapped vulnerability and no existing submission marker, yields
    /// the `(task, vuln, patch)` triple.
    pub async fn get_ready_vulnerability_patch_bundles(&self) -> SubmissionResult<Vec<ReadyBundle>> {
        let pattern = format!("{PATCH_STATUS_PREFIX}*");
        let mut out = Vec::new();
        for key in self.store.keys(&pattern).await? {
            let rest = key.strip_prefix(PATCH_STATUS_PREFIX).ok_or_else(|| SubmissionError::MalformedKey(key.clone()))?;
            let mut parts = rest.splitn(2, ':');
            let (Some(task_id), Some(patch_id)) = (parts.next(), parts.next()) else {
                continue;
            };

            if self.get_patch_status(task_id, patch_id).await? != Some(Status::Passed) {
                continue;
            }
            let Some(vuln_id) = self.get_vulnerability_for_patch(task_id, patch_id).await? else {
                continue;
            };
            if self.is_bundle_submitted(task_id, &vuln_id, patch_id).await? {
                continue;
            }
            out.push(ReadyBundle {
                task_id: task_id.to_string(),
                vuln_id,
                patch_id: patch_id.to_string(),
            });
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crs_store::fakes::MemoryStore;

    fn tracker() -> SubmissionTracker {
        SubmissionTracker::new(Arc::new(MemoryStore::new()))
    }

    #[tokio::test]
    async fn ready_bundle_requires_passed_patch_mapping_and_no_marker() {
        let t = tracker();
        t.update_patch_status("T1", "P1", Status::Passed).await.unwrap();
        t.map_patch_to_vulnerability("T1", "P1", "V1").await.unwrap();

        let ready = t.get_ready_vulnerability_patch_bundles().await.unwrap();
        assert_eq!(
            ready,
            vec![ReadyBundle { task_id: "T1".into(), vuln_id: "V1".into(), patch_id: "P1".into() }]
        );

        t.mark_bundle_submitted("T1", "V1", "P1").await.unwrap();
        assert!(t.get_ready_vulnerability_patch_bundles().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn pending_submissions_exclude_terminal_statuses() {
        let t = tracker();
        t.update_pov_status("T1", "pov1", Status::Pending).await.unwrap();
        t.update_pov_status("T1", "pov2", Status::Passed).await.unwrap();
        let pending = t.get_pending_pov_submissions().await.unwrap();
        assert_eq!(pending, vec![("T1".to_string(), "pov1".to_string())]);
    }
}
