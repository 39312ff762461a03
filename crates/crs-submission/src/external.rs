//! The competition API contract (§6): submit crash, submit patch,
//! submit bundle, each returning `{status, id}`. Idempotent-on-retry is
//! not guaranteed by the API itself — duplicate-submission prevention
//! lives in [`crate::tracker::SubmissionTracker`], not here.

use async_trait::async_trait;

use crs_core::domain::{Crash, SubmissionResult as Status};

use crate::error::SubmissionResult;

/// One competition-API response: the status it assigned plus the
/// server-issued id for whatever was submitted (crash, patch, or
/// bundle — the id's meaning is scoped by which method returned it).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiSubmissionResponse {
    pub status: Status,
    pub id: String,
}

impl ApiSubmissionResponse {
    pub fn is_accepted(&self) -> bool {
        matches!(self.status, Status::Accepted | Status::Passed)
    }
}

#[async_trait]
pub trait CompetitionApi: Send + Sync {
    async fn submit_crash(&self, task_id: &str, crash: &Crash) -> SubmissionResult<ApiSubmissionResponse>;
    async fn submit_patch(&self, task_id: &str, vuln_id: &str, diff: &str) -> SubmissionResult<ApiSubmissionResponse>;
    async fn submit_bundle(
        &self,
        task_id: &str,
        vuln_id: &str,
        patch_id: &str,
    ) -> SubmissionResult<ApiSubmissionResponse>;
}
