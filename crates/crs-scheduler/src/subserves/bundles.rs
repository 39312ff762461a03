//! Sub-serve 7 (§4.7): bundle submission. A thin pass-through to
//! [`crs_submission::Bundles::process_bundles`], which owns the actual
//! scan-ready-triples/submit/mark logic (C6).

use std::sync::Arc;

use crs_submission::Bundles;

pub struct BundleSubmissionSubserve {
    bundles: Arc<Bundles>,
}

impl BundleSubmissionSubserve {
    pub fn new(bundles: Arc<Bundles>) -> Self {
        Self { bundles }
    }

    pub async fn serve(&self, now: i64) -> anyhow::Result<bool> {
        Ok(self.bundles.process_bundles(now).await?)
    }
}
