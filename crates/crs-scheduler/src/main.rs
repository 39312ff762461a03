//! Scheduler binary entry point: parse config, wire real collaborators
//! (Redis-backed store, process-driven reproduction, filesystem target
//! listing), and run the tick loop forever.

use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};

use crs_scheduler::{Scheduler, SchedulerComponents, SchedulerConfig};
use crs_scheduler::external::{FilesystemFuzzTargetLister, IdentityCrashDeduper, MockCompetitionApi};
use crs_runner::ProcessReproduceDriver;
use crs_store::{RedisStore, Store};
use crs_submission::CompetitionApi;

#[tokio::main]
async fn main() -> Result<()> {
    let config = SchedulerConfig::parse();
    crs_core::telemetry::init_tracing(config.json_logs, Level::INFO);

    if !config.mock_mode {
        // No real competition-API HTTP client lives in this crate's
        // dependency stack yet; fall back to the mock with a loud
        // warning rather than silently fabricating one.
        tracing::warn!(
            url = %config.competition_api_url,
            "no real competition API client configured, falling back to mock mode"
        );
    }

    let store: Arc<dyn Store> = Arc::new(RedisStore::connect(&config.redis_url, config.redis_pool_size)?);
    let api: Arc<dyn CompetitionApi> = Arc::new(MockCompetitionApi);
    let reproduce_driver = Arc::new(ProcessReproduceDriver::new(config.reproduce_script.clone()));

    let scheduler = Scheduler::new(SchedulerComponents {
        store,
        config,
        api,
        crash_deduper: Arc::new(IdentityCrashDeduper),
        target_lister: Arc::new(FilesystemFuzzTargetLister),
        reproduce_driver,
    })
    .await?;

    info!("scheduler wired up, entering tick loop");
    scheduler.run().await
}
