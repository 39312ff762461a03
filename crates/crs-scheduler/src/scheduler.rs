//! The scheduler loop (C7, §4.7): ties every sub-serve and background
//! task together. Grounded on `scheduler.py`'s `Scheduler.serve`.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::background::BackgroundTaskManager;
use crate::background_tasks::{CorpusMergerTask, PovReproducerTask, ScratchCleanerTask};
use crate::config::SchedulerConfig;
use crate::external::{CrashDeduper, FuzzTargetLister};
use crate::health::{build_snapshot, HealthSnapshot, HealthTracker};
use crate::subserves::{
    BuildOutputSubserve, BundleSubmissionSubserve, CancellationSubserve, CrashDedupSubserve,
    PatchSubmissionSubserve, ReadyTaskSubserve, VulnerabilitySubmissionSubserve,
};

use crs_core::domain::{BuildOutput, BuildRequest, Crash, ConfirmedVulnerability, Patch, TaskDelete, TaskReady, TracedCrash};
use crs_index::{BuildMap, HarnessWeights};
use crs_pov::PovReproduceStatus;
use crs_queue::ReliableQueue;
use crs_registry::TaskRegistry;
use crs_runner::ReproduceDriver;
use crs_store::Store;
use crs_submission::{Bundles, CompetitionApi, SubmissionTracker};

/// Everything one tick of the loop needs, wired up once at startup.
pub struct Scheduler {
    ready_task: ReadyTaskSubserve,
    build_output: BuildOutputSubserve,
    cancellation: CancellationSubserve,
    crash_dedup: CrashDedupSubserve,
    vulnerabilities: VulnerabilitySubmissionSubserve,
    patches: PatchSubmissionSubserve,
    bundles: BundleSubmissionSubserve,
    health: Arc<HealthTracker>,
    background_tasks: BackgroundTaskManager,
    max_consecutive_errors: u64,
    sleep_time: Duration,
}

#[allow(clippy::too_many_arguments)]
pub struct SchedulerComponents {
    pub store: Arc<dyn Store>,
    pub config: SchedulerConfig,
    pub api: Arc<dyn CompetitionApi>,
    pub crash_deduper: Arc<dyn CrashDeduper>,
    pub target_lister: Arc<dyn FuzzTargetLister>,
    pub reproduce_driver: Arc<dyn ReproduceDriver>,
}

impl Scheduler {
    pub async fn new(components: SchedulerComponents) -> anyhow::Result<Self> {
        let SchedulerComponents { store, config, api, crash_deduper, target_lister, reproduce_driver } = components;

        let consumer = config.consumer_name.clone();
        let registry = Arc::new(TaskRegistry::new(store.clone()));
        let build_map = Arc::new(BuildMap::new(store.clone()));
        let harness_weights = Arc::new(HarnessWeights::new(store.clone()));
        let tracker = Arc::new(SubmissionTracker::new(store.clone()));
        let pov_status = Arc::new(PovReproduceStatus::new(store.clone()));

        let ready_queue: Arc<ReliableQueue<TaskReady>> = Arc::new(
            ReliableQueue::new(store.clone(), "ready_tasks", "scheduler_ready_tasks", consumer.as_str(), config.task_timeout_ms, None).await?,
        );
        let build_requests_queue: Arc<ReliableQueue<BuildRequest>> =
            Arc::new(ReliableQueue::new(store.clone(), "build", "scheduler", consumer.as_str(), config.task_timeout_ms, None).await?);
        let build_output_queue: Arc<ReliableQueue<BuildOutput>> = Arc::new(
            ReliableQueue::new(store.clone(), "build_output", "scheduler_build_output", consumer.as_str(), config.task_timeout_ms, None).await?,
        );
        let delete_queue: Arc<ReliableQueue<TaskDelete>> =
            Arc::new(ReliableQueue::new(store.clone(), "delete_task", "scheduler", consumer.as_str(), config.task_timeout_ms, None).await?);
        let crash_queue: Arc<ReliableQueue<TracedCrash>> =
            Arc::new(ReliableQueue::new(store.clone(), "crash", "orchestrator_tasks_group", consumer.as_str(), config.task_timeout_ms, None).await?);
        let unique_vulnerabilities_queue: Arc<ReliableQueue<Crash>> = Arc::new(
            ReliableQueue::new(store.clone(), "unique_vulnerabilities", "unique_vulnerabilities", consumer.as_str(), config.task_timeout_ms, None).await?,
        );
        let confirmed_vulnerabilities_queue: Arc<ReliableQueue<ConfirmedVulnerability>> = Arc::new(
            ReliableQueue::new(store.clone(), "confirmed_vulnerabilities", "patcher", consumer.as_str(), config.task_timeout_ms, None).await?,
        );
        let patches_queue: Arc<ReliableQueue<Patch>> =
            Arc::new(ReliableQueue::new(store.clone(), "patches", "patcher", consumer.as_str(), config.task_timeout_ms, None).await?);

        let bundles = Arc::new(Bundles::new(tracker.clone(), registry.clone(), api.clone()));

        let mut background_tasks = BackgroundTaskManager::new();
        background_tasks.register(
            Arc::new(PovReproducerTask::new(
                pov_status,
                registry.clone(),
                build_map.clone(),
                reproduce_driver,
                Duration::from_secs(config.reproduce_timeout_secs),
                config.pov_max_retries,
            )),
            Duration::from_millis(config.pov_reproducer_interval_ms),
        );
        background_tasks.register(
            Arc::new(CorpusMergerTask::new(
                store,
                harness_weights.clone(),
                build_map.clone(),
                config.merge_lock_ttl_secs,
                "/usr/local/bin/crs-corpus-merge".to_string(),
                Duration::from_secs(600),
            )),
            Duration::from_secs(config.corpus_merger_interval_secs),
        );
        background_tasks.register(
            Arc::new(ScratchCleanerTask::new(registry.clone(), config.scratch_dir.clone(), config.scratch_grace_secs)),
            Duration::from_secs(config.scratch_cleaner_interval_secs),
        );

        Ok(Self {
            ready_task: ReadyTaskSubserve::new(ready_queue, build_requests_queue, config.poison_threshold),
            build_output: BuildOutputSubserve::new(build_output_queue, build_map, harness_weights, target_lister, config.poison_threshold),
            cancellation: CancellationSubserve::new(delete_queue, registry),
            crash_dedup: CrashDedupSubserve::new(crash_queue, unique_vulnerabilities_queue.clone(), crash_deduper, config.poison_threshold),
            vulnerabilities: VulnerabilitySubmissionSubserve::new(unique_vulnerabilities_queue, confirmed_vulnerabilities_queue, api.clone()),
            patches: PatchSubmissionSubserve::new(patches_queue, tracker, api),
            bundles: BundleSubmissionSubserve::new(bundles),
            health: Arc::new(HealthTracker::new()),
            background_tasks,
            max_consecutive_errors: config.max_consecutive_errors,
            sleep_time: Duration::from_secs_f64(config.sleep_time_secs),
        })
    }

    /// One full pass over every sub-serve. Returns `true` iff any
    /// sub-serve did work this tick.
    pub async fn tick(&self, now: i64) -> bool {
        macro_rules! run {
            ($name:literal, $call:expr) => {{
                let did_work = match $call.await {
                    Ok(did_work) => {
                        self.health.record($name, now, did_work, false);
                        did_work
                    }
                    Err(e) => {
                        tracing::error!(subserve = $name, error = %e, "sub-serve failed");
                        self.health.record($name, now, false, true);
                        false
                    }
                };
                crs_core::obs::emit_subserve_tick($name, did_work);
                did_work
            }};
        }

        let mut did_work = run!("ready_task", self.ready_task.serve());
        did_work |= run!("build_output", self.build_output.serve());
        did_work |= run!("cancellation", self.cancellation.serve(now));
        did_work |= run!("crash_dedup", self.crash_dedup.serve());
        did_work |= run!("vulnerabilities", self.vulnerabilities.serve());
        did_work |= run!("patches", self.patches.serve());
        did_work |= run!("bundles", self.bundles.serve(now));

        did_work
    }

    pub fn health_snapshot(&self) -> HealthSnapshot {
        build_snapshot(self.health.snapshot(), self.background_tasks.statuses(), self.max_consecutive_errors)
    }

    /// The main loop (§4.7): tick immediately while work keeps
    /// arriving, sleep only once a tick finds nothing to do.
    pub async fn run(&self) -> ! {
        info!("starting scheduler service");
        loop {
            let now = chrono::Utc::now().timestamp();
            let did_work = self.tick(now).await;
            if !did_work {
                tokio::time::sleep(self.sleep_time).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::{FilesystemFuzzTargetLister, IdentityCrashDeduper, MockCompetitionApi};
    use clap::Parser;
    use crs_runner::fakes::FakeReproduceDriver;
    use crs_store::fakes::MemoryStore;

    async fn scheduler() -> Scheduler {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let config = SchedulerConfig::parse_from(["crs-scheduler"]);
        Scheduler::new(SchedulerComponents {
            store,
            config,
            api: Arc::new(MockCompetitionApi),
            crash_deduper: Arc::new(IdentityCrashDeduper),
            target_lister: Arc::new(FilesystemFuzzTargetLister),
            reproduce_driver: Arc::new(FakeReproduceDriver::new()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn empty_tick_reports_no_work_and_healthy_snapshot() {
        let s = scheduler().await;
        assert!(!s.tick(0).await);
        let snapshot = s.health_snapshot();
        assert!(snapshot.healthy);
    }

    #[tokio::test]
    async fn ready_task_push_is_drained_on_next_tick() {
        let s = scheduler().await;
        s.ready_task
            .serve()
            .await
            .unwrap();
        assert!(!s.tick(0).await);
    }
}
