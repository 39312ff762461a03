//! End-to-end pipeline tests: a task moving through ready-task fan-out,
//! a crash surfacing through dedup and submission, a patch being
//! recorded, and a cancellation sweep — all driven through a single
//! `Scheduler` wired to an in-memory store.

use std::sync::Arc;

use clap::Parser;

use crs_core::domain::{
    BuildOutput, BuildType, Crash, Patch, Task, TaskReady, TaskType, TracedCrash,
};
use crs_queue::ReliableQueue;
use crs_registry::TaskRegistry;
use crs_runner::fakes::FakeReproduceDriver;
use crs_scheduler::external::{FilesystemFuzzTargetLister, IdentityCrashDeduper, MockCompetitionApi};
use crs_scheduler::{Scheduler, SchedulerComponents, SchedulerConfig};
use crs_store::fakes::MemoryStore;
use crs_store::Store;

async fn scheduler_over(store: Arc<dyn Store>) -> Scheduler {
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

fn task(id: &str, deadline: i64) -> Task {
    Task {
        task_id: id.to_string(),
        project_name: "libpng".into(),
        deadline,
        task_type: TaskType::Full,
        sources: vec![],
        cancelled: false,
    }
}

fn crash(task_id: &str) -> Crash {
    Crash {
        harness_name: "fuzz_png".into(),
        crash_input_path: "/pov1".into(),
        target: BuildOutput {
            task_id: task_id.into(),
            build_type: BuildType::Fuzzer,
            sanitizer: "address".into(),
            engine: "libfuzzer".into(),
            package_name: "libpng".into(),
            internal_patch_id: String::new(),
            task_dir: "/out".into(),
        },
        stacktrace: "frame1\nframe2".into(),
        crash_token: "tok".into(),
    }
}

#[tokio::test]
async fn ready_task_fans_out_to_build_requests_then_tick_goes_quiet() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());

    let ready_queue: ReliableQueue<TaskReady> =
        ReliableQueue::new(store.clone(), "ready_tasks", "scheduler_ready_tasks", "c1", 60_000, None)
            .await
            .unwrap();
    ready_queue.push(&TaskReady { task: task("T1", 10_000_000_000) }).await.unwrap();

    let scheduler = scheduler_over(store.clone()).await;
    assert!(scheduler.tick(0).await, "first tick should drain the ready_tasks queue");
    assert!(!scheduler.tick(0).await, "second tick should find nothing left to do");

    let build_requests: ReliableQueue<crs_core::domain::BuildRequest> =
        ReliableQueue::new(store.clone(), "build", "scheduler", "verifier", 60_000, None)
            .await
            .unwrap();
    // Both variants (address fuzzer + coverage) were fanned out.
    assert!(build_requests.pop().await.unwrap().is_some());
    assert!(build_requests.pop().await.unwrap().is_some());
}

#[tokio::test]
async fn crash_flows_through_dedup_and_submission_into_confirmed_vulnerabilities() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let crash_queue: ReliableQueue<TracedCrash> =
        ReliableQueue::new(store.clone(), "crash", "orchestrator_tasks_group", "c1", 60_000, None)
            .await
            .unwrap();
    crash_queue
        .push(&TracedCrash { crash: crash("T1"), tracer_stacktrace: "frame1\nframe2".into() })
        .await
        .unwrap();

    let scheduler = scheduler_over(store.clone()).await;
    assert!(scheduler.tick(0).await, "crash dedup then vulnerability submission should both run");

    let confirmed: ReliableQueue<crs_core::domain::ConfirmedVulnerability> =
        ReliableQueue::new(store.clone(), "confirmed_vulnerabilities", "verifier", "v1", 60_000, None)
            .await
            .unwrap();
    let entry = confirmed.pop().await.unwrap().expect("crash should have been accepted and forwarded");
    assert_eq!(entry.deserialized.crash.harness_name, "fuzz_png");
}

#[tokio::test]
async fn patch_submission_records_status_and_vulnerability_mapping() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let patches_queue: ReliableQueue<Patch> =
        ReliableQueue::new(store.clone(), "patches", "patcher", "c1", 60_000, None)
            .await
            .unwrap();
    patches_queue
        .push(&Patch { task_id: "T1".into(), vuln_id: "V1".into(), diff: "--- a\n+++ b\n".into() })
        .await
        .unwrap();

    let scheduler = scheduler_over(store.clone()).await;
    assert!(scheduler.tick(0).await);

    let tracker = crs_submission::SubmissionTracker::new(store.clone());
    let pending = tracker.get_pending_patch_submissions().await.unwrap();
    // MockCompetitionApi accepts every patch with status Passed, a
    // terminal status, so nothing should remain pending.
    assert!(pending.is_empty());
}

#[tokio::test]
async fn cancellation_sweep_marks_expired_task_cancelled() {
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let registry = TaskRegistry::new(store.clone());
    registry.set(&task("T1", -1)).await.unwrap();

    let scheduler = scheduler_over(store.clone()).await;
    assert!(scheduler.tick(100).await, "timeout sweep should find the expired task");
    assert!(registry.is_cancelled("T1").await.unwrap());
}
