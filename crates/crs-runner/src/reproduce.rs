//! The build/reproduce driver contract (§6): "given a build directory,
//! PoV path, and harness name, return `{did_run, did_crash, stdout,
//! stderr, returncode, stacktrace}`." The actual container/runner
//! orchestration is out of scope (§1); this module only defines the
//! trait the PoV-reproducer background task calls through, plus a
//! concrete driver that shells out to a configurable script and a fake
//! for tests.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::command::{run, CommandResult};
use crate::error::RunnerResult;

/// Mirrors the original's `ReproduceResult.did_run()` / `did_crash()`
/// split: a reproduce attempt can fail to even execute (bad
/// environment, missing build) distinctly from executing and not
/// crashing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReproduceOutcome {
    pub did_run: bool,
    pub did_crash: bool,
    pub command_result: CommandResult,
    pub stacktrace: String,
}

#[async_trait]
pub trait ReproduceDriver: Send + Sync {
    async fn reproduce(
        &self,
        build_dir: &str,
        harness_name: &str,
        pov_path: &str,
        timeout: Duration,
    ) -> RunnerResult<ReproduceOutcome>;
}

/// Shells out to a single configured script:
/// `{script} {build_dir} {harness_name} {pov_path}`. The script's exit
/// code is the "did it run at all" signal; a crash is detected by
/// convention as exit code 77 (mirroring libFuzzer's crash convention),
/// with everything else treated as "ran, did not crash."
pub struct ProcessReproduceDriver {
    script: String,
}

const CRASH_EXIT_CODE: i32 = 77;

impl ProcessReproduceDriver {
    pub fn new(script: impl Into<String>) -> Self {
        Self { script: script.into() }
    }
}

#[async_trait]
impl ReproduceDriver for ProcessReproduceDriver {
    async fn reproduce(
        &self,
        build_dir: &str,
        harness_name: &str,
        pov_path: &str,
        timeout: Duration,
    ) -> RunnerResult<ReproduceOutcome> {
        let cmd = vec![
            self.script.clone(),
            build_dir.to_string(),
            harness_name.to_string(),
            pov_path.to_string(),
        ];
        let result = run(&cmd, build_dir, timeout).await?;
        let did_crash = result.returncode == Some(CRASH_EXIT_CODE);
        Ok(ReproduceOutcome {
            did_run: true,
            did_crash,
            stacktrace: if did_crash { result.stderr.clone() } else { String::new() },
            command_result: result,
        })
    }
}

/// In-memory fake for tests, exposed unconditionally (mirrors
/// `crs_store::fakes::MemoryStore`) so downstream crates can exercise
/// the scheduler's background tasks without a real build/reproduce
/// environment.
pub mod fakes {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    /// Deterministic fake keyed by `pov_path`; anything not registered
    /// reports `did_run = false` (the "retry later" case).
    #[derive(Default)]
    pub struct FakeReproduceDriver {
        outcomes: Mutex<HashMap<String, ReproduceOutcome>>,
    }

    impl FakeReproduceDriver {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn set_outcome(&self, pov_path: &str, outcome: ReproduceOutcome) {
            self.outcomes.lock().unwrap().insert(pov_path.to_string(), outcome);
        }
    }

    #[async_trait]
    impl ReproduceDriver for FakeReproduceDriver {
        async fn reproduce(
            &self,
            _build_dir: &str,
            _harness_name: &str,
            pov_path: &str,
            _timeout: Duration,
        ) -> RunnerResult<ReproduceOutcome> {
            Ok(self
                .outcomes
                .lock()
                .unwrap()
                .get(pov_path)
                .cloned()
                .unwrap_or_default())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::fakes::FakeReproduceDriver;
    use super::*;

    #[tokio::test]
    async fn unregistered_pov_reports_did_not_run() {
        let driver = FakeReproduceDriver::new();
        let outcome = driver.reproduce("/out", "H", "/pov1", Duration::from_secs(1)).await.unwrap();
        assert!(!outcome.did_run);
    }

    #[tokio::test]
    async fn registered_pov_reports_configured_outcome() {
        let driver = FakeReproduceDriver::new();
        driver.set_outcome(
            "/pov1",
            ReproduceOutcome {
                did_run: true,
                did_crash: true,
                command_result: CommandResult::default(),
                stacktrace: "boom".into(),
            },
        );
        let outcome = driver.reproduce("/out", "H", "/pov1", Duration::from_secs(1)).await.unwrap();
        assert!(outcome.did_run);
        assert!(outcome.did_crash);
    }
}
