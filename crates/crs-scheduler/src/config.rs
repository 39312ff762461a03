//! Scheduler configuration, driven by `clap` with every flag also
//! readable from a `CRS_`-prefixed environment variable, mirroring the
//! teacher's `aivcs-cli` derive style and replacing the original
//! Python's `pydantic_settings.BaseSettings` config objects.

use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(name = "crs-scheduler")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Scheduler loop for the CRS work-coordination substrate", long_about = None)]
pub struct SchedulerConfig {
    /// Redis connection URL backing the key/value + stream substrate.
    #[arg(long, env = "CRS_REDIS_URL", default_value = "redis://127.0.0.1:6379")]
    pub redis_url: String,

    /// Max size of the Redis connection pool.
    #[arg(long, env = "CRS_REDIS_POOL_SIZE", default_value_t = 16)]
    pub redis_pool_size: usize,

    /// Stable consumer name prefix for this process's queues; combined
    /// with a per-queue suffix so in-flight entries survive a restart.
    #[arg(long, env = "CRS_CONSUMER_NAME", default_value = "scheduler")]
    pub consumer_name: String,

    /// Seconds to sleep between ticks when no sub-serve did work.
    #[arg(long, env = "CRS_SLEEP_TIME_SECS", default_value_t = 1.0)]
    pub sleep_time_secs: f64,

    /// Milliseconds of idle time before a queue entry is eligible for
    /// autoclaim by another consumer; also `ReliableQueue`'s
    /// `task_timeout_ms`.
    #[arg(long, env = "CRS_TASK_TIMEOUT_MS", default_value_t = 60_000)]
    pub task_timeout_ms: u64,

    /// Redelivery count above which a poisoned message is ack-dropped
    /// instead of retried forever (§7, §9).
    #[arg(long, env = "CRS_POISON_THRESHOLD", default_value_t = 10)]
    pub poison_threshold: u64,

    /// PoV reproducer background task interval, milliseconds.
    #[arg(long, env = "CRS_POV_REPRODUCER_INTERVAL_MS", default_value_t = 100)]
    pub pov_reproducer_interval_ms: u64,

    /// Corpus merger background task interval, seconds.
    #[arg(long, env = "CRS_CORPUS_MERGER_INTERVAL_SECS", default_value_t = 10)]
    pub corpus_merger_interval_secs: u64,

    /// Scratch cleaner background task interval, seconds.
    #[arg(long, env = "CRS_SCRATCH_CLEANER_INTERVAL_SECS", default_value_t = 60)]
    pub scratch_cleaner_interval_secs: u64,

    /// Grace period past deadline before a task's scratch directory is
    /// eligible for cleanup.
    #[arg(long, env = "CRS_SCRATCH_GRACE_SECS", default_value_t = 3600)]
    pub scratch_grace_secs: i64,

    /// Corpus-merge lock TTL, seconds (roughly one fuzzing cycle).
    #[arg(long, env = "CRS_MERGE_LOCK_TTL_SECS", default_value_t = 900)]
    pub merge_lock_ttl_secs: u64,

    /// Consecutive background-task errors before it is reported
    /// unhealthy in the status snapshot.
    #[arg(long, env = "CRS_MAX_CONSECUTIVE_ERRORS", default_value_t = 5)]
    pub max_consecutive_errors: u64,

    /// Directory under which per-task scratch checkouts live.
    #[arg(long, env = "CRS_SCRATCH_DIR", default_value = "/scratch")]
    pub scratch_dir: String,

    /// Script invoked by the build/reproduce driver as
    /// `{script} {build_dir} {harness_name} {pov_path}`.
    #[arg(long, env = "CRS_REPRODUCE_SCRIPT", default_value = "/usr/local/bin/crs-reproduce-pov")]
    pub reproduce_script: String,

    /// Wall-clock timeout for one PoV reproduction subprocess.
    #[arg(long, env = "CRS_REPRODUCE_TIMEOUT_SECS", default_value_t = 300)]
    pub reproduce_timeout_secs: u64,

    /// Max retries of a "did not run" PoV reproduction before it is
    /// treated as expired rather than retried forever.
    #[arg(long, env = "CRS_POV_MAX_RETRIES", default_value_t = 10)]
    pub pov_max_retries: u32,

    /// Base URL of the competition API (mock mode talks to nothing and
    /// fabricates responses locally).
    #[arg(long, env = "CRS_COMPETITION_API_URL", default_value = "http://competition-api:8080")]
    pub competition_api_url: String,

    /// Run against a fabricated in-process competition API instead of
    /// a real endpoint; useful for local development and demos.
    #[arg(long, env = "CRS_MOCK_MODE", default_value_t = false)]
    pub mock_mode: bool,

    /// Emit JSON-formatted log lines instead of human-readable ones.
    #[arg(long, env = "CRS_LOG_JSON", default_value_t = false)]
    pub json_logs: bool,
}
