use thiserror::Error;

#[derive(Error, Debug)]
pub enum RunnerError {
    #[error("failed to spawn {command}: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("command {command} in {cwd} exceeded its {timeout_ms}ms timeout and was killed")]
    TimedOut {
        command: String,
        cwd: String,
        timeout_ms: u64,
    },
}

pub type RunnerResult<T> = Result<T, RunnerError>;
