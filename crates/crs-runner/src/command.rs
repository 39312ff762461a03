//! `run(cmd, cwd, timeout) -> CommandResult`: the sole subprocess
//! abstraction the substrate needs over `docker`, `patch`, `rsync`,
//! `git`, and the project's own helper scripts (§9). Those tools
//! themselves are external collaborators; this module only owns
//! spawning, timeout enforcement, and output capture.

use std::process::Stdio;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::{RunnerError, RunnerResult};

/// The outcome of one subprocess invocation. Never raised as an
/// exception past the worker's own handler (§7) — callers inspect
/// `success` and `returncode` instead of matching on `Result` variants
/// for ordinary command failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub returncode: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

/// Run `cmd` (argv, `cmd[0]` is the program) in `cwd` with a hard
/// wall-clock `timeout`. On timeout the child is killed and
/// `RunnerError::TimedOut` is returned; any other spawn failure is
/// `RunnerError::Spawn`. Ordinary non-zero exit is not an error — it
/// comes back as `CommandResult { success: false, .. }`.
#[instrument(skip(cmd), fields(program = %cmd.first().map(String::as_str).unwrap_or("")))]
pub async fn run(cmd: &[String], cwd: &str, timeout: Duration) -> RunnerResult<CommandResult> {
    let (program, args) = cmd.split_first().expect("cmd must have at least a program name");

    let mut child = Command::new(program)
        .args(args)
        .current_dir(cwd)
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|source| RunnerError::Spawn { command: program.clone(), source })?;

    let stdout = child.stdout.take().expect("piped stdout");
    let stderr = child.stderr.take().expect("piped stderr");

    let stdout_task = tokio::spawn(collect_lines(stdout, false));
    let stderr_task = tokio::spawn(collect_lines(stderr, true));

    let wait = async {
        let status = child.wait().await;
        let out = stdout_task.await.unwrap_or_default();
        let err = stderr_task.await.unwrap_or_default();
        (status, out, err)
    };

    match tokio::time::timeout(timeout, wait).await {
        Ok((status, stdout, stderr)) => {
            let status = status.map_err(|source| RunnerError::Spawn { command: program.clone(), source })?;
            Ok(CommandResult {
                success: status.success(),
                returncode: status.code(),
                stdout,
                stderr,
            })
        }
        Err(_) => {
            warn!(command = %program, cwd = %cwd, timeout_ms = timeout.as_millis() as u64, "killing timed-out command");
            let _ = child.kill().await;
            Err(RunnerError::TimedOut {
                command: program.clone(),
                cwd: cwd.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            })
        }
    }
}

/// Forwards each line to `tracing::debug!` as it arrives and returns
/// the accumulated text, so slow commands still surface progress.
async fn collect_lines(stream: impl tokio::io::AsyncRead + Unpin, is_stderr: bool) -> String {
    let mut reader = BufReader::new(stream).lines();
    let mut out = String::new();
    while let Ok(Some(line)) = reader.next_line().await {
        debug!(stderr = is_stderr, "{line}");
        out.push_str(&line);
        out.push('\n');
    }
    out
}
