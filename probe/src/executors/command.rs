//! Shared subprocess plumbing for the non-HTTP executors (spec §4.D steps
//! 3/6): spawn the tool under `unbuffer` so its stdout stays line-buffered,
//! read it line by line, and enforce the per-command timeout.

use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};

pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(25);

pub fn spawn_unbuffered(tool: &str, args: &[String]) -> std::io::Result<Child> {
    Command::new("unbuffer")
        .arg(tool)
        .args(args)
        .stdout(std::process::Stdio::piped())
        .stderr(std::process::Stdio::piped())
        .kill_on_drop(true)
        .spawn()
}

/// Outcome of running a tool to completion (or until killed / timed out).
pub struct ToolOutcome {
    pub stdout: String,
    pub stderr: String,
    pub exit_success: bool,
    pub timed_out: bool,
    pub killed: bool,
}

/// Drives `child` to completion, calling `on_line` for every stdout line as
/// it arrives. `on_line` returns `true` to request the subprocess be killed
/// immediately (used by the private-IP guard in each executor).
pub async fn drive<F>(mut child: Child, timeout: Duration, mut on_line: F) -> ToolOutcome
where
    F: FnMut(&str) -> bool,
{
    let stdout = child.stdout.take().expect("piped stdout");
    let mut lines = BufReader::new(stdout).lines();
    let mut accumulated = String::new();
    let mut killed = false;

    let read_loop = async {
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    accumulated.push_str(&line);
                    accumulated.push('\n');
                    if on_line(&line) {
                        let _ = child.start_kill();
                        killed = true;
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => break,
            }
        }
    };

    let timed_out = tokio::time::timeout(timeout, read_loop).await.is_err();
    if timed_out {
        let _ = child.start_kill();
        killed = true;
    }

    let status = child.wait().await;
    let mut stderr = String::new();
    if let Some(mut stderr_pipe) = child.stderr.take() {
        use tokio::io::AsyncReadExt;
        let _ = stderr_pipe.read_to_string(&mut stderr).await;
    }

    ToolOutcome {
        stdout: accumulated,
        stderr,
        exit_success: status.map(|s| s.success()).unwrap_or(false),
        timed_out,
        killed,
    }
}
