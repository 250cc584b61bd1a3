// ── Host runner ──
//
// `SystemRunner` executes operations with `tokio::process`. The child is
// killed when the timeout drops its future.

use std::process::Stdio;
use std::time::Duration;

use futures_util::future::BoxFuture;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::{CommandOutput, CommandRunner, Operation, RunOutcome, SPAWN_FAILURE_EXIT};
use crate::adapters::{HotplugEvent, parse_monitor_line};

/// Runs operations as real processes on the host.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner;

impl SystemRunner {
    pub fn new() -> Self {
        Self
    }

    async fn execute(operation: &Operation, timeout: Duration) -> RunOutcome {
        let program = operation.program();
        let args = operation.args();
        debug!(op = %operation, timeout_ms = timeout.as_millis(), "running");

        let child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output();

        match tokio::time::timeout(timeout, child).await {
            Ok(Ok(output)) => {
                let result = CommandOutput {
                    exit_code: output.status.code().unwrap_or(-1),
                    stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                };
                if !result.is_success() && operation.is_mutating() {
                    debug!(op = %operation, exit_code = result.exit_code, stderr = %result.stderr.trim(), "non-zero exit");
                }
                RunOutcome::Exited(result)
            }
            Ok(Err(e)) => {
                warn!(program, error = %e, "failed to spawn");
                RunOutcome::Exited(CommandOutput::failure(
                    SPAWN_FAILURE_EXIT,
                    format!("failed to spawn {program}: {e}"),
                ))
            }
            Err(_) => {
                warn!(op = %operation, "timed out");
                RunOutcome::TimedOut
            }
        }
    }
}

impl CommandRunner for SystemRunner {
    fn run<'a>(&'a self, operation: &'a Operation, timeout: Duration) -> BoxFuture<'a, RunOutcome> {
        Box::pin(Self::execute(operation, timeout))
    }
}

/// Follow `ip -o monitor link` and forward link changes as hotplug events
/// until cancelled or the monitor exits.
pub fn spawn_link_monitor(
    tx: mpsc::Sender<HotplugEvent>,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut child = match Command::new("ip")
            .args(["-o", "monitor", "link"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                warn!(error = %e, "link monitor unavailable, hotplug events limited to explicit notifications");
                return;
            }
        };

        let Some(stdout) = child.stdout.take() else {
            return;
        };
        let mut lines = BufReader::new(stdout).lines();

        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                line = lines.next_line() => {
                    match line {
                        Ok(Some(line)) => {
                            let Some(event) = parse_monitor_line(&line) else {
                                continue;
                            };
                            if tx.send(event).await.is_err() {
                                break;
                            }
                        }
                        Ok(None) => {
                            warn!("link monitor exited");
                            break;
                        }
                        Err(e) => {
                            warn!(error = %e, "link monitor read failed");
                            break;
                        }
                    }
                }
            }
        }
        let _ = child.kill().await;
        debug!("link monitor stopped");
    })
}
