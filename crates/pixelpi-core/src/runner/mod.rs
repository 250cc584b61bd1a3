// ── External command execution ──
//
// The single seam between the engine and the host. Runners are stateless
// and retry-free: each call is individually time-bounded, a non-zero exit
// is data, and callers compose retries themselves.

mod operation;
mod system;

use std::time::Duration;

use futures_util::future::BoxFuture;

use crate::error::CoreError;

pub use operation::{ConnectionProfile, Operation};
pub use system::{SystemRunner, spawn_link_monitor};

/// Exit code reported when the program could not be started at all.
pub const SPAWN_FAILURE_EXIT: i32 = 127;

/// Captured result of a finished process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Exited(CommandOutput),
    TimedOut,
}

impl RunOutcome {
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Exited(out) if out.is_success())
    }

    /// Stdout of a successful run.
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Exited(out) if out.is_success() => Some(&out.stdout),
            _ => None,
        }
    }

    /// Turn the outcome into a `Result`, treating a non-zero exit or a
    /// timeout as an error for callers that need the operation to succeed.
    pub fn into_result(self, operation: &Operation, timeout: Duration) -> Result<CommandOutput, CoreError> {
        match self {
            Self::Exited(out) if out.is_success() => Ok(out),
            Self::Exited(out) => Err(CoreError::CommandFailed {
                operation: operation.to_string(),
                exit_code: out.exit_code,
                stderr: out.stderr.trim().to_owned(),
            }),
            Self::TimedOut => Err(CoreError::Timeout {
                operation: operation.to_string(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

/// Executes operations against the host.
pub trait CommandRunner: Send + Sync {
    fn run<'a>(&'a self, operation: &'a Operation, timeout: Duration) -> BoxFuture<'a, RunOutcome>;
}

/// Run an operation that must succeed.
pub(crate) async fn run_checked(
    runner: &dyn CommandRunner,
    operation: &Operation,
    timeout: Duration,
) -> Result<CommandOutput, CoreError> {
    runner.run(operation, timeout).await.into_result(operation, timeout)
}
