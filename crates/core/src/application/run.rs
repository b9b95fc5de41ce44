// Process Handle - one external-tool run with lifecycle tracking

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::domain::{RunStatus, ToolInvocation};
use crate::port::{ExecutionError, SpawnedTool, TimeProvider, ToolSpawner, WaitOutcome};

/// Starts tool runs; holds the spawner and clock they share
///
/// One runner is created per orchestrator lifetime with the tool path already
/// resolved, so no global environment is re-read at invocation time.
pub struct ToolRunner {
    spawner: Arc<dyn ToolSpawner>,
    time_provider: Arc<dyn TimeProvider>,
}

impl ToolRunner {
    pub fn new(spawner: Arc<dyn ToolSpawner>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            spawner,
            time_provider,
        }
    }

    /// Spawn the invocation non-blocking and hand back its run handle
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the OS refused to create the process;
    ///   no handle is created in that case
    pub async fn start(&self, invocation: ToolInvocation) -> Result<ToolRun, ExecutionError> {
        debug!(
            executable = %invocation.executable.display(),
            target = %invocation.target.display(),
            args = ?invocation.command_args(),
            "Spawning external tool"
        );

        let process = self.spawner.spawn(&invocation).await?;
        let pid = process.pid();
        let started_at = self.time_provider.now_millis();

        info!(
            pid = %pid,
            target = %invocation.target.display(),
            "Tool process started"
        );

        Ok(ToolRun {
            invocation,
            pid,
            started_at,
            status: RunStatus::Running,
            exit_code: None,
            process,
        })
    }
}

/// Handle over one running tool process
///
/// Exclusively owned by its creator; the only entity permitted to signal its
/// pid. Status transitions only move forward (see [`RunStatus`]).
pub struct ToolRun {
    invocation: ToolInvocation,
    pid: u32,
    started_at: i64,
    status: RunStatus,
    exit_code: Option<i32>,
    process: Box<dyn SpawnedTool>,
}

impl ToolRun {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Epoch milliseconds at which the process was spawned
    pub fn started_at(&self) -> i64 {
        self.started_at
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn invocation(&self) -> &ToolInvocation {
        &self.invocation
    }

    /// Real exit code, cached once the process has been reaped
    pub fn return_code(&self) -> Option<i32> {
        self.exit_code
    }

    /// Block until the process exits or `timeout` elapses
    ///
    /// Natural exit moves the handle to COMPLETED and caches the code;
    /// calling `wait` again afterwards returns the cached code without
    /// touching the OS. A timeout moves the handle to TIMED_OUT and returns
    /// `WaitOutcome::TimedOut` - it never kills, escalation is the caller's
    /// decision.
    pub async fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome, ExecutionError> {
        if let Some(code) = self.exit_code {
            return Ok(WaitOutcome::Exited(code));
        }

        match self.process.wait(timeout).await? {
            WaitOutcome::Exited(code) => {
                self.exit_code = Some(code);
                if self.status != RunStatus::Killed {
                    self.status = RunStatus::Completed;
                }
                debug!(pid = %self.pid, code = %code, "Tool process exited");
                Ok(WaitOutcome::Exited(code))
            }
            WaitOutcome::TimedOut => {
                self.status = RunStatus::TimedOut;
                debug!(pid = %self.pid, "Wait timed out, process still running");
                Ok(WaitOutcome::TimedOut)
            }
        }
    }

    /// Terminate the process and all its live descendants
    ///
    /// Best-effort: signaling failures are logged and the handle still moves
    /// to KILLED, since an orphan beats retrying forever. Idempotent - a
    /// COMPLETED or already KILLED handle is left untouched and killing a
    /// dead process tree is a no-op.
    pub async fn kill(&mut self) {
        if self.status.is_terminal() {
            debug!(pid = %self.pid, status = %self.status, "Kill skipped, run already terminal");
            return;
        }

        if let Err(e) = self.process.kill().await {
            warn!(
                pid = %self.pid,
                error = %e,
                "Process tree kill incomplete, proceeding anyway"
            );
        }
        self.status = RunStatus::Killed;

        info!(
            pid = %self.pid,
            target = %self.invocation.target.display(),
            "Tool process killed"
        );
    }

    /// Non-blocking liveness check, descendants included
    pub fn is_alive(&mut self) -> bool {
        if self.status.is_terminal() {
            return false;
        }
        self.process.is_alive()
    }
}
