// System tool spawner
// Spawns the external disassembler via tokio::process and terminates whole
// process trees (the tool forks helpers that must not be orphaned).

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};
use tokio::time::timeout;
use tracing::{debug, warn};

use idascript_core::domain::ToolInvocation;
use idascript_core::port::{ExecutionError, SpawnedTool, ToolSpawner, WaitOutcome};

use crate::process_tree::{alive_subset, list_descendants};

/// Window between the graceful terminate signal and force-kill
const KILL_GRACE_PERIOD: Duration = Duration::from_secs(2);

/// Poll cadence while waiting out the grace period
const KILL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Spawner backed by real OS processes
pub struct SystemToolSpawner;

impl SystemToolSpawner {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SystemToolSpawner {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolSpawner for SystemToolSpawner {
    async fn spawn(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<Box<dyn SpawnedTool>, ExecutionError> {
        let child = Command::new(&invocation.executable)
            .args(invocation.command_args())
            .envs(invocation.environment_overlay())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ExecutionError::SpawnFailed(format!(
                    "{}: {}",
                    invocation.executable.display(),
                    e
                ))
            })?;

        let pid = child.id().ok_or_else(|| {
            ExecutionError::SpawnFailed("process exited before its pid could be read".to_string())
        })?;

        Ok(Box::new(SystemTool { pid, child }))
    }
}

/// One live external-tool process plus whatever it forked
pub struct SystemTool {
    pid: u32,
    child: Child,
}

impl SystemTool {
    #[cfg(unix)]
    async fn kill_tree(&mut self) -> Result<(), ExecutionError> {
        use nix::errno::Errno;
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        // Fresh scan right before signaling: descendants forked since any
        // earlier scan must be caught.
        let mut targets = list_descendants(self.pid);
        targets.insert(self.pid);

        for pid in &targets {
            sigterm(*pid);
        }

        // Grace period: give the tree a chance to exit on its own
        let deadline = tokio::time::Instant::now() + KILL_GRACE_PERIOD;
        loop {
            // Reap the root if it exited, so it does not linger as a zombie
            let _ = self.child.try_wait();

            if alive_subset(&targets).is_empty() {
                // A fork racing the scan above can slip in between it and
                // its parent's SIGTERM; one more scan before declaring the
                // tree dead.
                let stragglers = alive_subset(&list_descendants(self.pid));
                if stragglers.is_empty() {
                    return Ok(());
                }
                for pid in &stragglers {
                    sigterm(*pid);
                }
                targets.extend(stragglers);
            }
            if tokio::time::Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(KILL_POLL_INTERVAL).await;
        }

        // Rescan before force-kill: late forks are still fair game
        let mut survivors = list_descendants(self.pid);
        survivors.insert(self.pid);

        for pid in alive_subset(&survivors) {
            match kill(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                Ok(()) => debug!(pid = %pid, "Sent SIGKILL"),
                Err(Errno::ESRCH) => {}
                Err(e) => warn!(pid = %pid, error = %e, "SIGKILL failed, orphan may persist"),
            }
        }

        let _ = self.child.try_wait();
        Ok(())
    }

    #[cfg(windows)]
    async fn kill_tree(&mut self) -> Result<(), ExecutionError> {
        // taskkill /T takes the whole tree down in one call
        let output = Command::new("taskkill")
            .args(["/T", "/F", "/PID", &self.pid.to_string()])
            .output()
            .await
            .map_err(|e| ExecutionError::KillFailed(e.to_string()))?;

        if !output.status.success() {
            warn!(
                pid = %self.pid,
                stderr = %String::from_utf8_lossy(&output.stderr),
                "taskkill reported failure"
            );
        }

        let _ = self.child.try_wait();
        Ok(())
    }
}

#[async_trait]
impl SpawnedTool for SystemTool {
    fn pid(&self) -> u32 {
        self.pid
    }

    async fn wait(&mut self, wait_timeout: Option<Duration>) -> Result<WaitOutcome, ExecutionError> {
        let status = match wait_timeout {
            Some(limit) => match timeout(limit, self.child.wait()).await {
                Ok(waited) => waited.map_err(|e| ExecutionError::IoError(e.to_string()))?,
                Err(_) => return Ok(WaitOutcome::TimedOut),
            },
            None => self
                .child
                .wait()
                .await
                .map_err(|e| ExecutionError::IoError(e.to_string()))?,
        };

        Ok(WaitOutcome::Exited(exit_code_of(status)))
    }

    async fn kill(&mut self) -> Result<(), ExecutionError> {
        let root_exited = matches!(self.child.try_wait(), Ok(Some(_)));
        if root_exited && alive_subset(&list_descendants(self.pid)).is_empty() {
            debug!(pid = %self.pid, "Kill on dead process tree, nothing to do");
            return Ok(());
        }
        self.kill_tree().await
    }

    fn is_alive(&mut self) -> bool {
        if matches!(self.child.try_wait(), Ok(None)) {
            return true;
        }
        !alive_subset(&list_descendants(self.pid)).is_empty()
    }
}

/// Best-effort graceful terminate; a vanished pid is not an error
#[cfg(unix)]
fn sigterm(pid: u32) {
    use nix::errno::Errno;
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;

    match kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
        Ok(()) => debug!(pid = %pid, "Sent SIGTERM"),
        Err(Errno::ESRCH) => {}
        Err(e) => warn!(pid = %pid, error = %e, "SIGTERM failed"),
    }
}

/// Real exit code of a reaped process; a signal death reports `-signal`
fn exit_code_of(status: std::process::ExitStatus) -> i32 {
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        status
            .code()
            .or_else(|| status.signal().map(|s| -s))
            .unwrap_or(0)
    }
    #[cfg(not(unix))]
    {
        status.code().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use idascript_core::domain::{InvocationTemplate, ToolBitness, ToolMode};
    use std::path::Path;

    fn invocation(executable: &Path) -> ToolInvocation {
        InvocationTemplate::script_mode(
            executable,
            ToolBitness::B64,
            ToolMode::Headless,
            "/tmp/script.py",
            vec![],
        )
        .for_target("/bin/ls")
    }

    #[cfg(unix)]
    fn stub_executable(dir: &Path, body: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("stub");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_spawn_missing_executable_fails() {
        let spawner = SystemToolSpawner::new();
        let result = spawner
            .spawn(&invocation(Path::new("/nonexistent/ida64c")))
            .await;
        assert!(matches!(result, Err(ExecutionError::SpawnFailed(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_reports_real_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_executable(dir.path(), "exit 42");

        let spawner = SystemToolSpawner::new();
        let mut tool = spawner.spawn(&invocation(&stub)).await.unwrap();
        assert_eq!(tool.wait(None).await.unwrap(), WaitOutcome::Exited(42));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_wait_timeout_leaves_process_running() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_executable(dir.path(), "sleep 30");

        let spawner = SystemToolSpawner::new();
        let mut tool = spawner.spawn(&invocation(&stub)).await.unwrap();

        let outcome = tool.wait(Some(Duration::from_millis(50))).await.unwrap();
        assert_eq!(outcome, WaitOutcome::TimedOut);
        assert!(tool.is_alive());

        tool.kill().await.unwrap();
        assert!(!tool.is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_returns_early_once_tree_is_dead() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_executable(dir.path(), "sleep 30");

        let spawner = SystemToolSpawner::new();
        let mut tool = spawner.spawn(&invocation(&stub)).await.unwrap();
        tool.wait(Some(Duration::from_millis(50))).await.unwrap();

        // SIGTERM takes the tree down; the grace period must not be waited out
        let start = tokio::time::Instant::now();
        tool.kill().await.unwrap();
        assert!(start.elapsed() < KILL_GRACE_PERIOD);
        assert!(!tool.is_alive());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_kill_on_exited_process_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let stub = stub_executable(dir.path(), "exit 0");

        let spawner = SystemToolSpawner::new();
        let mut tool = spawner.spawn(&invocation(&stub)).await.unwrap();
        tool.wait(None).await.unwrap();

        tool.kill().await.unwrap();
        assert!(!tool.is_alive());
    }
}
