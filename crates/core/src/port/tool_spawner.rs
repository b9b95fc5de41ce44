// Tool Spawner Port
// Abstraction over starting and signaling the external disassembler process

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::ToolInvocation;

/// Result of waiting on a spawned tool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitOutcome {
    /// Natural exit with the process's real code (negative = signal on Unix)
    Exited(i32),
    /// The wait timeout elapsed; the process is still running
    TimedOut,
}

/// Execution errors
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Spawn failed: {0}")]
    SpawnFailed(String),

    #[error("Kill failed: {0}")]
    KillFailed(String),

    #[error("IO error: {0}")]
    IoError(String),
}

/// One live external-tool process
///
/// Exclusive owner of its pid: nothing else is permitted to signal it.
#[async_trait]
pub trait SpawnedTool: Send {
    /// OS process id, assigned at spawn
    fn pid(&self) -> u32;

    /// Block until the process exits or `timeout` elapses
    ///
    /// Never kills on timeout; escalation is the caller's decision.
    async fn wait(&mut self, timeout: Option<Duration>) -> Result<WaitOutcome, ExecutionError>;

    /// Terminate the process and all its live descendants, best-effort
    ///
    /// Graceful signal first, force-kill survivors after a grace period.
    /// A no-op on an already-dead process tree.
    async fn kill(&mut self) -> Result<(), ExecutionError>;

    /// Non-blocking liveness check, including descendants
    fn is_alive(&mut self) -> bool;
}

/// Tool Spawner trait
///
/// Implementations:
/// - SystemToolSpawner: spawns the real external process (infra-system)
/// - MockSpawner: instrumented in-memory fake for tests
#[async_trait]
pub trait ToolSpawner: Send + Sync {
    /// Spawn the invocation non-blocking
    ///
    /// # Errors
    /// - ExecutionError::SpawnFailed if the executable is missing or the OS
    ///   refuses to create the process; no partial state is left behind
    async fn spawn(
        &self,
        invocation: &ToolInvocation,
    ) -> Result<Box<dyn SpawnedTool>, ExecutionError>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    /// Mock spawner behavior
    #[derive(Debug, Clone)]
    pub enum MockBehavior {
        /// Exit with `code` after running for `runtime`
        Exit { code: i32, runtime: Duration },
        /// Refuse to spawn
        FailSpawn(String),
    }

    /// Mock Tool Spawner for testing
    ///
    /// Tracks spawn count and the high-water mark of simultaneously running
    /// mock processes, so tests can assert the concurrency bound.
    pub struct MockSpawner {
        behavior: MockBehavior,
        next_pid: AtomicU32,
        spawn_count: Arc<AtomicUsize>,
        running: Arc<AtomicUsize>,
        max_running: Arc<AtomicUsize>,
    }

    impl MockSpawner {
        pub fn new(behavior: MockBehavior) -> Self {
            Self {
                behavior,
                next_pid: AtomicU32::new(1000),
                spawn_count: Arc::new(AtomicUsize::new(0)),
                running: Arc::new(AtomicUsize::new(0)),
                max_running: Arc::new(AtomicUsize::new(0)),
            }
        }

        pub fn new_exiting(code: i32, runtime: Duration) -> Self {
            Self::new(MockBehavior::Exit { code, runtime })
        }

        pub fn spawn_count(&self) -> usize {
            self.spawn_count.load(Ordering::SeqCst)
        }

        /// Number of mock processes alive right now
        pub fn running(&self) -> usize {
            self.running.load(Ordering::SeqCst)
        }

        /// Highest number of mock processes alive at the same instant
        pub fn max_running(&self) -> usize {
            self.max_running.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ToolSpawner for MockSpawner {
        async fn spawn(
            &self,
            _invocation: &ToolInvocation,
        ) -> Result<Box<dyn SpawnedTool>, ExecutionError> {
            self.spawn_count.fetch_add(1, Ordering::SeqCst);

            match &self.behavior {
                MockBehavior::FailSpawn(msg) => Err(ExecutionError::SpawnFailed(msg.clone())),
                MockBehavior::Exit { code, runtime } => {
                    let now_running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
                    self.max_running.fetch_max(now_running, Ordering::SeqCst);

                    Ok(Box::new(MockTool {
                        pid: self.next_pid.fetch_add(1, Ordering::SeqCst),
                        code: *code,
                        deadline: Instant::now() + *runtime,
                        finished: AtomicBool::new(false),
                        running: Arc::clone(&self.running),
                    }))
                }
            }
        }
    }

    struct MockTool {
        pid: u32,
        code: i32,
        deadline: Instant,
        finished: AtomicBool,
        running: Arc<AtomicUsize>,
    }

    impl MockTool {
        fn finish(&self) {
            if !self.finished.swap(true, Ordering::SeqCst) {
                self.running.fetch_sub(1, Ordering::SeqCst);
            }
        }
    }

    #[async_trait]
    impl SpawnedTool for MockTool {
        fn pid(&self) -> u32 {
            self.pid
        }

        async fn wait(
            &mut self,
            timeout: Option<Duration>,
        ) -> Result<WaitOutcome, ExecutionError> {
            if self.finished.load(Ordering::SeqCst) {
                return Ok(WaitOutcome::Exited(self.code));
            }

            let remaining = self.deadline.saturating_duration_since(Instant::now());
            match timeout {
                Some(t) if t < remaining => {
                    tokio::time::sleep(t).await;
                    Ok(WaitOutcome::TimedOut)
                }
                _ => {
                    tokio::time::sleep(remaining).await;
                    self.finish();
                    Ok(WaitOutcome::Exited(self.code))
                }
            }
        }

        async fn kill(&mut self) -> Result<(), ExecutionError> {
            self.finish();
            Ok(())
        }

        fn is_alive(&mut self) -> bool {
            !self.finished.load(Ordering::SeqCst)
        }
    }

    impl Drop for MockTool {
        fn drop(&mut self) {
            self.finish();
        }
    }
}
