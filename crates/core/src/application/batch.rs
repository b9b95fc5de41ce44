// Batch Runner - bounded worker pool over a lazy sequence of targets
//
// Worker-pool model: max_concurrent tasks each own at most one live process,
// pulling paths from a shared input iterator and pushing outcomes into a
// bounded channel. The concurrency invariant holds by construction.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::run::ToolRunner;
use crate::domain::{
    BatchOutcome, InvocationTemplate, SPAWN_RETURNCODE, TIMEOUT_RETURNCODE,
};
use crate::port::WaitOutcome;

/// Knobs for one batch run
#[derive(Debug, Clone)]
pub struct BatchConfig {
    /// Upper bound on simultaneously running tool processes
    pub max_concurrent: usize,
    /// Per-job wall-clock limit; `None` waits forever
    pub timeout: Option<Duration>,
}

impl BatchConfig {
    pub fn new(max_concurrent: usize, timeout: Option<Duration>) -> Self {
        Self {
            max_concurrent,
            timeout,
        }
    }
}

type SharedPaths = Arc<Mutex<Box<dyn Iterator<Item = PathBuf> + Send>>>;

/// Drives a concurrency-bounded batch of tool runs
pub struct BatchRunner {
    runner: Arc<ToolRunner>,
}

impl BatchRunner {
    pub fn new(runner: Arc<ToolRunner>) -> Self {
        Self { runner }
    }

    /// Launch the batch and return its lazily-consumed outcome stream
    ///
    /// Outcomes arrive in completion order, not input order. The stream is
    /// exhausted once the input is drained and every in-flight job reached a
    /// terminal outcome; an empty input yields an empty stream with zero
    /// processes spawned. Dropping the stream early closes the channel, and
    /// each worker kills its in-flight process tree before exiting - no
    /// subprocess outlives an abandoned batch.
    pub fn run<I>(&self, paths: I, template: InvocationTemplate, config: BatchConfig) -> BatchStream
    where
        I: IntoIterator<Item = PathBuf>,
        I::IntoIter: Send + 'static,
    {
        let workers = config.max_concurrent.max(1);
        let paths: SharedPaths = Arc::new(Mutex::new(Box::new(paths.into_iter())));
        let (tx, rx) = mpsc::channel::<BatchOutcome>(workers);

        info!(
            workers = %workers,
            timeout = ?config.timeout,
            executable = %template.executable().display(),
            "Starting batch run"
        );

        for worker_id in 0..workers {
            let paths = Arc::clone(&paths);
            let tx = tx.clone();
            let runner = Arc::clone(&self.runner);
            let template = template.clone();
            let timeout = config.timeout;

            // Detached on purpose: a worker mid-kill must be allowed to
            // finish its teardown even after the stream is dropped.
            tokio::spawn(async move {
                loop {
                    if tx.is_closed() {
                        break;
                    }

                    let path = match paths.lock() {
                        Ok(mut iter) => iter.next(),
                        Err(_) => break,
                    };
                    let Some(path) = path else { break };

                    let Some(outcome) =
                        Self::run_one(&runner, &template, path, timeout, &tx).await
                    else {
                        // Consumer abandoned the stream mid-run; the job was
                        // reaped, nothing left to report.
                        break;
                    };

                    if tx.send(outcome).await.is_err() {
                        break;
                    }
                }
                debug!(worker_id = %worker_id, "Batch worker finished");
            });
        }

        BatchStream { rx }
    }

    /// Run a single job to its terminal outcome
    ///
    /// Returns `None` only when the consumer dropped the stream while the
    /// job was in flight (the process tree is killed before returning).
    async fn run_one(
        runner: &ToolRunner,
        template: &InvocationTemplate,
        path: PathBuf,
        timeout: Option<Duration>,
        tx: &mpsc::Sender<BatchOutcome>,
    ) -> Option<BatchOutcome> {
        let mut run = match runner.start(template.for_target(&path)).await {
            Ok(run) => run,
            Err(e) => {
                warn!(
                    path = %path.display(),
                    error = %e,
                    "Tool could not be started, recording spawn sentinel"
                );
                return Some(BatchOutcome {
                    return_code: SPAWN_RETURNCODE,
                    path,
                });
            }
        };

        let waited = tokio::select! {
            result = run.wait(timeout) => Some(result),
            _ = tx.closed() => None,
        };

        match waited {
            Some(Ok(WaitOutcome::Exited(code))) => Some(BatchOutcome {
                return_code: code,
                path,
            }),
            Some(Ok(WaitOutcome::TimedOut)) => {
                warn!(
                    path = %path.display(),
                    pid = %run.pid(),
                    "Job exceeded timeout, killing process tree"
                );
                run.kill().await;
                Some(BatchOutcome {
                    return_code: TIMEOUT_RETURNCODE,
                    path,
                })
            }
            Some(Err(e)) => {
                warn!(
                    path = %path.display(),
                    pid = %run.pid(),
                    error = %e,
                    "Wait failed, killing process tree"
                );
                run.kill().await;
                Some(BatchOutcome {
                    return_code: SPAWN_RETURNCODE,
                    path,
                })
            }
            None => {
                debug!(
                    pid = %run.pid(),
                    path = %path.display(),
                    "Output stream abandoned, reaping in-flight job"
                );
                run.kill().await;
                None
            }
        }
    }
}

/// Lazily-consumed stream of batch outcomes, completion order
///
/// Single-pass and non-restartable; dropping it tears the batch down.
pub struct BatchStream {
    rx: mpsc::Receiver<BatchOutcome>,
}

impl BatchStream {
    /// Next terminal outcome, or `None` once the batch is exhausted
    pub async fn next(&mut self) -> Option<BatchOutcome> {
        self.rx.recv().await
    }
}

impl futures::Stream for BatchStream {
    type Item = BatchOutcome;

    fn poll_next(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{RunVerdict, ToolBitness, ToolMode};
    use crate::port::time_provider::SystemTimeProvider;
    use crate::port::tool_spawner::mocks::{MockBehavior, MockSpawner};
    use std::collections::HashSet;

    fn template() -> InvocationTemplate {
        InvocationTemplate::script_mode(
            "/opt/ida/ida64c",
            ToolBitness::B64,
            ToolMode::Headless,
            "/tmp/script.py",
            vec![],
        )
    }

    fn paths(n: usize) -> Vec<PathBuf> {
        (0..n).map(|i| PathBuf::from(format!("/bin/file{}", i))).collect()
    }

    fn batch(spawner: Arc<MockSpawner>) -> BatchRunner {
        BatchRunner::new(Arc::new(ToolRunner::new(spawner, Arc::new(SystemTimeProvider))))
    }

    #[tokio::test]
    async fn test_empty_input_yields_empty_stream() {
        let spawner = Arc::new(MockSpawner::new_exiting(0, Duration::from_millis(1)));
        let runner = batch(Arc::clone(&spawner));

        let mut stream = runner.run(Vec::new(), template(), BatchConfig::new(4, None));
        assert!(stream.next().await.is_none());
        assert_eq!(spawner.spawn_count(), 0);
    }

    #[tokio::test]
    async fn test_every_job_yields_exactly_one_outcome() {
        let spawner = Arc::new(MockSpawner::new_exiting(0, Duration::from_millis(5)));
        let runner = batch(Arc::clone(&spawner));

        let mut stream = runner.run(paths(10), template(), BatchConfig::new(3, None));
        let mut seen = HashSet::new();
        while let Some(outcome) = stream.next().await {
            assert_eq!(outcome.return_code, 0);
            assert!(seen.insert(outcome.path), "duplicate outcome");
        }
        assert_eq!(seen.len(), 10);
        assert_eq!(spawner.spawn_count(), 10);
    }

    #[tokio::test]
    async fn test_concurrency_bound_is_respected() {
        let spawner = Arc::new(MockSpawner::new_exiting(0, Duration::from_millis(30)));
        let runner = batch(Arc::clone(&spawner));

        let mut stream = runner.run(paths(12), template(), BatchConfig::new(3, None));
        let mut count = 0;
        while stream.next().await.is_some() {
            count += 1;
        }
        assert_eq!(count, 12);
        assert!(
            spawner.max_running() <= 3,
            "observed {} simultaneous runs",
            spawner.max_running()
        );
    }

    #[tokio::test]
    async fn test_timeout_yields_sentinel_not_real_code() {
        // Process would exit 0 eventually; the timeout must win
        let spawner = Arc::new(MockSpawner::new_exiting(0, Duration::from_secs(60)));
        let runner = batch(Arc::clone(&spawner));

        let mut stream = runner.run(
            paths(4),
            template(),
            BatchConfig::new(2, Some(Duration::from_millis(10))),
        );
        let mut count = 0;
        while let Some(outcome) = stream.next().await {
            assert_eq!(outcome.return_code, TIMEOUT_RETURNCODE);
            assert_eq!(outcome.verdict(), RunVerdict::Timeout);
            count += 1;
        }
        assert_eq!(count, 4);
    }

    #[tokio::test]
    async fn test_spawn_failure_yields_sentinel_and_continues() {
        let spawner = Arc::new(MockSpawner::new(MockBehavior::FailSpawn("missing".into())));
        let runner = batch(Arc::clone(&spawner));

        let mut stream = runner.run(paths(5), template(), BatchConfig::new(2, None));
        let mut count = 0;
        while let Some(outcome) = stream.next().await {
            assert_eq!(outcome.return_code, SPAWN_RETURNCODE);
            count += 1;
        }
        assert_eq!(count, 5, "no job may be silently dropped");
    }

    #[tokio::test]
    async fn test_dropping_stream_reaps_in_flight_jobs() {
        let spawner = Arc::new(MockSpawner::new_exiting(0, Duration::from_secs(60)));
        let runner = batch(Arc::clone(&spawner));

        let stream = runner.run(paths(6), template(), BatchConfig::new(3, None));
        // Give the workers time to start their first jobs, then abandon
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(stream);

        // Workers observe the closed channel and kill what they own
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(spawner.running(), 0, "in-flight jobs must be reaped");
        assert!(spawner.spawn_count() <= 3 + 3, "no new jobs after abandonment");
    }
}
