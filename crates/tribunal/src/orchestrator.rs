//! Per-submission testing pipeline.
//!
//! `Orchestrator::test` drives one submission through preparation,
//! compilation, and the per-test fan-out, emitting a finite stream of
//! [`TestingMessage`]s that ends after the final verdict or an internal
//! failure. Tests run in parallel through the shared worker pool and may
//! complete in any order; the verdict does not depend on ordering because a
//! solution is only accepted when every test passes.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use crate::cache::TestCache;
use crate::checker;
use crate::config::{Config, LanguageConfig};
use crate::error::Error;
use crate::metrics::Metrics;
use crate::model::{Packet, Submission, TestError, TestingMessage, Verdict};
use crate::pool::WorkerPool;
use crate::sandbox::{ExecuteFailure, SandboxExecutor, StdinStream};

/// One queued execution: a prepared scratch directory plus the reply channel
/// its verdict-relevant outcome travels back on.
pub struct ExecuteRequest {
    pub cancel: CancellationToken,
    pub language: LanguageConfig,
    pub work_dir: PathBuf,
    pub stdin: StdinStream,
    pub wall_timeout: Duration,
    pub reply: oneshot::Sender<Result<(), ExecuteFailure>>,
}

/// The process-wide pool executing queued requests.
pub type ExecutePool = WorkerPool<ExecuteRequest>;

/// Builds the testing pipeline for one judge process.
pub struct Orchestrator {
    config: Arc<Config>,
    cache: Arc<TestCache>,
    pool: Arc<ExecutePool>,
    executor: Arc<dyn SandboxExecutor>,
}

impl Orchestrator {
    /// Wire the pipeline up around a sandbox executor. The worker pool is
    /// sized from the configuration and shared by every submission.
    pub fn new(config: Arc<Config>, executor: Arc<dyn SandboxExecutor>) -> Self {
        let cache = Arc::new(TestCache::new(&config.cache_dir));
        let pool = {
            let executor = Arc::clone(&executor);
            Arc::new(WorkerPool::new(config.workers, move |req: ExecuteRequest| {
                let executor = Arc::clone(&executor);
                async move {
                    let result = executor
                        .execute(
                            &req.cancel,
                            &req.language,
                            &req.work_dir,
                            req.stdin,
                            req.wall_timeout,
                        )
                        .await;
                    let _ = req.reply.send(result);
                }
            }))
        };
        Self {
            config,
            cache,
            pool,
            executor,
        }
    }

    pub fn pool(&self) -> &Arc<ExecutePool> {
        &self.pool
    }

    /// Test one submission against its packet.
    ///
    /// Returns the progress stream. The stream is finite and not restartable;
    /// dropping the receiver stops the pipeline at its next emission. After
    /// `cancel` fires no new test is dispatched and in-flight runs die
    /// through the executor's kill path.
    pub fn test(
        &self,
        cancel: CancellationToken,
        packet: Packet,
        submission: Submission,
    ) -> mpsc::Receiver<TestingMessage> {
        let (tx, rx) = mpsc::channel(32);
        let pipeline = Pipeline {
            config: Arc::clone(&self.config),
            cache: Arc::clone(&self.cache),
            pool: Arc::clone(&self.pool),
            executor: Arc::clone(&self.executor),
        };
        tokio::spawn(pipeline.run(cancel, packet, submission, tx));
        rx
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workers", &self.config.workers)
            .finish_non_exhaustive()
    }
}

struct Pipeline {
    config: Arc<Config>,
    cache: Arc<TestCache>,
    pool: Arc<ExecutePool>,
    executor: Arc<dyn SandboxExecutor>,
}

impl Pipeline {
    #[instrument(skip_all, fields(solution_id = submission.solution_id, problem_id = packet.problem_id))]
    async fn run(
        self,
        cancel: CancellationToken,
        packet: Packet,
        submission: Submission,
        tx: mpsc::Sender<TestingMessage>,
    ) {
        const OP: &str = "orchestrator.test";

        if !send(&tx, TestingMessage::detail("Preparing")).await {
            return;
        }

        let tests_path = match self.cache.prepare(&packet).await {
            Ok(path) => path,
            Err(e) => {
                send(&tx, internal(OP, "failed to prepare tests", e)).await;
                return;
            }
        };

        let language = match self.config.language(submission.language) {
            Ok(language) => language.clone(),
            Err(e) => {
                send(&tx, internal(OP, "unknown language", e)).await;
                return;
            }
        };

        // Scratch directory for the submission: source plus compiled
        // artifact. Removed when this function returns, on every path.
        let scratch = match tempfile::Builder::new().prefix("tester.").tempdir() {
            Ok(dir) => dir,
            Err(e) => {
                send(&tx, internal(OP, "failed to create work dir", e)).await;
                return;
            }
        };

        let source_path = scratch.path().join("source");
        if let Err(e) = tokio::fs::write(&source_path, &submission.source).await {
            send(&tx, internal(OP, "failed to prepare source", e)).await;
            return;
        }

        let build_path = scratch.path().join("solution");
        if language.needs_compile() {
            if !send(&tx, TestingMessage::detail("Compiling")).await {
                return;
            }
            match self.executor.compile(&cancel, &language, scratch.path()).await {
                Ok(()) => {}
                Err(ExecuteFailure::Verdict(verdict)) => {
                    send(&tx, TestingMessage::failed(verdict, None)).await;
                    return;
                }
                Err(ExecuteFailure::Internal(e)) => {
                    send(&tx, internal(OP, "failed to compile", e)).await;
                    return;
                }
            }
        } else if let Err(e) = tokio::fs::copy(&source_path, &build_path).await {
            send(&tx, internal(OP, "failed to prepare build", e)).await;
            return;
        }

        if !send(&tx, TestingMessage::detail("Testing")).await {
            return;
        }

        let wall_timeout = self.config.wall_timeout(packet.time_limit_ms);
        let mut tests = JoinSet::new();
        for name in &packet.manifest.names {
            if cancel.is_cancelled() {
                debug!("cancelled, not dispatching further tests");
                break;
            }
            if !send(&tx, TestingMessage::detail(format!("Testing {name}"))).await {
                break;
            }

            let test = TestRun {
                name: name.clone(),
                tests_path: tests_path.clone(),
                build_path: build_path.clone(),
                language: language.clone(),
                time_limit_ms: packet.time_limit_ms,
                memory_limit_mib: packet.memory_limit_mib,
                wall_timeout,
                pool: Arc::clone(&self.pool),
                cancel: cancel.clone(),
            };
            let tx = tx.clone();
            tests.spawn(async move {
                let message = test.run().await;
                let _ = tx.send(message).await;
            });
        }

        while let Some(joined) = tests.join_next().await {
            if let Err(e) = joined {
                send(&tx, internal(OP, "test task failed", e)).await;
            }
        }
        // `scratch` lives until here: tests copy the artifact out of it
        // before executing.
    }
}

struct TestRun {
    name: String,
    tests_path: PathBuf,
    build_path: PathBuf,
    language: LanguageConfig,
    time_limit_ms: i64,
    memory_limit_mib: i64,
    wall_timeout: Duration,
    pool: Arc<ExecutePool>,
    cancel: CancellationToken,
}

impl TestRun {
    /// Run one test end to end: scratch dir, artifact copy, pooled
    /// execution, metrics, limit enforcement, output check.
    #[instrument(skip_all, fields(test = %self.name))]
    async fn run(self) -> TestingMessage {
        const OP: &str = "orchestrator.run_test";

        let test_dir = match tempfile::Builder::new().prefix("test.").tempdir() {
            Ok(dir) => dir,
            Err(e) => return internal(OP, "failed to create test dir", e),
        };

        if let Err(e) =
            tokio::fs::copy(&self.build_path, test_dir.path().join("solution")).await
        {
            return internal(OP, "failed to copy build", e);
        }

        let input_path = self.tests_path.join("tests").join(&self.name);
        let input = match tokio::fs::File::open(&input_path).await {
            Ok(file) => file,
            Err(e) => return internal(OP, "failed to open test input", e),
        };

        let (reply_tx, reply_rx) = oneshot::channel();
        let request = ExecuteRequest {
            cancel: self.cancel.clone(),
            language: self.language,
            work_dir: test_dir.path().to_path_buf(),
            stdin: Box::new(input),
            wall_timeout: self.wall_timeout,
            reply: reply_tx,
        };
        if let Err(e) = self.pool.submit(&self.cancel, request).await {
            return TestingMessage::failed(TestError::Internal(e), None);
        }

        match reply_rx.await {
            Ok(Ok(())) => {}
            Ok(Err(ExecuteFailure::Verdict(verdict))) => {
                return TestingMessage::failed(verdict, None);
            }
            Ok(Err(ExecuteFailure::Internal(e))) => {
                return TestingMessage::failed(TestError::Internal(e), None);
            }
            // The worker dropped the reply without sending: the execute task
            // panicked.
            Err(_) => {
                return TestingMessage::failed(
                    TestError::Internal(Error::internal(OP, "execute task died without a result")),
                    None,
                );
            }
        }

        let metrics = match Metrics::load(test_dir.path().join("time.txt")).await {
            Ok(metrics) => metrics,
            Err(e) => return internal(OP, "failed to parse metrics", e),
        };

        // Limits are enforced post hoc from the parsed metrics; equality is
        // within the limit for time, at the limit is over for memory.
        if metrics.elapsed_ms() > self.time_limit_ms {
            return TestingMessage::failed(Verdict::TimeLimitExceeded, Some(metrics));
        }
        if metrics.max_rss_kib >= self.memory_limit_mib * 1024 {
            return TestingMessage::failed(Verdict::MemoryLimitExceeded, Some(metrics));
        }

        let expected = self.tests_path.join("tests").join(format!("{}.a", self.name));
        let actual = test_dir.path().join("output.txt");
        let check = tokio::task::spawn_blocking(move || {
            checker::compare_files(&expected, &actual, checker::DEFAULT_EPSILON)
        })
        .await;

        match check {
            Ok(Ok(())) => TestingMessage::passed(&self.name, metrics),
            Ok(Err(TestError::Verdict(verdict))) => {
                TestingMessage::failed(verdict, Some(metrics))
            }
            Ok(Err(TestError::Internal(e))) => internal(OP, "failed to compare files", e),
            Err(e) => internal(OP, "checker task failed", e),
        }
    }
}

async fn send(tx: &mpsc::Sender<TestingMessage>, message: TestingMessage) -> bool {
    tx.send(message).await.is_ok()
}

fn internal(
    op: &'static str,
    message: &'static str,
    source: impl std::error::Error + Send + Sync + 'static,
) -> TestingMessage {
    TestingMessage::failed(TestError::Internal(Error::wrap(op, message, source)), None)
}
