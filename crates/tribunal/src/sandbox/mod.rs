//! Sandboxed compile and execute jobs.
//!
//! The executor runs exactly one job per container and guarantees the
//! container is removed on every exit path, including timeouts and caller
//! cancellation. Compile jobs get a read-write mount of the submission's work
//! directory; execute jobs get a read-only mount, no network, a dropped
//! capability set, and hard CPU/memory/PID limits.

use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

pub use crate::sandbox::executor::DockerExecutor;
use crate::error::Error;
use crate::model::Verdict;

mod executor;

/// Stdin stream fed into an execute job.
pub type StdinStream = Box<dyn tokio::io::AsyncRead + Send + Unpin>;

/// Failure of a sandboxed job: either a typed verdict (compilation error,
/// runtime error) or an infrastructure problem.
#[derive(Debug)]
pub enum ExecuteFailure {
    Verdict(Verdict),
    Internal(Error),
}

impl ExecuteFailure {
    pub fn internal(op: &'static str, message: impl Into<String>) -> Self {
        ExecuteFailure::Internal(Error::internal(op, message))
    }
}

impl From<Error> for ExecuteFailure {
    fn from(e: Error) -> Self {
        ExecuteFailure::Internal(e)
    }
}

impl From<Verdict> for ExecuteFailure {
    fn from(v: Verdict) -> Self {
        ExecuteFailure::Verdict(v)
    }
}

/// A backend able to run compile and execute jobs in isolation.
#[async_trait]
pub trait SandboxExecutor: Send + Sync {
    /// Run the language's compile command over `work_dir` (mounted
    /// read-write). Returns `Verdict::CompilationError` when the compiler
    /// exits non-zero.
    async fn compile(
        &self,
        cancel: &CancellationToken,
        language: &crate::config::LanguageConfig,
        work_dir: &Path,
    ) -> Result<(), ExecuteFailure>;

    /// Run the language's execute command over `work_dir` (mounted
    /// read-only), streaming `stdin` into the program. On success the
    /// program's stdout is left at `work_dir/output.txt` and the metrics
    /// stream at `work_dir/time.txt`, both synced to disk. Returns
    /// `Verdict::RuntimeError` on non-zero exit; a run that outlives
    /// `wall_timeout` is killed and reported as an internal failure.
    async fn execute(
        &self,
        cancel: &CancellationToken,
        language: &crate::config::LanguageConfig,
        work_dir: &Path,
        stdin: StdinStream,
        wall_timeout: Duration,
    ) -> Result<(), ExecuteFailure>;
}
