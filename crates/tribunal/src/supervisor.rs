//! Solution supervision: submission intake, stream consumption, verdict
//! aggregation, persistence, and event publishing.
//!
//! The supervisor is the sole writer of a solution row while it is being
//! tested. A solution's state moves from `Saved` to exactly one terminal
//! state; per-test outcomes never overwrite a terminal state. When the
//! orchestrator's stream ends with neither all tests passed nor a typed
//! verdict (an internal failure mid-run), the row is left untouched in
//! `Saved` and the incident is logged — a lost verdict rather than a wrong
//! one.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::{error, instrument, warn};

use crate::error::Error;
use crate::model::{
    MAX_SOURCE_BYTES, MESSAGE_TYPE_CREATE, MESSAGE_TYPE_UPDATE, Manifest, Packet, Solution,
    SolutionCreation, SolutionEvent, SolutionUpdate, SolutionsListItem, State, Submission,
    TestError, solution_events_subject,
};
use crate::orchestrator::Orchestrator;
use crate::publish::Publisher;
use crate::repo::SolutionRepo;

/// Problem metadata snapshot captured at submit time.
#[derive(Debug, Clone)]
pub struct ProblemInfo {
    pub id: i32,
    pub title: String,
    pub time_limit_ms: i64,
    pub memory_limit_mib: i64,
    pub updated_at: i64,
    pub manifest: Manifest,
}

/// Problem metadata and test archive access, backed externally by the
/// problem store and object storage.
#[async_trait]
pub trait Problems: Send + Sync {
    async fn get_problem(&self, problem_id: i32) -> Result<ProblemInfo, Error>;

    /// Fetch the problem's test archive and return its local path.
    ///
    /// Backends typically keep fetched archives under
    /// `<cache_dir>/archives/<problem_id>.zip` and serve repeat downloads
    /// from there.
    async fn download_tests(&self, problem_id: i32) -> Result<PathBuf, Error>;
}

/// Consumes orchestrator streams and owns solution state transitions.
#[derive(Clone)]
pub struct Supervisor {
    repo: Arc<dyn SolutionRepo>,
    problems: Arc<dyn Problems>,
    publisher: Arc<dyn Publisher>,
    orchestrator: Arc<Orchestrator>,
}

impl Supervisor {
    pub fn new(
        repo: Arc<dyn SolutionRepo>,
        problems: Arc<dyn Problems>,
        publisher: Arc<dyn Publisher>,
        orchestrator: Arc<Orchestrator>,
    ) -> Self {
        Self {
            repo,
            problems,
            publisher,
            orchestrator,
        }
    }

    /// Accept a submission: validate, persist, and start testing.
    ///
    /// Validation happens before any side effect. Problems with an empty test
    /// manifest short-circuit to `Accepted` without spawning a test run.
    #[instrument(skip_all, fields(problem_id = creation.problem_id, user_id = creation.user_id))]
    pub async fn create_solution(
        &self,
        cancel: &CancellationToken,
        creation: SolutionCreation,
    ) -> Result<i32, Error> {
        validate_source(&creation.source)?;

        let id = self.repo.create_solution(&creation).await?;

        let problem = self.problems.get_problem(creation.problem_id).await?;
        if problem.manifest.is_empty() {
            self.repo
                .update_solution(
                    id,
                    &SolutionUpdate {
                        state: State::Accepted,
                        score: 100,
                        time_stat: 0,
                        memory_stat: 0,
                    },
                )
                .await?;
            return Ok(id);
        }

        let archive_path = self.problems.download_tests(problem.id).await?;
        let packet = Packet {
            contest_id: creation.contest_id,
            problem_id: problem.id,
            updated_at: problem.updated_at,
            archive_path,
            time_limit_ms: problem.time_limit_ms,
            memory_limit_mib: problem.memory_limit_mib,
            manifest: problem.manifest,
        };
        let submission = Submission {
            solution_id: id,
            source: creation.source.into_bytes(),
            language: creation.language,
        };
        let solution = self.repo.get_solution(id).await?;

        let supervisor = self.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            supervisor.run_testing(cancel, packet, submission, solution).await;
        });

        Ok(id)
    }

    /// Drive one solution's test run to its terminal state.
    #[instrument(skip_all, fields(solution_id = solution.id))]
    pub async fn run_testing(
        &self,
        cancel: CancellationToken,
        packet: Packet,
        submission: Submission,
        solution: Solution,
    ) {
        let mut stream = self.orchestrator.test(cancel, packet.clone(), submission);

        let mut item = SolutionsListItem::from(&solution);
        self.publish(packet.contest_id, MESSAGE_TYPE_CREATE, None, item.clone())
            .await;

        let mut update = SolutionUpdate {
            state: State::Saved,
            score: 0,
            time_stat: 0,
            memory_stat: 0,
        };
        let mut passed = 0usize;
        let expected = packet.manifest.count;

        while let Some(message) = stream.recv().await {
            if let Some(detail) = &message.detail {
                self.publish(
                    packet.contest_id,
                    MESSAGE_TYPE_UPDATE,
                    Some(detail.clone()),
                    item.clone(),
                )
                .await;
            }

            if let Some(failure) = message.error {
                match failure {
                    TestError::Verdict(verdict) => {
                        update.state = verdict.state();
                    }
                    TestError::Internal(e) => {
                        error!(error = %e, "testing aborted by internal failure");
                    }
                }
                break;
            }

            if let Some(metrics) = message.metrics {
                passed += 1;
                // Max-reduction over completed tests; order independent.
                update.memory_stat = update.memory_stat.max(metrics.max_rss_kib as i32);
                update.time_stat = update.time_stat.max(metrics.elapsed_ms() as i32);
            }
        }

        if passed != expected && update.state == State::Saved {
            // Lost verdict: the stream ended without a decision. Leave the
            // row in Saved rather than fabricate a state.
            error!(passed, expected, "testing ended without a verdict");
            return;
        }

        if passed == expected {
            update.state = State::Accepted;
            update.score = 100;
        }

        if let Err(e) = self.repo.update_solution(solution.id, &update).await {
            error!(error = %e, "failed to persist verdict");
            return;
        }

        item.state = update.state;
        item.score = update.score;
        item.time_stat = update.time_stat;
        item.memory_stat = update.memory_stat;
        self.publish(packet.contest_id, MESSAGE_TYPE_UPDATE, None, item)
            .await;
    }

    /// Publish a solution event; delivery problems are logged, not fatal.
    async fn publish(
        &self,
        contest_id: i32,
        message_type: &str,
        message: Option<String>,
        solution: SolutionsListItem,
    ) {
        let event = SolutionEvent {
            message_type: message_type.to_owned(),
            message,
            solution,
        };
        let payload = match serde_json::to_vec(&event) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "failed to encode solution event");
                return;
            }
        };
        let subject = solution_events_subject(contest_id);
        if let Err(e) = self.publisher.publish(&subject, &payload).await {
            warn!(error = %e, subject, "failed to publish solution event");
        }
    }
}

fn validate_source(source: &str) -> Result<(), Error> {
    if source.is_empty() {
        return Err(Error::bad_input("empty solution"));
    }
    if source.len() > MAX_SOURCE_BYTES {
        return Err(Error::bad_input(format!(
            "solution exceeds {MAX_SOURCE_BYTES} bytes"
        )));
    }
    Ok(())
}
