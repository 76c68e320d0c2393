//! Solution testing pipeline for a programming-contest judging backend.
//!
//! Given a submitted solution and a problem packet, Tribunal unpacks the
//! problem's test archive into a content-addressed cache, compiles the source
//! in a locked-down Docker container, schedules per-test executions through a
//! bounded worker pool, parses `time -v` metrics from each run, compares
//! outputs with a token-level float-aware checker, and streams progressive
//! verdict messages to a supervisor that persists the final state and
//! publishes progress events.
//!
//! # Components
//!
//! - [`sandbox`] — container-isolated compile/execute jobs with resource
//!   limits and guaranteed cleanup.
//! - [`metrics`] — parser for the `time -v` metrics stream.
//! - [`checker`] — float-aware token comparison of outputs.
//! - [`cache`] — shared cache of unpacked test archives with atomic
//!   publication.
//! - [`pool`] — bounded worker pool with back-pressure and panic containment.
//! - [`orchestrator`] — the per-submission pipeline emitting a finite message
//!   stream.
//! - [`supervisor`] — stream consumption, verdict aggregation, persistence,
//!   and event publishing.

pub use crate::cache::TestCache;
pub use crate::config::{Config, EXAMPLE_CONFIG, LanguageConfig};
pub use crate::error::Error;
pub use crate::model::{
    Language, Manifest, Packet, Solution, SolutionCreation, SolutionUpdate, State, Submission,
    TestError, TestingMessage, Verdict,
};
pub use crate::orchestrator::Orchestrator;
pub use crate::pool::WorkerPool;
pub use crate::publish::{NullPublisher, Publisher, RedisPublisher};
pub use crate::repo::{MemoryRepo, SolutionRepo};
pub use crate::sandbox::{DockerExecutor, ExecuteFailure, SandboxExecutor};
pub use crate::supervisor::{ProblemInfo, Problems, Supervisor};

pub mod archive;
pub mod cache;
pub mod checker;
pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod orchestrator;
pub mod pool;
pub mod publish;
pub mod repo;
pub mod sandbox;
pub mod supervisor;
