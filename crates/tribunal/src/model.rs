//! Domain model: solutions, verdicts, packets, and the wire types published
//! to scoreboard subscribers.
//!
//! The integer state and language codes are wire-stable; clients and the
//! database share them, so they must never be renumbered.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::metrics::Metrics;

/// Maximum accepted solution source size in bytes (10 MiB, inclusive).
pub const MAX_SOURCE_BYTES: usize = 10 * 1024 * 1024;

/// Terminal and intermediate solution states, by wire-stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum State {
    Saved,
    CompilationError,
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError,
    PresentationError,
    WrongAnswer,
    Accepted,
}

impl State {
    pub fn code(self) -> i32 {
        match self {
            State::Saved => 1,
            State::CompilationError => 101,
            State::TimeLimitExceeded => 102,
            State::MemoryLimitExceeded => 103,
            State::RuntimeError => 104,
            State::PresentationError => 105,
            State::WrongAnswer => 106,
            State::Accepted => 200,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, Error> {
        match code {
            1 => Ok(State::Saved),
            101 => Ok(State::CompilationError),
            102 => Ok(State::TimeLimitExceeded),
            103 => Ok(State::MemoryLimitExceeded),
            104 => Ok(State::RuntimeError),
            105 => Ok(State::PresentationError),
            106 => Ok(State::WrongAnswer),
            200 => Ok(State::Accepted),
            other => Err(Error::bad_input(format!("unknown state code {other}"))),
        }
    }

    /// A state is terminal once testing assigned it; `Saved` is the only
    /// non-terminal state.
    pub fn is_terminal(self) -> bool {
        self != State::Saved
    }
}

impl From<State> for i32 {
    fn from(state: State) -> i32 {
        state.code()
    }
}

impl TryFrom<i32> for State {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Error> {
        State::from_code(code)
    }
}

/// Supported submission languages, by wire-stable code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "i32", try_from = "i32")]
pub enum Language {
    Go,
    Cpp,
    Python,
}

impl Language {
    pub fn code(self) -> i32 {
        match self {
            Language::Go => 10,
            Language::Cpp => 20,
            Language::Python => 30,
        }
    }

    pub fn from_code(code: i32) -> Result<Self, Error> {
        match code {
            10 => Ok(Language::Go),
            20 => Ok(Language::Cpp),
            30 => Ok(Language::Python),
            other => Err(Error::bad_input(format!("unknown language code {other}"))),
        }
    }

    /// Key of this language in the configuration's language table.
    pub fn key(self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::Cpp => "cpp",
            Language::Python => "python",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        match key {
            "go" => Some(Language::Go),
            "cpp" => Some(Language::Cpp),
            "python" => Some(Language::Python),
            _ => None,
        }
    }
}

impl From<Language> for i32 {
    fn from(language: Language) -> i32 {
        language.code()
    }
}

impl TryFrom<i32> for Language {
    type Error = Error;

    fn try_from(code: i32) -> Result<Self, Error> {
        Language::from_code(code)
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.key())
    }
}

/// The six terminal failure kinds a test run can assign to a solution.
///
/// A closed sum carried on the message stream; each variant maps 1:1 onto a
/// persisted [`State`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    CompilationError { message: String },
    TimeLimitExceeded,
    MemoryLimitExceeded,
    RuntimeError { message: String },
    PresentationError { message: String },
    WrongAnswer { message: String },
}

impl Verdict {
    pub fn state(&self) -> State {
        match self {
            Verdict::CompilationError { .. } => State::CompilationError,
            Verdict::TimeLimitExceeded => State::TimeLimitExceeded,
            Verdict::MemoryLimitExceeded => State::MemoryLimitExceeded,
            Verdict::RuntimeError { .. } => State::RuntimeError,
            Verdict::PresentationError { .. } => State::PresentationError,
            Verdict::WrongAnswer { .. } => State::WrongAnswer,
        }
    }
}

impl std::fmt::Display for Verdict {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Verdict::CompilationError { message } => write!(f, "compilation error: {message}"),
            Verdict::TimeLimitExceeded => write!(f, "time limit exceeded"),
            Verdict::MemoryLimitExceeded => write!(f, "memory limit exceeded"),
            Verdict::RuntimeError { message } => write!(f, "runtime error: {message}"),
            Verdict::PresentationError { message } => write!(f, "presentation error: {message}"),
            Verdict::WrongAnswer { message } => write!(f, "wrong answer: {message}"),
        }
    }
}

/// Failure carried by a testing message: either a typed verdict or an
/// infrastructure error that voids the run.
#[derive(Debug)]
pub enum TestError {
    Verdict(Verdict),
    Internal(Error),
}

impl TestError {
    pub fn verdict(&self) -> Option<&Verdict> {
        match self {
            TestError::Verdict(v) => Some(v),
            TestError::Internal(_) => None,
        }
    }
}

impl From<Verdict> for TestError {
    fn from(v: Verdict) -> Self {
        TestError::Verdict(v)
    }
}

impl From<Error> for TestError {
    fn from(e: Error) -> Self {
        TestError::Internal(e)
    }
}

/// One element of the orchestrator's progress stream.
///
/// The stream is finite and single-producer; a message carrying an error is
/// always the last one observed by the supervisor.
#[derive(Debug, Default)]
pub struct TestingMessage {
    /// Human-readable progress line ("Compiling", "Testing 03", …).
    pub detail: Option<String>,
    /// Run metrics, present for every completed execution (including ones
    /// that then failed a limit or the checker).
    pub metrics: Option<Metrics>,
    pub error: Option<TestError>,
}

impl TestingMessage {
    pub fn detail(text: impl Into<String>) -> Self {
        TestingMessage {
            detail: Some(text.into()),
            ..Default::default()
        }
    }

    pub fn passed(test_name: &str, metrics: Metrics) -> Self {
        TestingMessage {
            detail: Some(format!("{test_name} passed")),
            metrics: Some(metrics),
            error: None,
        }
    }

    pub fn failed(error: impl Into<TestError>, metrics: Option<Metrics>) -> Self {
        TestingMessage {
            detail: None,
            metrics,
            error: Some(error.into()),
        }
    }
}

/// Ordered list of test names attached to a problem at archive upload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub names: Vec<String>,
    pub count: usize,
}

impl Manifest {
    pub fn new(names: Vec<String>) -> Self {
        let count = names.len();
        Manifest { names, count }
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Immutable per-submission bundle of problem metadata plus a handle to the
/// locally fetched test archive.
#[derive(Debug, Clone)]
pub struct Packet {
    pub contest_id: i32,
    pub problem_id: i32,
    /// Unix timestamp of the problem's last update; part of the cache key so
    /// a re-uploaded archive invalidates previously unpacked tests.
    pub updated_at: i64,
    /// Local path of the problem's zip, produced by the object-storage fetch.
    pub archive_path: std::path::PathBuf,
    /// Per-problem time limit in milliseconds.
    pub time_limit_ms: i64,
    /// Per-problem memory limit in MiB.
    pub memory_limit_mib: i64,
    pub manifest: Manifest,
}

impl Packet {
    /// Cache key for the unpacked tests of this problem revision.
    pub fn cache_key(&self) -> String {
        format!("{}_{}", self.problem_id, self.updated_at)
    }
}

/// Source bytes plus language, bound to a stored solution row.
#[derive(Debug, Clone)]
pub struct Submission {
    pub solution_id: i32,
    pub source: Vec<u8>,
    pub language: Language,
}

/// A stored solution row.
#[derive(Debug, Clone)]
pub struct Solution {
    pub id: i32,

    pub user_id: i32,
    pub username: String,

    pub source: String,

    pub state: State,
    pub score: i32,
    pub penalty: i32,
    pub time_stat: i32,
    pub memory_stat: i32,
    pub language: Language,

    pub problem_id: i32,
    pub problem_title: String,
    pub position: i32,

    pub contest_id: i32,
    pub contest_title: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Fields of a new solution; the repository assigns the id and timestamps.
#[derive(Debug, Clone)]
pub struct SolutionCreation {
    pub source: String,
    pub user_id: i32,
    pub username: String,
    pub contest_id: i32,
    pub contest_title: String,
    pub problem_id: i32,
    pub problem_title: String,
    pub position: i32,
    pub language: Language,
    pub penalty: i32,
}

/// The single terminal write the supervisor performs per test run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolutionUpdate {
    pub state: State,
    pub score: i32,
    pub time_stat: i32,
    pub memory_stat: i32,
}

/// Listing filter; all criteria are conjunctive.
#[derive(Debug, Clone, Default)]
pub struct SolutionsFilter {
    pub page: i32,
    pub page_size: i32,
    pub contest_id: Option<i32>,
    pub user_id: Option<i32>,
    pub problem_id: Option<i32>,
    pub language: Option<Language>,
    pub state: Option<State>,
    /// Non-negative for ascending id order, negative for descending.
    pub order: Option<i32>,
}

impl SolutionsFilter {
    pub fn offset(&self) -> i32 {
        (self.page - 1) * self.page_size
    }
}

#[derive(Debug, Clone, Default)]
pub struct SolutionsList {
    pub solutions: Vec<SolutionsListItem>,
    pub total: usize,
}

/// Wire representation of a solution on the event bus and in listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionsListItem {
    pub id: i32,

    pub user_id: i32,
    pub username: String,

    pub state: State,
    pub score: i32,
    pub penalty: i32,
    pub time_stat: i32,
    pub memory_stat: i32,
    pub language: Language,

    pub problem_id: i32,
    pub problem_title: String,

    pub position: i32,

    pub contest_id: i32,
    pub contest_title: String,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<&Solution> for SolutionsListItem {
    fn from(s: &Solution) -> Self {
        SolutionsListItem {
            id: s.id,
            user_id: s.user_id,
            username: s.username.clone(),
            state: s.state,
            score: s.score,
            penalty: s.penalty,
            time_stat: s.time_stat,
            memory_stat: s.memory_stat,
            language: s.language,
            problem_id: s.problem_id,
            problem_title: s.problem_title.clone(),
            position: s.position,
            contest_id: s.contest_id,
            contest_title: s.contest_title.clone(),
            created_at: s.created_at,
            updated_at: s.updated_at,
        }
    }
}

pub const MESSAGE_TYPE_CREATE: &str = "CREATE";
pub const MESSAGE_TYPE_UPDATE: &str = "UPDATE";
pub const MESSAGE_TYPE_DELETE: &str = "DELETE";

/// Envelope published on `contest-{contest_id}-solutions`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SolutionEvent {
    pub message_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub solution: SolutionsListItem,
}

/// Subject carrying solution events for one contest.
pub fn solution_events_subject(contest_id: i32) -> String {
    format!("contest-{contest_id}-solutions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_codes_are_wire_stable() {
        assert_eq!(State::Saved.code(), 1);
        assert_eq!(State::CompilationError.code(), 101);
        assert_eq!(State::TimeLimitExceeded.code(), 102);
        assert_eq!(State::MemoryLimitExceeded.code(), 103);
        assert_eq!(State::RuntimeError.code(), 104);
        assert_eq!(State::PresentationError.code(), 105);
        assert_eq!(State::WrongAnswer.code(), 106);
        assert_eq!(State::Accepted.code(), 200);
    }

    #[test]
    fn state_round_trips_through_codes() {
        for code in [1, 101, 102, 103, 104, 105, 106, 200] {
            let state = State::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert!(State::from_code(0).is_err());
        assert!(State::from_code(107).is_err());
    }

    #[test]
    fn language_codes_are_wire_stable() {
        assert_eq!(Language::Go.code(), 10);
        assert_eq!(Language::Cpp.code(), 20);
        assert_eq!(Language::Python.code(), 30);
        assert!(Language::from_code(40).is_err());
    }

    #[test]
    fn language_keys_round_trip() {
        for lang in [Language::Go, Language::Cpp, Language::Python] {
            assert_eq!(Language::from_key(lang.key()), Some(lang));
        }
        assert_eq!(Language::from_key("rust"), None);
    }

    #[test]
    fn verdict_maps_onto_states() {
        assert_eq!(
            Verdict::CompilationError {
                message: "x".into()
            }
            .state(),
            State::CompilationError
        );
        assert_eq!(Verdict::TimeLimitExceeded.state(), State::TimeLimitExceeded);
        assert_eq!(
            Verdict::MemoryLimitExceeded.state(),
            State::MemoryLimitExceeded
        );
        assert_eq!(
            Verdict::RuntimeError { message: "x".into() }.state(),
            State::RuntimeError
        );
        assert_eq!(
            Verdict::PresentationError { message: "x".into() }.state(),
            State::PresentationError
        );
        assert_eq!(
            Verdict::WrongAnswer { message: "x".into() }.state(),
            State::WrongAnswer
        );
    }

    #[test]
    fn packet_cache_key_includes_revision() {
        let packet = Packet {
            contest_id: 1,
            problem_id: 42,
            updated_at: 1700000000,
            archive_path: "/tmp/tests.zip".into(),
            time_limit_ms: 1000,
            memory_limit_mib: 64,
            manifest: Manifest::new(vec!["01".into()]),
        };
        assert_eq!(packet.cache_key(), "42_1700000000");
    }

    #[test]
    fn filter_offset() {
        let filter = SolutionsFilter {
            page: 3,
            page_size: 20,
            ..Default::default()
        };
        assert_eq!(filter.offset(), 40);
    }

    #[test]
    fn event_serializes_with_integer_codes() {
        let item = SolutionsListItem {
            id: 7,
            user_id: 1,
            username: "alice".into(),
            state: State::Accepted,
            score: 100,
            penalty: 0,
            time_stat: 42,
            memory_stat: 1024,
            language: Language::Cpp,
            problem_id: 3,
            problem_title: "A + B".into(),
            position: 1,
            contest_id: 9,
            contest_title: "Qualifier".into(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let event = SolutionEvent {
            message_type: MESSAGE_TYPE_UPDATE.into(),
            message: Some("Testing".into()),
            solution: item,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["message_type"], "UPDATE");
        assert_eq!(json["message"], "Testing");
        assert_eq!(json["solution"]["state"], 200);
        assert_eq!(json["solution"]["language"], 20);
    }

    #[test]
    fn event_omits_absent_message() {
        let item = SolutionsListItem {
            id: 1,
            user_id: 1,
            username: String::new(),
            state: State::Saved,
            score: 0,
            penalty: 0,
            time_stat: 0,
            memory_stat: 0,
            language: Language::Go,
            problem_id: 1,
            problem_title: String::new(),
            position: 0,
            contest_id: 1,
            contest_title: String::new(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let event = SolutionEvent {
            message_type: MESSAGE_TYPE_CREATE.into(),
            message: None,
            solution: item,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("\"message\":"));
    }

    #[test]
    fn subject_embeds_contest_id() {
        assert_eq!(solution_events_subject(17), "contest-17-solutions");
    }
}
