use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default compile-time limit in milliseconds.
pub const DEFAULT_COMPILE_TIME_LIMIT_MS: u64 = 20_000;

/// Default compile-time memory limit in bytes (256 MiB).
pub const DEFAULT_COMPILE_MEMORY_LIMIT_BYTES: i64 = 256 * 1024 * 1024;

/// Sandbox configuration for one programming language.
///
/// The compile and run commands operate on `/code/source` inside the
/// container; a compile command must leave the runnable artifact at
/// `/code/solution`. The run command is expected to wrap the program in
/// `/usr/bin/time -v` so the executor can capture the metrics stream on
/// stderr.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LanguageConfig {
    /// Human-readable name (e.g., "C++ (GCC)").
    pub name: String,

    /// Container image the compile and execute jobs run in.
    pub image: String,

    /// Compile command; empty for languages that run from source.
    #[serde(default)]
    pub compile_command: Vec<String>,

    /// Execute command.
    pub run_command: Vec<String>,

    #[serde(default = "default_compile_time_limit_ms")]
    pub compile_time_limit_ms: u64,

    #[serde(default = "default_compile_memory_limit_bytes")]
    pub compile_memory_limit_bytes: i64,
}

impl LanguageConfig {
    /// Whether this language has a compile step.
    pub fn needs_compile(&self) -> bool {
        !self.compile_command.is_empty()
    }

    pub fn compile_time_limit(&self) -> Duration {
        Duration::from_millis(self.compile_time_limit_ms)
    }
}

fn default_compile_time_limit_ms() -> u64 {
    DEFAULT_COMPILE_TIME_LIMIT_MS
}

fn default_compile_memory_limit_bytes() -> i64 {
    DEFAULT_COMPILE_MEMORY_LIMIT_BYTES
}
