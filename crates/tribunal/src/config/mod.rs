use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

pub use crate::config::language::{
    DEFAULT_COMPILE_MEMORY_LIMIT_BYTES, DEFAULT_COMPILE_TIME_LIMIT_MS, LanguageConfig,
};
use crate::model::Language;

pub mod language;
mod loader;

/// Example configuration embedded at compile time.
///
/// Library users can access this to generate a starter config file.
pub const EXAMPLE_CONFIG: &str = include_str!("../../tribunal.example.toml");

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] config::ConfigError),

    #[error("language '{0}' is not configured")]
    LanguageNotFound(&'static str),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Judge configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Root of the test archive cache.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Number of concurrent sandbox slots. Kept low on purpose: each slot may
    /// pin one CPU and 256 MiB in the container runtime.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Wall-clock headroom added on top of each problem's time limit before
    /// the executor kills a run (milliseconds).
    #[serde(default = "default_wall_timeout_margin_ms")]
    pub wall_timeout_margin_ms: u64,

    /// Docker daemon address override; local defaults when unset.
    #[serde(default)]
    pub docker_host: Option<String>,

    /// Language configurations keyed by `cpp` / `go` / `python`.
    #[serde(default)]
    pub languages: HashMap<String, LanguageConfig>,
}

impl Config {
    /// Create a config with the embedded default languages.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create an empty config with no languages.
    pub fn empty() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            workers: default_workers(),
            wall_timeout_margin_ms: default_wall_timeout_margin_ms(),
            docker_host: None,
            languages: HashMap::new(),
        }
    }

    /// Look up the sandbox configuration for a submission language.
    pub fn language(&self, language: Language) -> Result<&LanguageConfig, ConfigError> {
        self.languages
            .get(language.key())
            .ok_or(ConfigError::LanguageNotFound(language.key()))
    }

    /// Hard wall-clock ceiling for one execution of a problem with the given
    /// time limit.
    pub fn wall_timeout(&self, time_limit_ms: i64) -> Duration {
        Duration::from_millis(time_limit_ms.max(0) as u64 + self.wall_timeout_margin_ms)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::parse_toml(EXAMPLE_CONFIG).expect("embedded default config should be valid")
    }
}

fn default_cache_dir() -> PathBuf {
    PathBuf::from("/tmp/tribunal-cache")
}

fn default_workers() -> usize {
    crate::pool::DEFAULT_WORKERS
}

fn default_wall_timeout_margin_ms() -> u64 {
    10_000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_all_languages() {
        let config = Config::default();
        for lang in [Language::Cpp, Language::Go, Language::Python] {
            let cfg = config.language(lang).unwrap();
            assert!(!cfg.image.is_empty());
            assert!(!cfg.run_command.is_empty());
        }
    }

    #[test]
    fn default_language_limits_follow_the_judge_images() {
        let config = Config::default();
        assert_eq!(
            config.language(Language::Cpp).unwrap().compile_time_limit_ms,
            20_000
        );
        assert_eq!(
            config.language(Language::Go).unwrap().compile_time_limit_ms,
            60_000
        );
        assert!(config.language(Language::Python).unwrap().needs_compile());
    }

    #[test]
    fn empty_config_knows_no_languages() {
        let config = Config::empty();
        assert!(matches!(
            config.language(Language::Cpp),
            Err(ConfigError::LanguageNotFound("cpp"))
        ));
    }

    #[test]
    fn wall_timeout_adds_margin_to_time_limit() {
        let config = Config::empty();
        assert_eq!(config.wall_timeout(1000), Duration::from_millis(11_000));
        assert_eq!(config.wall_timeout(0), Duration::from_millis(10_000));
    }

    #[test]
    fn defaults_are_sane() {
        let config = Config::empty();
        assert_eq!(config.workers, 2);
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/tribunal-cache"));
        assert!(config.docker_host.is_none());
    }
}
