//! Configuration file loading.
//!
//! Handles loading and parsing configuration files using the config crate.

use std::path::Path;

use config::{Config as ConfigBuilder, File, FileFormat};

use crate::config::{Config, ConfigError};
use crate::model::Language;

impl Config {
    /// Load configuration from a file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from(path.as_ref()))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string.
    pub fn parse_toml(content: &str) -> Result<Self, ConfigError> {
        let config = ConfigBuilder::builder()
            .add_source(File::from_str(content, FileFormat::Toml))
            .build()?;

        let config: Config = config.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }

        for (key, lang) in &self.languages {
            if Language::from_key(key).is_none() {
                return Err(ConfigError::Invalid(format!(
                    "unknown language key '{key}'"
                )));
            }
            if lang.name.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{key}' has empty name"
                )));
            }
            if lang.image.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{key}' has empty image"
                )));
            }
            if lang.run_command.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "language '{key}' has empty run command"
                )));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config() {
        let toml = r#"
[languages.cpp]
name = "C++"
image = "custom-gcc:13"
run_command = ["bash", "-c", "/code/solution"]
"#;
        let config = Config::parse_toml(toml).unwrap();
        let lang = config.language(Language::Cpp).unwrap();
        assert_eq!(lang.name, "C++");
        assert!(!lang.needs_compile());
    }

    #[test]
    fn parses_full_config() {
        let toml = r#"
cache_dir = "/var/lib/judge/cache"
workers = 4
wall_timeout_margin_ms = 5000
docker_host = "unix:///run/user/1000/docker.sock"

[languages.go]
name = "Go"
image = "custom-golang:1.22"
compile_command = ["bash", "-c", "go build -o /code/solution /code/source"]
run_command = ["bash", "-c", "/code/solution"]
compile_time_limit_ms = 60000
"#;
        let config = Config::parse_toml(toml).unwrap();
        assert_eq!(config.cache_dir, std::path::PathBuf::from("/var/lib/judge/cache"));
        assert_eq!(config.workers, 4);
        assert_eq!(config.wall_timeout_margin_ms, 5000);
        assert!(config.docker_host.is_some());
        let lang = config.language(Language::Go).unwrap();
        assert_eq!(lang.compile_time_limit_ms, 60_000);
    }

    #[test]
    fn rejects_unknown_language_key() {
        let toml = r#"
[languages.rust]
name = "Rust"
image = "custom-rust:1.79"
run_command = ["./solution"]
"#;
        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn rejects_empty_image() {
        let toml = r#"
[languages.cpp]
name = "C++"
image = ""
run_command = ["./solution"]
"#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn rejects_empty_run_command() {
        let toml = r#"
[languages.cpp]
name = "C++"
image = "custom-gcc:13"
run_command = []
"#;
        assert!(Config::parse_toml(toml).is_err());
    }

    #[test]
    fn rejects_zero_workers() {
        let toml = "workers = 0\n";
        assert!(matches!(
            Config::parse_toml(toml),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn embedded_example_parses() {
        let config = Config::parse_toml(crate::config::EXAMPLE_CONFIG).unwrap();
        assert_eq!(config.languages.len(), 3);
    }
}
