//! Integration tests for tribunal.
//!
//! These tests require a reachable Docker daemon and the judge images named
//! in tribunal.example.toml. Run with:
//!    cargo test -p tribunal --features integration-tests -- --include-ignored

#![cfg(feature = "integration-tests")]

use std::sync::Arc;

use tribunal::{Config, DockerExecutor};

mod compilation;
mod execution;

pub(crate) const CPP_ECHO: &str = r#"
#include <iostream>
int main() {
    std::string line;
    while (std::getline(std::cin, line)) std::cout << line << "\n";
}
"#;

pub(crate) const CPP_BROKEN: &str = "int main( { return 0 }";

pub(crate) fn test_config() -> Arc<Config> {
    Arc::new(Config::default())
}

pub(crate) fn executor(config: &Config) -> DockerExecutor {
    DockerExecutor::connect(config.docker_host.as_deref()).expect("docker daemon reachable")
}
