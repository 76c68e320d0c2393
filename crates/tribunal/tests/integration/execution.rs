use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tribunal::metrics::Metrics;
use tribunal::sandbox::{ExecuteFailure, SandboxExecutor};
use tribunal::{Language, Verdict};

use super::{CPP_ECHO, executor, test_config};

async fn compiled_echo(
    config: &tribunal::Config,
    executor: &tribunal::DockerExecutor,
) -> tempfile::TempDir {
    let language = config.language(Language::Cpp).unwrap();
    let work_dir = tempfile::Builder::new().prefix("tester.").tempdir().unwrap();
    std::fs::write(work_dir.path().join("source"), CPP_ECHO).unwrap();
    executor
        .compile(&CancellationToken::new(), language, work_dir.path())
        .await
        .expect("compilation should succeed");
    work_dir
}

#[tokio::test]
#[ignore = "requires docker and judge images"]
async fn execute_captures_output_and_metrics() {
    let config = test_config();
    let executor = executor(&config);
    let language = config.language(Language::Cpp).unwrap();

    let build = compiled_echo(&config, &executor).await;

    let test_dir = tempfile::Builder::new().prefix("test.").tempdir().unwrap();
    std::fs::copy(
        build.path().join("solution"),
        test_dir.path().join("solution"),
    )
    .unwrap();
    let input: &[u8] = b"hello\n";

    executor
        .execute(
            &CancellationToken::new(),
            language,
            test_dir.path(),
            Box::new(input),
            Duration::from_secs(15),
        )
        .await
        .expect("execution should succeed");

    let output = std::fs::read_to_string(test_dir.path().join("output.txt")).unwrap();
    assert_eq!(output, "hello\n");

    let metrics = Metrics::load(test_dir.path().join("time.txt")).await.unwrap();
    assert_eq!(metrics.exit_status, 0);
    assert!(metrics.max_rss_kib > 0);
}

#[tokio::test]
#[ignore = "requires docker and judge images"]
async fn non_zero_exit_is_runtime_error() {
    let config = test_config();
    let executor = executor(&config);
    let language = config.language(Language::Cpp).unwrap();

    let work_dir = tempfile::Builder::new().prefix("tester.").tempdir().unwrap();
    std::fs::write(
        work_dir.path().join("source"),
        "int main() { return 3; }",
    )
    .unwrap();
    executor
        .compile(&CancellationToken::new(), language, work_dir.path())
        .await
        .expect("compilation should succeed");

    let input: &[u8] = b"";
    let failure = executor
        .execute(
            &CancellationToken::new(),
            language,
            work_dir.path(),
            Box::new(input),
            Duration::from_secs(15),
        )
        .await
        .expect_err("execution should fail");

    assert!(matches!(
        failure,
        ExecuteFailure::Verdict(Verdict::RuntimeError { .. })
    ));
}

#[tokio::test]
#[ignore = "requires docker and judge images"]
async fn wall_timeout_kills_the_run() {
    let config = test_config();
    let executor = executor(&config);
    let language = config.language(Language::Cpp).unwrap();

    let work_dir = tempfile::Builder::new().prefix("tester.").tempdir().unwrap();
    std::fs::write(
        work_dir.path().join("source"),
        "int main() { for (;;) {} }",
    )
    .unwrap();
    executor
        .compile(&CancellationToken::new(), language, work_dir.path())
        .await
        .expect("compilation should succeed");

    let input: &[u8] = b"";
    let failure = executor
        .execute(
            &CancellationToken::new(),
            language,
            work_dir.path(),
            Box::new(input),
            Duration::from_secs(2),
        )
        .await
        .expect_err("execution should time out");

    assert!(matches!(failure, ExecuteFailure::Internal(_)));
}
