use tokio_util::sync::CancellationToken;
use tribunal::sandbox::{ExecuteFailure, SandboxExecutor};
use tribunal::{Language, Verdict};

use super::{CPP_BROKEN, CPP_ECHO, executor, test_config};

#[tokio::test]
#[ignore = "requires docker and judge images"]
async fn compile_cpp_produces_artifact() {
    let config = test_config();
    let executor = executor(&config);
    let language = config.language(Language::Cpp).unwrap();

    let work_dir = tempfile::Builder::new().prefix("tester.").tempdir().unwrap();
    std::fs::write(work_dir.path().join("source"), CPP_ECHO).unwrap();

    executor
        .compile(&CancellationToken::new(), language, work_dir.path())
        .await
        .expect("compilation should succeed");

    assert!(work_dir.path().join("solution").exists());
}

#[tokio::test]
#[ignore = "requires docker and judge images"]
async fn compile_error_carries_compiler_output() {
    let config = test_config();
    let executor = executor(&config);
    let language = config.language(Language::Cpp).unwrap();

    let work_dir = tempfile::Builder::new().prefix("tester.").tempdir().unwrap();
    std::fs::write(work_dir.path().join("source"), CPP_BROKEN).unwrap();

    let failure = executor
        .compile(&CancellationToken::new(), language, work_dir.path())
        .await
        .expect_err("compilation should fail");

    match failure {
        ExecuteFailure::Verdict(Verdict::CompilationError { message }) => {
            assert!(!message.is_empty(), "compiler diagnostics expected");
        }
        other => panic!("expected a compilation error, got {other:?}"),
    }
}
