//! Integration tests for the execution sandbox
//!
//! These tests start a real `python3` process. They return early when no
//! interpreter is installed.

use std::time::Duration;

use abacus_engine::config::SandboxConfig;
use abacus_engine::sandbox::{Sandbox, MAX_OUTPUT_CHARS, TRUNCATION_MARKER};
use sdk::types::ExecutionStatus;

async fn sandbox() -> Option<Sandbox> {
    let sandbox = Sandbox::new(&SandboxConfig::default());
    if sandbox.python_available().await {
        Some(sandbox)
    } else {
        eprintln!("python3 not available; skipping sandbox test");
        None
    }
}

#[tokio::test]
async fn test_print_arithmetic() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("print(1+1)").await;
    assert_eq!(result.status, ExecutionStatus::Success, "{:?}", result);
    assert!(result.stdout.contains('2'));
    assert!(result.error.is_none());
}

#[tokio::test]
async fn test_division_by_zero_keeps_partial_stdout() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("print('before')\nx = 1 / 0").await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(result.stdout.contains("before"));
    assert!(result.error.as_deref().unwrap_or_default().starts_with("ZeroDivisionError"));

    let trace = result.trace.unwrap_or_default();
    assert!(trace.contains("Traceback"));
    assert!(trace.contains("ZeroDivisionError"));
}

#[tokio::test]
async fn test_variables_are_reported() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("x = 6 * 7\n_hidden = 1\nprint(x)").await;
    assert!(result.is_success(), "{:?}", result);
    assert_eq!(result.variables.get("x").map(String::as_str), Some("42"));
    assert!(!result.variables.contains_key("_hidden"));
    // Preamble bindings are not reported
    assert!(!result.variables.contains_key("math"));
}

#[tokio::test]
async fn test_preamble_is_available() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("print(math.sqrt(16))\nprint(statistics.mean([1, 2, 3]))").await;
    assert!(result.is_success(), "{:?}", result);
    assert!(result.stdout.contains("4.0"));
    assert!(result.stdout.contains('2'));
}

#[tokio::test]
async fn test_runtime_import_guard() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("import socket").await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(result.error.unwrap_or_default().contains("socket"));
}

#[tokio::test]
async fn test_wall_clock_timeout() {
    let Some(sandbox) = sandbox().await else { return };

    let sandbox = sandbox.with_timeout(Duration::from_secs(1));
    let result = sandbox.run("while True:\n    pass").await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(result.error.unwrap_or_default().contains("timed out"));
    assert!(result.duration_ms >= 1000);
}

#[tokio::test]
async fn test_large_output_is_truncated() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("print('x' * 50000)").await;
    assert!(result.is_success(), "{:?}", result);
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
}

#[tokio::test]
async fn test_flood_of_output_is_bounded() {
    let Some(sandbox) = sandbox().await else { return };

    // About 600 MB of text, far above the memory ceiling if it were buffered
    let sandbox = sandbox.with_timeout(Duration::from_secs(30));
    let result = sandbox
        .run("for i in range(6000000):\n    print('x' * 100)")
        .await;
    assert!(result.is_success(), "{:?}", result.error);
    assert!(result.stdout.ends_with(TRUNCATION_MARKER));
    assert_eq!(
        result.stdout.chars().count(),
        MAX_OUTPUT_CHARS + TRUNCATION_MARKER.chars().count()
    );
}

#[tokio::test]
async fn test_timeout_keeps_partial_stdout() {
    let Some(sandbox) = sandbox().await else { return };

    let sandbox = sandbox.with_timeout(Duration::from_secs(1));
    let result = sandbox.run("print('started')\nwhile True:\n    pass").await;
    assert_eq!(result.status, ExecutionStatus::Error);
    assert!(result.error.unwrap_or_default().contains("timed out"));
    assert!(result.stdout.contains("started"));
}

#[tokio::test]
async fn test_interpreter_syntax_error_is_reported() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("```python print(2+2)```").await;
    assert_eq!(result.status, ExecutionStatus::Error);
    let error = result.error.unwrap_or_default();
    assert!(error.starts_with("Syntax error"), "{}", error);
    assert!(error.contains("line 1"));
    assert!(result.stdout.is_empty());
}

#[tokio::test]
async fn test_control_characters_are_stripped() {
    let Some(sandbox) = sandbox().await else { return };

    let result = sandbox.run("print('a\\x1b[31mb\\x07c')").await;
    assert!(result.is_success(), "{:?}", result);
    assert!(!result.stdout.contains('\u{1b}'));
    assert!(!result.stdout.contains('\u{7}'));
    assert!(result.stdout.contains("a[31mbc"));
}
