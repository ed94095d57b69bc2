use std::{path::Path, time::Duration};

use grader::{
    GraderConfig,
    actions::{ActionConfig, ActionKind},
    process::{Invoker, ScriptInvoker},
};
use serde_json::json;

fn args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn script_output_and_exit_code_are_captured() {
    let config = GraderConfig::builder().build();
    let dir = tempfile::tempdir().unwrap();
    let invocation = ScriptInvoker::new(&config)
        .invoke(
            Path::new("sh"),
            &args(&["-c", "echo out; echo err >&2; exit 3"]),
            dir.path(),
        )
        .await
        .unwrap();

    assert_eq!(invocation.code, 3);
    assert_eq!(invocation.out, "out\n");
    assert_eq!(invocation.err, "err\n");
    assert!(!invocation.success());
}

#[tokio::test]
async fn overrunning_scripts_report_a_timeout() {
    let config = GraderConfig::builder()
        .script_timeout(Duration::from_millis(200))
        .build();
    let dir = tempfile::tempdir().unwrap();
    let invocation = ScriptInvoker::new(&config)
        .invoke(Path::new("sh"), &args(&["-c", "sleep 5"]), dir.path())
        .await
        .unwrap();

    assert_eq!(invocation.code, 124);
    assert!(invocation.err.contains("timed out"));
}

#[tokio::test]
async fn sandbox_receives_limits_workdir_and_command() {
    let config = GraderConfig::builder().sandbox_script("echo").build();
    let dir = tempfile::tempdir().unwrap();
    let action = ActionConfig::new(ActionKind::Sandbox)
        .with("time", 30)
        .with("net", false)
        .with("cmd", json!(["python3", "check.py"]));

    let invocation = ScriptInvoker::new(&config)
        .invoke_sandbox("course", &action, dir.path())
        .await
        .unwrap();

    assert_eq!(
        invocation.out.trim_end(),
        format!(
            "--course_key course --net false --time 30 {} -- python3 check.py",
            dir.path().display()
        )
    );
}

#[tokio::test]
async fn missing_programs_are_errors() {
    let config = GraderConfig::builder().build();
    let dir = tempfile::tempdir().unwrap();
    let result = ScriptInvoker::new(&config)
        .invoke(Path::new("/definitely/not/here"), &[], dir.path())
        .await;
    assert!(result.is_err());
}
