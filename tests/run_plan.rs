// tests/run_plan.rs
//
// End-to-end runs of plan files with real shell workers.
#![cfg(unix)]

use std::fs;

use rolegate::cli::CliArgs;
use rolegate::run;
use rolegate_test_utils::{init_tracing, with_timeout};
use tempfile::TempDir;

fn write_plan(dir: &TempDir, contents: &str) -> String {
    let path = dir.path().join("Rolegate.toml");
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

fn args(plan: String, dry_run: bool) -> CliArgs {
    CliArgs {
        plan,
        log_level: None,
        dry_run,
    }
}

#[tokio::test]
async fn passing_plan_runs_to_completion() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("order.log");

    let plan = write_plan(
        &dir,
        &format!(
            r#"
[worker.design]
cmd = "echo \"$ROLEGATE_GOAL\" >> {log}"

[worker.implement]
pool_size = 2
cmd = "echo \"$ROLEGATE_GOAL\" >> {log}; echo 'BUILD OK'"
verify_on_stdout = "^BUILD OK"

[task.outline]
role = "design"
goal = "outline"

[task.left]
role = "implement"
goal = "left"
after = ["outline"]

[task.right]
role = "implement"
goal = "right"
after = ["outline"]
"#,
            log = out.display()
        ),
    );

    with_timeout(run(args(plan, false))).await.unwrap();

    let log = fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = log.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], "outline");
}

#[tokio::test]
async fn failed_gate_makes_the_run_fail() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();

    let plan = write_plan(
        &dir,
        r#"
[worker.implement]
cmd = "echo 'BUILD FAILED'"
verify_on_stdout = "^BUILD OK"

[worker.test]
cmd = "echo should-not-run; exit 1"

[task.build]
role = "implement"
goal = "build"

[task.check]
role = "test"
goal = "check"
after = ["build"]
"#,
    );

    let err = with_timeout(run(args(plan, false))).await.unwrap_err();
    assert!(err.to_string().contains("2 of 2 tasks did not complete"), "{err}");
}

const REMEDIATED_PLAN: &str = r#"
[worker.implement]
cmd = "echo \"$ROLEGATE_GOAL\" >> {log}; {verdict}"
verify_on_stdout = "^BUILD OK"

[worker.test]
cmd = "echo \"$ROLEGATE_GOAL\" >> {log}"

[task.build]
role = "implement"
goal = "build"

[task.fix]
role = "implement"
goal = "fix"
remediates = "build"

[task.check]
role = "test"
goal = "check"
after = ["build"]
"#;

fn remediated_plan(dir: &TempDir, log: &std::path::Path, verdict: &str) -> String {
    let contents = REMEDIATED_PLAN
        .replace("{log}", &log.display().to_string())
        .replace("{verdict}", verdict);
    write_plan(dir, &contents)
}

#[tokio::test]
async fn corrective_task_rescues_a_failed_gate() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("order.log");
    let verdict = r#"if [ \"$ROLEGATE_GOAL\" = build ]; then echo 'BUILD FAILED'; else echo 'BUILD OK'; fi"#;

    let plan = remediated_plan(&dir, &out, verdict);
    with_timeout(run(args(plan, false))).await.unwrap();

    let log = fs::read_to_string(&out).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["build", "fix", "check"]);
}

#[tokio::test]
async fn corrective_task_is_skipped_when_gate_passes() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("order.log");

    let plan = remediated_plan(&dir, &out, "echo 'BUILD OK'");
    with_timeout(run(args(plan, false))).await.unwrap();

    let log = fs::read_to_string(&out).unwrap();
    assert_eq!(log.lines().collect::<Vec<_>>(), vec!["build", "check"]);
}

#[tokio::test]
async fn dry_run_executes_nothing() {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("ran");

    let plan = write_plan(
        &dir,
        &format!(
            r#"
[worker.design]
cmd = "touch {marker}"

[task.only]
role = "design"
goal = "nothing"
"#,
            marker = marker.display()
        ),
    );

    run(args(plan, true)).await.unwrap();
    assert!(!marker.exists());
}
