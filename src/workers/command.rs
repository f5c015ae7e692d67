// src/workers/command.rs

//! Worker that runs a shell command per task.

use std::collections::VecDeque;
use std::process::Stdio;

use anyhow::{Context, Result};
use regex::Regex;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::dag::ScheduledTask;
use crate::types::{Role, Verification};
use crate::workers::backend::{WorkFuture, WorkOutput, Worker};

/// Only the tail of stdout is kept as the result payload.
const MAX_CAPTURED_LINES: usize = 200;

/// Runs `cmd` through the platform shell for every task it receives.
///
/// The task is passed through the environment:
/// `ROLEGATE_TASK_ID`, `ROLEGATE_ROLE`, `ROLEGATE_GOAL`, `ROLEGATE_ATTEMPT`
/// and `ROLEGATE_INPUTS` (newline separated).
///
/// Stdout becomes the result payload. The verification report passes when
/// the process exits successfully and, if `verify_on_stdout` is set, at
/// least one stdout line matches it. Failing to spawn or wait for the
/// process is a worker error.
#[derive(Debug, Clone)]
pub struct CommandWorker {
    role: Role,
    cmd: String,
    verify_on_stdout: Option<Regex>,
}

impl CommandWorker {
    pub fn new(role: Role, cmd: impl Into<String>) -> Self {
        Self {
            role,
            cmd: cmd.into(),
            verify_on_stdout: None,
        }
    }

    pub fn with_verify_pattern(mut self, pattern: Regex) -> Self {
        self.verify_on_stdout = Some(pattern);
        self
    }

    pub fn role(&self) -> Role {
        self.role
    }

    async fn run(&self, task: &ScheduledTask) -> Result<WorkOutput> {
        info!(
            task = %task.id,
            role = %self.role,
            attempt = task.attempt,
            cmd = %self.cmd,
            "starting worker process"
        );

        let mut cmd = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        };

        cmd.env("ROLEGATE_TASK_ID", task.id.get().to_string())
            .env("ROLEGATE_ROLE", task.role.as_str())
            .env("ROLEGATE_GOAL", &task.goal)
            .env("ROLEGATE_ATTEMPT", task.attempt.to_string())
            .env("ROLEGATE_INPUTS", task.inputs.join("\n"))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for {}", task.id))?;

        // Always consume stderr so buffers don't fill; log at debug.
        if let Some(stderr) = child.stderr.take() {
            let task_id = task.id;
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %task_id, "stderr: {}", line);
                }
            });
        }

        let mut captured: VecDeque<String> = VecDeque::new();
        let mut matched: Option<String> = None;

        if let Some(stdout) = child.stdout.take() {
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .with_context(|| format!("reading stdout of {}", task.id))?
            {
                debug!(task = %task.id, "stdout: {}", line);

                if matched.is_none()
                    && self
                        .verify_on_stdout
                        .as_ref()
                        .is_some_and(|re| re.is_match(&line))
                {
                    matched = Some(line.clone());
                }

                captured.push_back(line);
                if captured.len() > MAX_CAPTURED_LINES {
                    captured.pop_front();
                }
            }
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of {}", task.id))?;
        let code = status.code().unwrap_or(-1);

        let pattern_ok = self.verify_on_stdout.is_none() || matched.is_some();
        let passed = status.success() && pattern_ok;

        let summary = match (&self.verify_on_stdout, matched) {
            (Some(_), Some(line)) => format!("exit code {code}; matched: {line}"),
            (Some(re), None) => format!("exit code {code}; no stdout line matched /{re}/"),
            (None, _) => format!("exit code {code}"),
        };

        info!(
            task = %task.id,
            exit_code = code,
            passed,
            "worker process exited"
        );

        let verification = if passed {
            Verification::passed(summary)
        } else {
            Verification::failed(summary)
        };

        Ok(WorkOutput {
            result: Some(Vec::from(captured).join("\n")),
            verification: Some(verification),
        })
    }
}

impl Worker for CommandWorker {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> WorkFuture<'a, WorkOutput> {
        Box::pin(self.run(task))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::types::TaskId;

    fn scheduled(goal: &str) -> ScheduledTask {
        ScheduledTask {
            id: TaskId::new(3),
            role: Role::Test,
            goal: goal.to_string(),
            inputs: vec!["spec.md".to_string(), "src/".to_string()],
            attempt: 1,
        }
    }

    #[tokio::test]
    async fn successful_exit_passes_and_captures_stdout() {
        let worker = CommandWorker::new(Role::Test, "echo \"$ROLEGATE_GOAL\"; echo \"$ROLEGATE_TASK_ID\"");
        let out = worker.execute(&scheduled("run tests")).await.unwrap();

        assert_eq!(out.result.as_deref(), Some("run tests\n3"));
        assert!(out.verification.unwrap().passed);
    }

    #[tokio::test]
    async fn failing_exit_reports_failed_verification() {
        let worker = CommandWorker::new(Role::Test, "echo broken; exit 3");
        let out = worker.execute(&scheduled("run tests")).await.unwrap();

        let v = out.verification.unwrap();
        assert!(!v.passed);
        assert!(v.summary.contains("exit code 3"), "{}", v.summary);
    }

    #[tokio::test]
    async fn verify_pattern_must_match() {
        let pattern = Regex::new(r"^test result: ok").unwrap();
        let worker = CommandWorker::new(Role::Test, "echo 'test result: FAILED'")
            .with_verify_pattern(pattern.clone());
        let out = worker.execute(&scheduled("t")).await.unwrap();
        assert!(!out.verification.unwrap().passed);

        let worker =
            CommandWorker::new(Role::Test, "echo 'test result: ok. 4 passed'").with_verify_pattern(pattern);
        let out = worker.execute(&scheduled("t")).await.unwrap();
        assert!(out.verification.unwrap().passed);
    }

    #[tokio::test]
    async fn inputs_are_newline_separated() {
        let worker = CommandWorker::new(Role::Test, "printf '%s' \"$ROLEGATE_INPUTS\"");
        let out = worker.execute(&scheduled("t")).await.unwrap();

        assert_eq!(out.result.as_deref(), Some("spec.md\nsrc/"));
    }
}
