use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use anyhow::anyhow;
use rolegate::dag::ScheduledTask;
use rolegate::types::{TaskId, Verification};
use rolegate::workers::{WorkFuture, WorkOutput, Worker};

/// A fake worker that:
/// - records which tasks it executed (id + goal, in order)
/// - answers from a script keyed by goal, falling back to a default output.
#[derive(Debug, Clone)]
pub struct ScriptedWorker {
    script: HashMap<String, Result<WorkOutput, String>>,
    fallback: WorkOutput,
    executed: Arc<Mutex<Vec<(TaskId, String)>>>,
}

impl ScriptedWorker {
    /// Every task succeeds with a passing verification.
    pub fn passing() -> Self {
        Self {
            script: HashMap::new(),
            fallback: WorkOutput::new("ok").with_verification(Verification::passed("ok")),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Every task returns a result but no verification report.
    pub fn unverified() -> Self {
        Self {
            fallback: WorkOutput::new("ok"),
            ..Self::passing()
        }
    }

    /// Tasks with this goal report a failing verification.
    pub fn failing_verification(mut self, goal: &str, summary: &str) -> Self {
        self.script.insert(
            goal.to_string(),
            Ok(WorkOutput::new(format!("attempted {goal}"))
                .with_verification(Verification::failed(summary))),
        );
        self
    }

    /// Tasks with this goal return an execution error.
    pub fn erroring(mut self, goal: &str, message: &str) -> Self {
        self.script.insert(goal.to_string(), Err(message.to_string()));
        self
    }

    /// Shared log of executed tasks; clone before moving the worker.
    pub fn executed(&self) -> Arc<Mutex<Vec<(TaskId, String)>>> {
        Arc::clone(&self.executed)
    }

    pub fn executed_goals(&self) -> Vec<String> {
        self.executed
            .lock()
            .unwrap()
            .iter()
            .map(|(_, goal)| goal.clone())
            .collect()
    }
}

impl Worker for ScriptedWorker {
    fn execute<'a>(&'a self, task: &'a ScheduledTask) -> WorkFuture<'a, WorkOutput> {
        self.executed
            .lock()
            .unwrap()
            .push((task.id, task.goal.clone()));

        let answer = self
            .script
            .get(&task.goal)
            .cloned()
            .unwrap_or_else(|| Ok(self.fallback.clone()));

        Box::pin(async move { answer.map_err(|msg| anyhow!(msg)) })
    }
}

/// Where a [`HangingWorker`] stops responding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HangAt {
    /// Never acknowledges the assignment.
    Accept,
    /// Acknowledges, then never finishes.
    Execute,
}

/// A worker that never returns from one of its calls.
#[derive(Debug)]
pub struct HangingWorker {
    at: HangAt,
}

impl HangingWorker {
    pub fn at(at: HangAt) -> Self {
        Self { at }
    }
}

impl Worker for HangingWorker {
    fn accept<'a>(&'a self, _task: &'a ScheduledTask) -> WorkFuture<'a, ()> {
        let at = self.at;
        Box::pin(async move {
            if at == HangAt::Accept {
                std::future::pending::<()>().await;
            }
            Ok(())
        })
    }

    fn execute<'a>(&'a self, _task: &'a ScheduledTask) -> WorkFuture<'a, WorkOutput> {
        Box::pin(async {
            std::future::pending::<()>().await;
            Ok(WorkOutput::default())
        })
    }
}
