// src/dag/graph.rs

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::{debug, info, warn};

use crate::dag::task_info::{GateState, TaskFailure, TaskRecord, TaskSpec};
use crate::errors::{Result, RolegateError};
use crate::types::{TaskId, TaskStatus};

/// Reference to a dependency inside a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DepRef {
    /// Another task in the same batch, by key.
    Key(String),
    /// A task that already exists in the graph.
    Id(TaskId),
}

/// One entry of a batch submission (see [`TaskGraph::add_batch`]).
#[derive(Debug, Clone)]
pub struct PlannedTask {
    pub key: String,
    pub spec: TaskSpec,
    pub after: Vec<DepRef>,
    /// Overrides `spec.remediates`; may point at a task in the same batch.
    pub remediates: Option<DepRef>,
}

impl PlannedTask {
    pub fn new(key: impl Into<String>, spec: TaskSpec) -> Self {
        Self {
            key: key.into(),
            spec,
            after: Vec::new(),
            remediates: None,
        }
    }

    pub fn after_key(mut self, key: impl Into<String>) -> Self {
        self.after.push(DepRef::Key(key.into()));
        self
    }

    pub fn after_id(mut self, id: TaskId) -> Self {
        self.after.push(DepRef::Id(id));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Visiting,
    Done,
}

/// Dependency graph of tasks. Owns every [`TaskRecord`].
///
/// Records are keyed by [`TaskId`] in a `BTreeMap`, so iteration order is
/// creation order; readiness queries rely on that for FIFO scheduling.
#[derive(Debug, Default)]
pub struct TaskGraph {
    tasks: BTreeMap<TaskId, TaskRecord>,
    /// Reverse edges: task -> tasks that depend on it.
    dependents: HashMap<TaskId, BTreeSet<TaskId>>,
    next_id: u64,
}

impl TaskGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a single task depending on existing tasks.
    pub fn add_task(
        &mut self,
        spec: TaskSpec,
        deps: impl IntoIterator<Item = TaskId>,
    ) -> Result<TaskId> {
        let mut planned = PlannedTask::new("submitted", spec);
        planned.after = deps.into_iter().map(DepRef::Id).collect();

        let ids = self.add_batch(vec![planned])?;
        ids.into_values()
            .next()
            .ok_or_else(|| anyhow::anyhow!("batch of one produced no task id").into())
    }

    /// Insert a batch of tasks atomically.
    ///
    /// Entries may depend on each other by key and on existing tasks by id.
    /// Everything is validated (duplicate keys, unknown references, cycles)
    /// before the graph is touched, so a rejected batch leaves no trace.
    pub fn add_batch(&mut self, plan: Vec<PlannedTask>) -> Result<BTreeMap<String, TaskId>> {
        let mut keys: BTreeMap<String, TaskId> = BTreeMap::new();
        for (offset, planned) in plan.iter().enumerate() {
            let id = TaskId::new(self.next_id + 1 + offset as u64);
            if keys.insert(planned.key.clone(), id).is_some() {
                return Err(RolegateError::DuplicateKey(planned.key.clone()));
            }
        }

        let resolve = |dep: &DepRef| -> Result<TaskId> {
            match dep {
                DepRef::Key(key) => keys
                    .get(key)
                    .copied()
                    .ok_or_else(|| RolegateError::UnknownDependency(format!("'{key}'"))),
                DepRef::Id(id) if self.tasks.contains_key(id) => Ok(*id),
                DepRef::Id(id) => Err(RolegateError::UnknownDependency(id.to_string())),
            }
        };

        let mut resolved = Vec::with_capacity(plan.len());
        let mut edges: BTreeMap<TaskId, Vec<TaskId>> = BTreeMap::new();

        for planned in plan {
            let id = keys[&planned.key];
            let deps = planned
                .after
                .iter()
                .map(resolve)
                .collect::<Result<BTreeSet<TaskId>>>()?;

            let mut spec = planned.spec;
            if let Some(target) = &planned.remediates {
                spec.remediates = Some(resolve(target)?);
            }
            if let Some(target) = spec.remediates {
                if target == id {
                    return Err(RolegateError::CycleError(format!(
                        "'{}' cannot remediate itself",
                        planned.key
                    )));
                }
                match self.tasks.get(&target) {
                    Some(rec) if rec.rejects_remediation() => {
                        return Err(RolegateError::NotRemediable {
                            task: target,
                            status: rec.status,
                        });
                    }
                    Some(_) => {}
                    None if keys.values().any(|v| *v == target) => {}
                    None => return Err(RolegateError::UnknownDependency(target.to_string())),
                }
            }

            // Existing tasks never point at new ones, so only edges between
            // batch members can close a cycle. A corrective task waits on
            // its target like on a dependency.
            edges.insert(
                id,
                deps.iter()
                    .copied()
                    .chain(spec.remediates)
                    .filter(|dep| !self.tasks.contains_key(dep))
                    .collect(),
            );
            resolved.push((planned.key, id, spec, deps));
        }

        if let Some(cycle) = find_cycle(&edges) {
            let by_id: HashMap<TaskId, &str> =
                keys.iter().map(|(key, id)| (*id, key.as_str())).collect();
            let path = cycle
                .iter()
                .map(|id| by_id.get(id).map(|k| k.to_string()).unwrap_or_else(|| id.to_string()))
                .collect::<Vec<_>>()
                .join(" -> ");
            return Err(RolegateError::CycleError(path));
        }

        self.next_id += resolved.len() as u64;

        for (key, id, spec, deps) in resolved {
            for dep in &deps {
                self.dependents.entry(*dep).or_default().insert(id);
            }
            let record = TaskRecord::new(id, spec, deps);
            debug!(
                task = %id,
                key = %key,
                role = %record.role,
                status = %record.status,
                deps = record.depends_on.len(),
                "task inserted into graph"
            );
            self.tasks.insert(id, record);
        }

        Ok(keys)
    }

    pub fn get(&self, id: TaskId) -> Option<&TaskRecord> {
        self.tasks.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: TaskId) -> Option<&mut TaskRecord> {
        self.tasks.get_mut(&id)
    }

    /// Owned copy of a task's current state.
    pub fn snapshot(&self, id: TaskId) -> Option<TaskRecord> {
        self.tasks.get(&id).cloned()
    }

    /// All tasks in creation order.
    pub fn iter(&self) -> impl Iterator<Item = &TaskRecord> {
        self.tasks.values()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Direct dependents of a task.
    pub fn neighbors(&self, id: TaskId) -> impl Iterator<Item = TaskId> + '_ {
        self.dependents.get(&id).into_iter().flatten().copied()
    }

    /// All tasks reachable through dependent edges, nearest first.
    pub fn transitive_dependents(&self, id: TaskId) -> Vec<TaskId> {
        let mut stack: Vec<TaskId> = self.neighbors(id).collect();
        let mut seen: BTreeSet<TaskId> = BTreeSet::new();
        let mut out = Vec::new();

        while let Some(next) = stack.pop() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            stack.extend(self.neighbors(next));
        }

        out
    }

    /// Whether every dependency of `id` is Completed-and-gated (or remediated).
    pub fn deps_satisfied(&self, id: TaskId) -> bool {
        self.tasks
            .get(&id)
            .map(|rec| self.deps_satisfied_for(rec))
            .unwrap_or(false)
    }

    fn deps_satisfied_for(&self, record: &TaskRecord) -> bool {
        let target_blocked = record.remediates.is_none_or(|target| {
            self.tasks
                .get(&target)
                .is_some_and(TaskRecord::accepts_remediation)
        });

        target_blocked
            && record.depends_on.iter().all(|dep| match self.tasks.get(dep) {
                Some(dep) => dep.satisfies_dependents(),
                None => {
                    warn!(task = %record.id, dep = %dep, "dependency missing from graph");
                    false
                }
            })
    }

    /// Tasks that may be assigned now, in creation order.
    ///
    /// Includes `Ready` tasks and `Pending` tasks whose dependencies are
    /// satisfied. Computed fresh on every call.
    pub fn ready_tasks(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.tasks
            .values()
            .filter(move |rec| match rec.status {
                TaskStatus::Ready => true,
                TaskStatus::Pending => self.deps_satisfied_for(rec),
                _ => false,
            })
            .map(|rec| rec.id)
    }

    /// Move a task to `next`, validating the transition.
    ///
    /// `Pending -> Ready` additionally requires satisfied dependencies.
    /// Returns the previous status. On error the task is left unchanged.
    pub fn mark_status(&mut self, id: TaskId, next: TaskStatus) -> Result<TaskStatus> {
        let current = self
            .tasks
            .get(&id)
            .ok_or(RolegateError::TaskNotFound(id))?
            .status;

        let allowed = current.can_transition_to(next)
            && !(current == TaskStatus::Pending
                && next == TaskStatus::Ready
                && !self.deps_satisfied(id));

        if !allowed {
            warn!(task = %id, from = %current, to = %next, "rejected invalid status transition");
            return Err(RolegateError::InvalidTransition {
                task: id,
                from: current,
                to: next,
            });
        }

        if let Some(rec) = self.tasks.get_mut(&id) {
            rec.status = next;
        }
        debug!(task = %id, from = %current, to = %next, "status changed");
        Ok(current)
    }

    /// Promote `Pending` candidates whose dependencies are now satisfied.
    pub fn promote_ready(&mut self, candidates: impl IntoIterator<Item = TaskId>) -> Vec<TaskId> {
        let mut promoted = Vec::new();

        for id in candidates {
            let eligible = self
                .tasks
                .get(&id)
                .is_some_and(|rec| rec.status == TaskStatus::Pending && self.deps_satisfied_for(rec));
            if eligible && self.mark_status(id, TaskStatus::Ready).is_ok() {
                promoted.push(id);
            }
        }

        promoted
    }

    /// Fail corrective tasks that have not started and whose target settled
    /// without a gate failure (completed, failed, blocked by a cancelled
    /// dependency, or removed).
    pub fn retire_unneeded_remediations(&mut self) -> Vec<TaskId> {
        let unneeded: Vec<(TaskId, TaskId)> = self
            .tasks
            .values()
            .filter(|rec| rec.status == TaskStatus::Pending)
            .filter_map(|rec| {
                let target = rec.remediates?;
                self.tasks
                    .get(&target)
                    .is_none_or(TaskRecord::rejects_remediation)
                    .then_some((rec.id, target))
            })
            .collect();

        let mut retired = Vec::with_capacity(unneeded.len());
        for (id, target) in unneeded {
            if self.mark_status(id, TaskStatus::Failed).is_err() {
                continue;
            }
            if let Some(rec) = self.tasks.get_mut(&id) {
                rec.failure = Some(TaskFailure::RemediationNotNeeded(target));
            }
            info!(task = %id, target = %target, "corrective task not needed; retired");
            retired.push(id);
        }

        retired
    }

    /// Flip the gate of a blocked task after its corrective task completed.
    ///
    /// Returns `true` if dependents of `blocked` may now proceed.
    pub fn remediate(&mut self, blocked: TaskId, by: TaskId) -> bool {
        let Some(rec) = self.tasks.get_mut(&blocked) else {
            warn!(task = %blocked, by = %by, "remediation target no longer exists");
            return false;
        };

        if rec.status != TaskStatus::Blocked {
            warn!(
                task = %blocked,
                by = %by,
                status = %rec.status,
                "remediation target is not blocked; ignoring"
            );
            return false;
        }

        if let GateState::Remediated(previous) = rec.gate {
            debug!(task = %blocked, by = %by, previous = %previous, "task already remediated");
            return true;
        }

        rec.gate = GateState::Remediated(by);
        info!(task = %blocked, by = %by, "blocked task remediated; dependents may proceed");
        true
    }

    /// Remove a task that nothing depends on. Returns `None` (and leaves the
    /// graph unchanged) if the task is unknown or still has dependents.
    pub(crate) fn remove(&mut self, id: TaskId) -> Option<TaskRecord> {
        if self.neighbors(id).next().is_some() {
            return None;
        }

        let record = self.tasks.remove(&id)?;
        for dep in &record.depends_on {
            if let Some(set) = self.dependents.get_mut(dep) {
                set.remove(&id);
            }
        }
        self.dependents.remove(&id);
        debug!(task = %id, "task removed from graph");
        Some(record)
    }

    /// Number of tasks owned by a worker or waiting on the gate.
    pub fn in_flight_count(&self) -> usize {
        self.tasks.values().filter(|rec| rec.status.is_in_flight()).count()
    }

    /// Task count per status.
    pub fn counts(&self) -> BTreeMap<TaskStatus, usize> {
        let mut counts = BTreeMap::new();
        for rec in self.tasks.values() {
            *counts.entry(rec.status).or_insert(0) += 1;
        }
        counts
    }

    /// Non-terminal tasks that can never become ready because some
    /// (transitive) dependency failed or is blocked without remediation.
    pub fn stalled_tasks(&self) -> Vec<TaskId> {
        let mut stalled: BTreeSet<TaskId> = BTreeSet::new();

        loop {
            let mut changed = false;
            for rec in self.tasks.values() {
                if rec.status.is_terminal() || rec.status.is_in_flight() || stalled.contains(&rec.id) {
                    continue;
                }
                let dead = rec.depends_on.iter().any(|dep| {
                    stalled.contains(dep) || self.tasks.get(dep).is_some_and(TaskRecord::is_dead_end)
                }) || rec.remediates.is_some_and(|target| stalled.contains(&target));
                if dead {
                    stalled.insert(rec.id);
                    changed = true;
                }
            }
            if !changed {
                break;
            }
        }

        stalled.into_iter().collect()
    }
}

/// Depth-first search with a recursion-stack marker.
///
/// `edges` maps a node to the nodes it depends on. Returns the nodes of the
/// first cycle found, with the entry node repeated at the end.
fn find_cycle(edges: &BTreeMap<TaskId, Vec<TaskId>>) -> Option<Vec<TaskId>> {
    let mut marks: HashMap<TaskId, Mark> = HashMap::new();

    for &start in edges.keys() {
        if marks.contains_key(&start) {
            continue;
        }

        // (node, index of the next child to visit)
        let mut stack: Vec<(TaskId, usize)> = vec![(start, 0)];
        marks.insert(start, Mark::Visiting);

        while let Some(&(node, idx)) = stack.last() {
            let children = edges.get(&node).map(Vec::as_slice).unwrap_or(&[]);

            if idx >= children.len() {
                marks.insert(node, Mark::Done);
                stack.pop();
                continue;
            }

            if let Some(top) = stack.last_mut() {
                top.1 += 1;
            }

            let child = children[idx];
            match marks.get(&child) {
                Some(Mark::Visiting) => {
                    let pos = stack.iter().position(|(n, _)| *n == child).unwrap_or(0);
                    let mut cycle: Vec<TaskId> = stack[pos..].iter().map(|(n, _)| *n).collect();
                    cycle.push(child);
                    return Some(cycle);
                }
                Some(Mark::Done) => {}
                None => {
                    marks.insert(child, Mark::Visiting);
                    stack.push((child, 0));
                }
            }
        }
    }

    None
}
