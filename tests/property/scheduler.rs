use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use proptest::prelude::*;
use rolegate::dag::{PlannedTask, TaskFailure, TaskSpec};
use rolegate::engine::{EngineOptions, Orchestrator};
use rolegate::gate::GatePolicy;
use rolegate::types::{Role, TaskId, TaskStatus, Verification};
use rolegate::workers::WorkOutput;
use rolegate_test_utils::fake_worker::ScriptedWorker;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Pass,
    GateFail,
    Error,
}

#[derive(Debug, Clone)]
struct Node {
    role: Role,
    deps: BTreeSet<usize>,
    outcome: Outcome,
}

fn outcome_strategy() -> impl Strategy<Value = Outcome> {
    prop_oneof![
        6 => Just(Outcome::Pass),
        2 => Just(Outcome::GateFail),
        1 => Just(Outcome::Error),
    ]
}

// We ensure acyclicity by only allowing task N to depend on tasks 0..N-1.
fn dag_strategy(max_tasks: usize) -> impl Strategy<Value = Vec<Node>> {
    (1..=max_tasks).prop_flat_map(|num_tasks| {
        proptest::collection::vec(
            (
                0..Role::ALL.len(),
                proptest::collection::vec(any::<usize>(), 0..4),
                outcome_strategy(),
            ),
            num_tasks,
        )
        .prop_map(|raw| {
            raw.into_iter()
                .enumerate()
                .map(|(i, (role, potential, outcome))| Node {
                    role: Role::ALL[role],
                    deps: if i == 0 {
                        BTreeSet::new()
                    } else {
                        potential.into_iter().map(|d| d % i).collect()
                    },
                    outcome,
                })
                .collect()
        })
    })
}

fn key(i: usize) -> String {
    format!("t{i}")
}

/// What each task must end as, computed without the engine.
fn expected_statuses(nodes: &[Node], policy: &GatePolicy) -> Vec<TaskStatus> {
    let mut expected: Vec<TaskStatus> = Vec::with_capacity(nodes.len());
    for node in nodes {
        let deps_ok = node
            .deps
            .iter()
            .all(|d| expected[*d] == TaskStatus::Completed);
        let status = if !deps_ok {
            TaskStatus::Pending
        } else {
            match node.outcome {
                Outcome::Error => TaskStatus::Failed,
                Outcome::GateFail if policy.requires_verification(node.role) => TaskStatus::Blocked,
                _ => TaskStatus::Completed,
            }
        };
        expected.push(status);
    }
    expected
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn dependents_only_run_after_their_gates_pass(
        nodes in dag_strategy(12),
        pool in 1..3usize,
    ) {
        let policy = GatePolicy::default();
        let mut core = Orchestrator::new(policy.clone(), EngineOptions::default());
        for role in Role::ALL {
            for _ in 0..pool {
                core.register_worker(role, Arc::new(ScriptedWorker::passing()));
            }
        }

        let plan: Vec<PlannedTask> = nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let mut planned = PlannedTask::new(key(i), TaskSpec::new(node.role, key(i)));
                for dep in &node.deps {
                    planned = planned.after_key(key(*dep));
                }
                planned
            })
            .collect();

        let ids = core.submit_plan(plan).unwrap();
        let index: BTreeMap<TaskId, usize> = (0..nodes.len()).map(|i| (ids[&key(i)], i)).collect();

        let mut started: Vec<usize> = Vec::new();
        loop {
            let dispatches = core.schedule();
            if dispatches.is_empty() {
                break;
            }

            for dispatch in dispatches {
                let assignment = dispatch.assignment;
                let i = index[&assignment.task];
                prop_assert_eq!(dispatch.task.role, nodes[i].role);

                for dep in &nodes[i].deps {
                    let dep_rec = core.status(ids[&key(*dep)]).unwrap();
                    prop_assert_eq!(dep_rec.status, TaskStatus::Completed);
                    prop_assert!(dep_rec.satisfies_dependents());
                }

                prop_assert!(core.on_worker_started(assignment));
                started.push(i);

                match nodes[i].outcome {
                    Outcome::Pass => {
                        let output = WorkOutput::new("ok").with_verification(Verification::passed("ok"));
                        prop_assert!(core.on_worker_finished(assignment, output).is_some());
                    }
                    Outcome::GateFail => {
                        let output = WorkOutput::new("meh").with_verification(Verification::failed("red"));
                        prop_assert!(core.on_worker_finished(assignment, output).is_some());
                    }
                    Outcome::Error => {
                        let failure = TaskFailure::WorkerError("boom".to_string());
                        prop_assert!(core.on_worker_failed(assignment, failure));
                    }
                }
            }
        }

        prop_assert!(core.is_quiescent());

        // Each task ran at most once.
        let distinct: BTreeSet<usize> = started.iter().copied().collect();
        prop_assert_eq!(distinct.len(), started.len());

        let expected = expected_statuses(&nodes, &policy);
        let mut expected_stalled = Vec::new();
        for (i, want) in expected.iter().enumerate() {
            let id = ids[&key(i)];
            let rec = core.status(id).unwrap();
            prop_assert_eq!(rec.status, *want, "task {}", i);
            if *want == TaskStatus::Pending {
                prop_assert!(!distinct.contains(&i));
                expected_stalled.push(id);
            }
        }

        let graph = core.shared_graph();
        let stalled = graph.read().unwrap().stalled_tasks();
        prop_assert_eq!(stalled, expected_stalled);
    }
}
