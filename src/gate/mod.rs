// src/gate/mod.rs

//! Quality gate.
//!
//! After a worker reports a result, the [`GateEvaluator`] decides whether the
//! task may count as `Completed` (dependents can proceed) or must be
//! `Blocked` until a corrective task remediates it. Which roles must attach
//! a passing verification report is configuration, see [`GatePolicy`].

use std::collections::BTreeSet;
use std::fmt;

use tracing::debug;

use crate::dag::TaskRecord;
use crate::types::Role;

/// Roles whose results need a passing verification report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatePolicy {
    mandatory: BTreeSet<Role>,
}

impl GatePolicy {
    pub fn new(mandatory: impl IntoIterator<Item = Role>) -> Self {
        Self {
            mandatory: mandatory.into_iter().collect(),
        }
    }

    /// No role requires verification; every result passes.
    pub fn permissive() -> Self {
        Self::new([])
    }

    pub fn requires_verification(&self, role: Role) -> bool {
        self.mandatory.contains(&role)
    }

    pub fn mandatory_roles(&self) -> impl Iterator<Item = Role> + '_ {
        self.mandatory.iter().copied()
    }
}

impl Default for GatePolicy {
    /// Implementation and test work must be verified; design and
    /// orchestration work passes unconditionally.
    fn default() -> Self {
        Self::new([Role::Implement, Role::Test])
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateFailure {
    MissingVerification,
    /// The report said `passed = false`; carries its summary.
    VerificationFailed(String),
}

impl fmt::Display for GateFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GateFailure::MissingVerification => f.write_str("verification required but missing"),
            GateFailure::VerificationFailed(summary) if summary.is_empty() => {
                f.write_str("verification failed")
            }
            GateFailure::VerificationFailed(summary) => write!(f, "verification failed: {summary}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    Fail(GateFailure),
}

impl GateDecision {
    pub fn is_pass(&self) -> bool {
        matches!(self, GateDecision::Pass)
    }
}

#[derive(Debug, Clone, Default)]
pub struct GateEvaluator {
    policy: GatePolicy,
}

impl GateEvaluator {
    pub fn new(policy: GatePolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &GatePolicy {
        &self.policy
    }

    /// Decide whether a finished task may unblock its dependents.
    ///
    /// Only the verification report matters; the result payload is never
    /// inspected.
    pub fn evaluate(&self, task: &TaskRecord) -> GateDecision {
        if !self.policy.requires_verification(task.role) {
            debug!(task = %task.id, role = %task.role, "role does not require verification; gate passes");
            return GateDecision::Pass;
        }

        let decision = match &task.verification {
            None => GateDecision::Fail(GateFailure::MissingVerification),
            Some(v) if v.passed => GateDecision::Pass,
            Some(v) => GateDecision::Fail(GateFailure::VerificationFailed(v.summary.clone())),
        };

        debug!(task = %task.id, role = %task.role, ?decision, "gate evaluated");
        decision
    }
}
