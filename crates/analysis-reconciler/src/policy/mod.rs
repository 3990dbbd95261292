//! Approval policy.
//!
//! ```text
//! PolicyInput ──► PolicyEngine::evaluate ──► raw document ──► PolicyEvaluator
//!                  (swappable language)       {"approval": {outcome, reason}}
//!                                                            │
//!                          any failure ─► manual_approval + degraded
//! ```
//!
//! The engine is an implementation detail; the evaluator owns the safety
//! contract: it never returns an error and never falls back to approval.

pub mod engine;
pub mod evaluator;
pub mod input;
pub mod rules;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use engine::{PolicyEngine, PolicyError, PolicyOutput, PolicySource};
pub use evaluator::{PolicyEvaluator, APPROVAL_KEY};
pub use input::{PolicyInput, WorkflowSummary};
pub use rules::RulePolicyEngine;

/// What the policy decided.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalOutcome {
    AutoApprove,
    ManualApproval,
    Reject,
}

impl ApprovalOutcome {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "auto_approve" => Some(Self::AutoApprove),
            "manual_approval" => Some(Self::ManualApproval),
            "reject" => Some(Self::Reject),
            _ => None,
        }
    }
}

impl fmt::Display for ApprovalOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AutoApprove => write!(f, "auto_approve"),
            Self::ManualApproval => write!(f, "manual_approval"),
            Self::Reject => write!(f, "reject"),
        }
    }
}

/// A single policy evaluation result. Recomputed on every evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    pub outcome: ApprovalOutcome,
    pub reason: String,
    /// The engine failed and this decision is the conservative default.
    pub degraded: bool,
    pub policy_version: Option<String>,
}

impl PolicyDecision {
    /// The safe default substituted when evaluation fails.
    pub fn degraded(reason: impl Into<String>, policy_version: Option<String>) -> Self {
        Self {
            outcome: ApprovalOutcome::ManualApproval,
            reason: reason.into(),
            degraded: true,
            policy_version,
        }
    }

    pub fn requires_approval(&self) -> bool {
        self.outcome == ApprovalOutcome::ManualApproval
    }
}
