//! Degrade-safe policy evaluation.
//!
//! The evaluator always answers with a decision. Engine errors, empty or
//! malformed results and engine panics all become `manual_approval` with
//! `degraded = true`.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::{debug, warn};

use super::engine::{PolicyEngine, PolicyError, PolicyOutput, PolicySource};
use super::input::PolicyInput;
use super::rules::RulePolicyEngine;
use super::{ApprovalOutcome, PolicyDecision};

/// Top-level key the policy result lives under.
pub const APPROVAL_KEY: &str = "approval";

/// Reason used when the policy ran but no rule applied.
pub const NO_MATCH_REASON: &str = "No approval rule matched; manual approval required";

#[derive(Clone)]
pub struct PolicyEvaluator {
    engine: Arc<dyn PolicyEngine>,
    default_version: Option<String>,
}

impl PolicyEvaluator {
    pub fn new(engine: Arc<dyn PolicyEngine>) -> Self {
        Self {
            engine,
            default_version: None,
        }
    }

    /// Version to report when the engine reports none.
    pub fn with_default_version(mut self, version: Option<String>) -> Self {
        self.default_version = version;
        self
    }

    /// Evaluator over the built-in rule policy.
    pub fn builtin() -> Self {
        Self::new(Arc::new(RulePolicyEngine::builtin()))
    }

    /// Evaluator over a rule policy read from `source` on every evaluation.
    pub fn from_source(source: PolicySource) -> Self {
        Self::new(Arc::new(RulePolicyEngine::new(source)))
    }

    /// Evaluate the policy. Never fails.
    pub fn evaluate(&self, input: &PolicyInput) -> PolicyDecision {
        let engine = &self.engine;
        let output = catch_unwind(AssertUnwindSafe(|| engine.evaluate(input))).unwrap_or_else(
            |_| Err(PolicyError::Evaluation("policy engine panicked".into())),
        );

        let mut decision = match output {
            Ok(output) => interpret(output),
            Err(err) => {
                warn!(error = %err, "Policy evaluation failed — defaulting to manual approval");
                PolicyDecision::degraded(
                    format!("Policy evaluation failed ({err}); manual approval required"),
                    None,
                )
            }
        };
        if decision.policy_version.is_none() {
            decision.policy_version = self.default_version.clone();
        }

        debug!(
            outcome = %decision.outcome,
            degraded = decision.degraded,
            policy_version = decision.policy_version.as_deref().unwrap_or("unknown"),
            "Policy evaluated"
        );
        decision
    }
}

/// Turn a raw engine document into a decision, validating its shape.
fn interpret(output: PolicyOutput) -> PolicyDecision {
    let version = output.version;

    let Some(document) = output.document else {
        warn!("Policy produced no result — defaulting to manual approval");
        return PolicyDecision::degraded(
            "Policy produced no result; manual approval required",
            version,
        );
    };

    let Some(root) = document.as_object() else {
        return malformed("result is not an object", version);
    };

    let Some(approval) = root.get(APPROVAL_KEY) else {
        return PolicyDecision {
            outcome: ApprovalOutcome::ManualApproval,
            reason: NO_MATCH_REASON.to_string(),
            degraded: false,
            policy_version: version,
        };
    };

    let Some(approval) = approval.as_object() else {
        return malformed("`approval` is not an object", version);
    };

    let Some(outcome) = approval
        .get("outcome")
        .and_then(|v| v.as_str())
        .and_then(ApprovalOutcome::parse)
    else {
        return malformed("`approval.outcome` is missing or unknown", version);
    };

    let reason = match approval.get("reason") {
        None | Some(serde_json::Value::Null) => String::new(),
        Some(serde_json::Value::String(s)) => s.clone(),
        Some(_) => return malformed("`approval.reason` is not a string", version),
    };

    PolicyDecision {
        outcome,
        reason,
        degraded: false,
        policy_version: version,
    }
}

fn malformed(detail: &str, version: Option<String>) -> PolicyDecision {
    warn!(detail, "Policy result has unexpected shape — defaulting to manual approval");
    PolicyDecision::degraded(
        format!("Policy result has unexpected shape ({detail}); manual approval required"),
        version,
    )
}
