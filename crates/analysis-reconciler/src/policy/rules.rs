//! Declarative first-match rule engine over YAML policy documents.
//!
//! ```yaml
//! version: "1.0.0"
//! rules:
//!   - name: production-requires-approval
//!     when:
//!       environment: [production]
//!     outcome: manual_approval
//!     reason: "Production environment requires manual approval"
//! default:              # optional; without it, no match yields no decision
//!   outcome: manual_approval
//!   reason: "..."
//! ```
//!
//! All conditions inside `when` must hold for a rule to match. Unknown
//! condition names are load errors, so a typo can never silently widen a rule.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde_json::json;

use super::engine::{PolicyEngine, PolicyError, PolicyOutput, PolicySource};
use super::evaluator::APPROVAL_KEY;
use super::input::PolicyInput;

/// The policy shipped with the crate, used when no policy file is configured.
pub const DEFAULT_POLICY: &str = include_str!("../../policies/approval.yaml");

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct PolicyDocument {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    rules: Vec<Rule>,
    #[serde(default)]
    default: Option<Effect>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Rule {
    name: String,
    #[serde(default)]
    when: Conditions,
    outcome: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
struct Effect {
    outcome: String,
    #[serde(default)]
    reason: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct Conditions {
    environment: Option<Vec<String>>,
    business_priority: Option<Vec<String>>,
    signal_type: Option<Vec<String>>,
    target_kind: Option<Vec<String>>,
    confidence_at_least: Option<f64>,
    confidence_below: Option<f64>,
    has_failed_detections: Option<bool>,
    failed_detections_include: Option<Vec<String>>,
    labels: Option<BTreeMap<String, serde_json::Value>>,
    is_recovery_attempt: Option<bool>,
    recovery_attempt_at_least: Option<u32>,
    target_in_owner_chain: Option<bool>,
    workflow_selected: Option<bool>,
}

fn any_of(candidates: &Option<Vec<String>>, value: &str) -> bool {
    candidates
        .as_ref()
        .map_or(true, |c| c.iter().any(|v| v.eq_ignore_ascii_case(value)))
}

fn flag(expected: Option<bool>, actual: bool) -> bool {
    expected.map_or(true, |e| e == actual)
}

impl Conditions {
    fn validate(&self, rule: &str) -> Result<(), PolicyError> {
        for (name, bound) in [
            ("confidence_at_least", self.confidence_at_least),
            ("confidence_below", self.confidence_below),
        ] {
            if let Some(v) = bound {
                if !(0.0..=1.0).contains(&v) {
                    return Err(PolicyError::Load(format!(
                        "rule '{rule}': {name} must be within [0, 1], got {v}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn matches(&self, input: &PolicyInput) -> bool {
        any_of(&self.environment, &input.environment)
            && any_of(&self.business_priority, &input.business_priority)
            && any_of(&self.signal_type, &input.signal_type)
            && any_of(&self.target_kind, &input.target_resource.kind)
            && self
                .confidence_at_least
                .map_or(true, |min| input.confidence >= min)
            && self
                .confidence_below
                .map_or(true, |max| input.confidence < max)
            && flag(self.has_failed_detections, !input.failed_detections.is_empty())
            && self.failed_detections_include.as_ref().map_or(true, |names| {
                names.iter().any(|n| input.failed_detections.contains(n))
            })
            && self.labels.as_ref().map_or(true, |labels| {
                labels
                    .iter()
                    .all(|(k, v)| input.detected_labels.get(k) == Some(v))
            })
            && flag(self.is_recovery_attempt, input.is_recovery_attempt)
            && self
                .recovery_attempt_at_least
                .map_or(true, |n| input.is_recovery_attempt && input.recovery_attempt_number >= n)
            && flag(self.target_in_owner_chain, input.target_in_owner_chain)
            && flag(self.workflow_selected, input.selected_workflow.is_some())
    }
}

/// YAML rule engine.
#[derive(Debug, Clone)]
pub struct RulePolicyEngine {
    source: PolicySource,
}

impl RulePolicyEngine {
    pub fn new(source: PolicySource) -> Self {
        Self { source }
    }

    /// Engine over the built-in default policy.
    pub fn builtin() -> Self {
        Self::new(PolicySource::Inline(DEFAULT_POLICY.to_string()))
    }

    fn load(&self) -> Result<PolicyDocument, PolicyError> {
        let text = self.source.read()?;
        let doc: PolicyDocument =
            serde_yaml::from_str(&text).map_err(|e| PolicyError::Load(e.to_string()))?;
        for rule in &doc.rules {
            rule.when.validate(&rule.name)?;
        }
        Ok(doc)
    }
}

impl PolicyEngine for RulePolicyEngine {
    fn evaluate(&self, input: &PolicyInput) -> Result<PolicyOutput, PolicyError> {
        let doc = self.load()?;

        let matched = doc
            .rules
            .iter()
            .find(|rule| rule.when.matches(input))
            .map(|rule| (Some(rule.name.as_str()), &rule.outcome, &rule.reason))
            .or_else(|| {
                doc.default
                    .as_ref()
                    .map(|effect| (None, &effect.outcome, &effect.reason))
            });

        let mut document = serde_json::Map::new();
        if let Some((rule, outcome, reason)) = matched {
            document.insert(
                APPROVAL_KEY.to_string(),
                json!({
                    "outcome": outcome,
                    "reason": reason,
                    "rule": rule,
                }),
            );
        }

        Ok(PolicyOutput {
            document: Some(serde_json::Value::Object(document)),
            version: doc.version,
        })
    }
}
