//! Request and response bodies exchanged with the investigation service.

use std::collections::BTreeMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use super::review::resolve_review_reason;
use crate::types::{
    AlternativeWorkflow, AnalysisRecord, EnrichmentResults, InvestigationResult,
    PreviousExecution, RootCauseAnalysis,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvestigationRequest {
    pub incident_id: String,
    pub fingerprint: String,
    pub signal_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<String>,
    pub environment: String,
    pub priority: String,
    pub resource_kind: String,
    pub resource_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_namespace: Option<String>,
    /// Free-text summary handed to the investigating model.
    pub incident_context: String,
    pub enrichment_results: EnrichmentResults,
    pub is_recovery_attempt: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_attempt_number: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_execution: Option<PreviousExecution>,
}

impl InvestigationRequest {
    /// Build the request for a record. Identical input yields an identical
    /// request, so a retried attempt re-issues exactly the same call.
    pub fn from_record(record: &AnalysisRecord) -> Self {
        let signal = record.signal();
        let target = &signal.target_resource;
        let previous = if record.request.is_recovery_attempt {
            record.latest_previous_execution().cloned()
        } else {
            None
        };

        Self {
            incident_id: record.id.clone(),
            fingerprint: signal.fingerprint.clone(),
            signal_type: signal.signal_type.clone(),
            severity: signal.severity.clone(),
            environment: signal.environment.clone(),
            priority: signal.business_priority.clone(),
            resource_kind: target.kind.clone(),
            resource_name: target.name.clone(),
            resource_namespace: target.namespace.clone(),
            incident_context: incident_context(record),
            enrichment_results: signal.enrichment_results.clone(),
            is_recovery_attempt: record.request.is_recovery_attempt,
            recovery_attempt_number: record.request.recovery_attempt_number,
            previous_execution: previous,
        }
    }
}

fn incident_context(record: &AnalysisRecord) -> String {
    let signal = record.signal();
    let mut ctx = format!(
        "Signal {} ({}) on {} in environment {} with business priority {}.",
        signal.signal_type,
        signal.severity.as_deref().unwrap_or("unknown severity"),
        signal.target_resource,
        signal.environment,
        signal.business_priority,
    );

    if record.request.is_recovery_attempt {
        let _ = write!(
            ctx,
            " This is recovery attempt {}.",
            record.request.recovery_attempt_number.unwrap_or(1)
        );
        if let Some(prev) = record.latest_previous_execution() {
            let _ = write!(
                ctx,
                " Previous execution {} of workflow {} failed: {}.",
                prev.execution_ref,
                prev.workflow_id.as_deref().unwrap_or("unknown"),
                prev.failure_reason.as_deref().unwrap_or("no reason recorded"),
            );
        }
    }
    ctx
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireRootCause {
    #[serde(default)]
    pub summary: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WireWorkflow {
    pub workflow_id: String,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub rationale: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InvestigationResponse {
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub root_cause_analysis: Option<WireRootCause>,
    #[serde(default)]
    pub selected_workflow: Option<WireWorkflow>,
    #[serde(default)]
    pub alternative_workflows: Vec<WireWorkflow>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub target_in_owner_chain: bool,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub needs_human_review: bool,
    #[serde(default)]
    pub human_review_reason: Option<String>,
}

impl InvestigationResponse {
    /// Convert into the stored result.
    ///
    /// Confidence is clamped to `[0.0, 1.0]`. Alternatives lose their
    /// parameters so they can never be executed.
    pub fn into_result(self, duration_ms: u64) -> InvestigationResult {
        let review_reason = resolve_review_reason(
            self.needs_human_review,
            self.human_review_reason.as_deref(),
            &self.warnings,
        );

        let root_cause_analysis = self.root_cause_analysis.map(|rca| RootCauseAnalysis {
            summary: rca.summary,
            severity: rca.severity,
            contributing_factors: rca.contributing_factors,
        });
        let root_cause = root_cause_analysis
            .as_ref()
            .map(|rca| rca.summary.clone())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| self.analysis.clone());

        let selected_workflow = self.selected_workflow.map(|wf| crate::types::SelectedWorkflow {
            workflow_id: wf.workflow_id,
            container_image: wf.container_image.unwrap_or_default(),
            confidence: clamp_confidence(wf.confidence),
            parameters: wf.parameters,
            rationale: wf.rationale,
        });

        let alternative_workflows = self
            .alternative_workflows
            .into_iter()
            .map(|wf| AlternativeWorkflow {
                workflow_id: wf.workflow_id,
                container_image: wf.container_image,
                confidence: clamp_confidence(wf.confidence),
                rationale: wf.rationale,
            })
            .collect();

        InvestigationResult {
            analysis: self.analysis,
            root_cause,
            root_cause_analysis,
            confidence: clamp_confidence(self.confidence),
            selected_workflow,
            alternative_workflows,
            warnings: self.warnings,
            target_in_owner_chain: self.target_in_owner_chain,
            needs_human_review: self.needs_human_review,
            review_reason,
            duration_ms,
        }
    }
}

fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}
