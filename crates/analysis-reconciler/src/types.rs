//! Analysis record data model.
//!
//! An [`AnalysisRecord`] is the unit of work reconciled by the engine. It
//! pairs the immutable [`AnalysisRequest`] (what an external actor asked
//! for) with the mutable [`AnalysisStatus`] (what watchers observe), plus
//! the two pieces of engine bookkeeping that survive between reconciles:
//! the retry counter and the stored investigation result.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::investigation::review::HumanReviewReason;
use crate::policy::ApprovalOutcome;
use crate::state_machine::TransitionRecord;

/// Lifecycle phase of an analysis record.
///
/// Phases are declared in their forward order; `Completed` and `Failed` are
/// terminal.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Phase {
    #[default]
    Pending,
    Validating,
    Investigating,
    Analyzing,
    Recommending,
    Completed,
    Failed,
}

impl Phase {
    /// Whether this is a terminal phase (no further reconciliation).
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "Pending"),
            Self::Validating => write!(f, "Validating"),
            Self::Investigating => write!(f, "Investigating"),
            Self::Analyzing => write!(f, "Analyzing"),
            Self::Recommending => write!(f, "Recommending"),
            Self::Completed => write!(f, "Completed"),
            Self::Failed => write!(f, "Failed"),
        }
    }
}

/// Kubernetes-style descriptor of the resource the signal is about.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceIdentifier {
    pub kind: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

impl fmt::Display for ResourceIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{}/{}/{}", self.kind, ns, self.name),
            None => write!(f, "{}/{}", self.kind, self.name),
        }
    }
}

/// Enrichment gathered upstream before the record was created.
///
/// The engine passes this through to the investigation service and projects
/// parts of it into the policy input; it never computes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichmentResults {
    /// Detected facts about the target, e.g. `gitOpsManaged: true`.
    #[serde(default)]
    pub detected_labels: BTreeMap<String, serde_json::Value>,
    /// Names of detections that could not be determined.
    #[serde(default)]
    pub failed_detections: Vec<String>,
    /// Operator-defined labels, keyed by subdomain.
    #[serde(default)]
    pub custom_labels: BTreeMap<String, Vec<String>>,
    /// Owner chain from the target up to its root controller.
    #[serde(default)]
    pub owner_chain: Vec<ResourceIdentifier>,
    /// Free-form cluster context captured by the enrichment step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kubernetes_context: Option<serde_json::Value>,
}

/// Signal context carried on the request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignalContext {
    pub fingerprint: String,
    pub signal_type: String,
    pub environment: String,
    pub business_priority: String,
    #[serde(default)]
    pub severity: Option<String>,
    pub target_resource: ResourceIdentifier,
    #[serde(default)]
    pub enrichment_results: EnrichmentResults,
}

/// A prior remediation execution that failed, referenced by recovery attempts.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreviousExecution {
    pub execution_ref: String,
    #[serde(default)]
    pub workflow_id: Option<String>,
    #[serde(default)]
    pub failure_reason: Option<String>,
    #[serde(default)]
    pub failed_at: Option<DateTime<Utc>>,
}

/// The analysis request as created by an external actor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRequest {
    pub signal_context: SignalContext,
    #[serde(default)]
    pub is_recovery_attempt: bool,
    #[serde(default)]
    pub recovery_attempt_number: Option<u32>,
    #[serde(default)]
    pub previous_executions: Vec<PreviousExecution>,
}

/// Root cause analysis as reported by the investigation service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RootCauseAnalysis {
    pub summary: String,
    #[serde(default)]
    pub severity: Option<String>,
    #[serde(default)]
    pub contributing_factors: Vec<String>,
}

/// The single workflow eligible for execution.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SelectedWorkflow {
    pub workflow_id: String,
    pub container_image: String,
    pub confidence: f64,
    #[serde(default)]
    pub parameters: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub rationale: String,
}

/// A workflow the investigation considered but did not select.
///
/// Operator context only. Carries no parameters, so it can never be handed
/// to an executor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlternativeWorkflow {
    pub workflow_id: String,
    #[serde(default)]
    pub container_image: Option<String>,
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub rationale: String,
}

/// Outcome of a successful investigation call.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InvestigationResult {
    pub analysis: String,
    pub root_cause: String,
    #[serde(default)]
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    pub confidence: f64,
    pub selected_workflow: Option<SelectedWorkflow>,
    #[serde(default)]
    pub alternative_workflows: Vec<AlternativeWorkflow>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default)]
    pub target_in_owner_chain: bool,
    #[serde(default)]
    pub needs_human_review: bool,
    #[serde(default)]
    pub review_reason: Option<HumanReviewReason>,
    /// Wall-clock time of the successful call in milliseconds.
    #[serde(default)]
    pub duration_ms: u64,
}

/// Why a record ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FailureSubReason {
    ValidationError,
    ApiError,
    MaxRetriesExceeded,
    WorkflowNotFound,
    ImageMismatch,
    ParameterValidationFailed,
    NoMatchingWorkflows,
    LowConfidence,
    LlmParsingError,
    HumanReviewRequired,
    MissingInvestigation,
    NoWorkflowSelected,
    PolicyRejected,
}

impl fmt::Display for FailureSubReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Matches the serialized form.
        write!(f, "{:?}", self)
    }
}

/// Bucketed confidence shown to approvers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    High,
    Medium,
    Low,
}

impl ConfidenceLevel {
    pub fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::High
        } else if score >= 0.6 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

impl fmt::Display for ConfidenceLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::High => write!(f, "high"),
            Self::Medium => write!(f, "medium"),
            Self::Low => write!(f, "low"),
        }
    }
}

/// Context handed to a human approver. Written once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalContext {
    pub confidence_level: ConfidenceLevel,
    pub confidence_score: f64,
    /// Why approval is required, as stated by the policy.
    pub rationale: String,
    pub investigation_summary: String,
    pub recommended_workflow: Option<String>,
    pub policy_degraded: bool,
    pub created_at: DateTime<Utc>,
}

/// Externally observed status of an analysis record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisStatus {
    pub phase: Phase,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_reason: Option<FailureSubReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub root_cause_analysis: Option<RootCauseAnalysis>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub selected_workflow: Option<SelectedWorkflow>,
    #[serde(default)]
    pub alternative_workflows: Vec<AlternativeWorkflow>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_in_owner_chain: Option<bool>,
    #[serde(default)]
    pub approval_required: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approval_context: Option<ApprovalContext>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_outcome: Option<ApprovalOutcome>,
    #[serde(default)]
    pub policy_degraded: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_version: Option<String>,
    #[serde(default)]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub investigation_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub transitions: Vec<TransitionRecord>,
}

/// The reconciled unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisRecord {
    pub id: String,
    pub request: AnalysisRequest,
    /// Consecutive transient investigation failures.
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub investigation: Option<InvestigationResult>,
    #[serde(default)]
    pub status: AnalysisStatus,
    /// Bumped by the store on every successful update.
    #[serde(default)]
    pub resource_version: u64,
}

impl AnalysisRecord {
    /// Create a new record in `Pending`.
    pub fn new(id: impl Into<String>, request: AnalysisRequest) -> Self {
        Self {
            id: id.into(),
            request,
            retry_count: 0,
            investigation: None,
            status: AnalysisStatus::default(),
            resource_version: 0,
        }
    }

    pub fn phase(&self) -> Phase {
        self.status.phase
    }

    pub fn signal(&self) -> &SignalContext {
        &self.request.signal_context
    }

    /// The most recent failed execution referenced by a recovery attempt.
    pub fn latest_previous_execution(&self) -> Option<&PreviousExecution> {
        self.request.previous_executions.last()
    }
}
