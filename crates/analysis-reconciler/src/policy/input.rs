//! Projection of a record onto the policy input.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{AnalysisRecord, InvestigationResult, ResourceIdentifier};

/// The part of the selected workflow a policy may reason about.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    pub workflow_id: String,
    pub container_image: String,
    pub confidence: f64,
}

/// Structured input handed to a policy engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyInput {
    pub environment: String,
    pub business_priority: String,
    pub signal_type: String,
    pub confidence: f64,
    pub target_resource: ResourceIdentifier,
    /// Detected facts, minus any whose detection failed.
    pub detected_labels: BTreeMap<String, serde_json::Value>,
    pub failed_detections: Vec<String>,
    pub custom_labels: BTreeMap<String, Vec<String>>,
    pub is_recovery_attempt: bool,
    pub recovery_attempt_number: u32,
    pub target_in_owner_chain: bool,
    pub selected_workflow: Option<WorkflowSummary>,
    pub warnings: Vec<String>,
}

impl PolicyInput {
    /// Build the input from a record and its stored investigation result.
    pub fn from_record(record: &AnalysisRecord, investigation: &InvestigationResult) -> Self {
        let signal = record.signal();
        let enrichment = &signal.enrichment_results;

        // A failed detection must not be trusted even if a stale value exists.
        let detected_labels = enrichment
            .detected_labels
            .iter()
            .filter(|(name, _)| !enrichment.failed_detections.contains(name))
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();

        Self {
            environment: signal.environment.clone(),
            business_priority: signal.business_priority.clone(),
            signal_type: signal.signal_type.clone(),
            confidence: investigation.confidence,
            target_resource: signal.target_resource.clone(),
            detected_labels,
            failed_detections: enrichment.failed_detections.clone(),
            custom_labels: enrichment.custom_labels.clone(),
            is_recovery_attempt: record.request.is_recovery_attempt,
            recovery_attempt_number: if record.request.is_recovery_attempt {
                record.request.recovery_attempt_number.unwrap_or(1)
            } else {
                0
            },
            target_in_owner_chain: investigation.target_in_owner_chain,
            selected_workflow: investigation
                .selected_workflow
                .as_ref()
                .map(|wf| WorkflowSummary {
                    workflow_id: wf.workflow_id.clone(),
                    container_image: wf.container_image.clone(),
                    confidence: wf.confidence,
                }),
            warnings: investigation.warnings.clone(),
        }
    }
}
