//! Final phase: turn the investigation and policy decision into a
//! recommendation. No external calls happen here.

use chrono::Utc;
use tracing::info;

use super::{PhaseOutcome, PhaseResult};
use crate::policy::ApprovalOutcome;
use crate::types::{AnalysisRecord, ApprovalContext, ConfidenceLevel, FailureSubReason, Phase};

pub fn handle_recommending(mut record: AnalysisRecord) -> PhaseResult {
    let Some(workflow) = record
        .investigation
        .as_ref()
        .and_then(|i| i.selected_workflow.clone())
    else {
        record.fail(FailureSubReason::NoWorkflowSelected, "no workflow selected")?;
        return Ok(PhaseOutcome::next(record));
    };

    let outcome = record
        .status
        .policy_outcome
        .unwrap_or(ApprovalOutcome::ManualApproval);

    if outcome == ApprovalOutcome::Reject {
        let reason = record
            .status
            .approval_reason
            .clone()
            .unwrap_or_else(|| "rejected by policy".to_string());
        record.fail(
            FailureSubReason::PolicyRejected,
            format!("Recommendation rejected by policy: {reason}"),
        )?;
        return Ok(PhaseOutcome::next(record));
    }

    if outcome == ApprovalOutcome::ManualApproval {
        record.status.approval_required = true;
        if record.status.approval_context.is_none() {
            let confidence = record.status.confidence.unwrap_or(workflow.confidence);
            record.status.approval_context = Some(ApprovalContext {
                confidence_level: ConfidenceLevel::from_score(confidence),
                confidence_score: confidence,
                rationale: record
                    .status
                    .approval_reason
                    .clone()
                    .unwrap_or_else(|| "Manual approval required by policy".to_string()),
                investigation_summary: record.status.root_cause.clone().unwrap_or_default(),
                recommended_workflow: Some(workflow.workflow_id.clone()),
                policy_degraded: record.status.policy_degraded,
                created_at: Utc::now(),
            });
        }
    }

    record.status.selected_workflow = Some(workflow);
    record.status.completed_at = Some(Utc::now());
    record.status.message = Some(if record.status.approval_required {
        "Analysis complete; awaiting approval".to_string()
    } else {
        "Analysis complete; workflow approved for execution".to_string()
    });

    info!(
        record = %record.id,
        approval_required = record.status.approval_required,
        "Recommendation ready"
    );
    record.advance(Phase::Completed, Some("recommendation ready"))?;
    Ok(PhaseOutcome::next(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{InvestigationResult, SelectedWorkflow};

    fn recommending(outcome: Option<ApprovalOutcome>, confidence: f64) -> AnalysisRecord {
        let mut record = AnalysisRecord::new("rec", Default::default());
        record.status.phase = Phase::Recommending;
        record.status.policy_outcome = outcome;
        record.status.confidence = Some(confidence);
        record.status.root_cause = Some("OOM".into());
        record.status.approval_required = outcome == Some(ApprovalOutcome::ManualApproval);
        record.investigation = Some(InvestigationResult {
            confidence,
            selected_workflow: Some(SelectedWorkflow {
                workflow_id: "bump-memory".into(),
                container_image: "img:2".into(),
                confidence,
                ..Default::default()
            }),
            ..Default::default()
        });
        record
    }

    #[test]
    fn test_auto_approve_completes_without_context() {
        let out = handle_recommending(recommending(Some(ApprovalOutcome::AutoApprove), 0.9)).unwrap();
        let status = &out.record.status;
        assert_eq!(out.record.phase(), Phase::Completed);
        assert!(!status.approval_required);
        assert!(status.approval_context.is_none());
        assert!(status.completed_at.is_some());
        assert!(status.selected_workflow.is_some());
    }

    #[test]
    fn test_manual_approval_populates_context() {
        let mut record = recommending(Some(ApprovalOutcome::ManualApproval), 0.85);
        record.status.approval_reason = Some("Production environment requires manual approval".into());
        let out = handle_recommending(record).unwrap();
        let ctx = out.record.status.approval_context.unwrap();
        assert_eq!(ctx.confidence_level, ConfidenceLevel::High);
        assert_eq!(ctx.recommended_workflow.as_deref(), Some("bump-memory"));
        assert_eq!(ctx.investigation_summary, "OOM");
        assert!(ctx.rationale.contains("Production"));
    }

    #[test]
    fn test_existing_context_is_not_overwritten() {
        let mut record = recommending(Some(ApprovalOutcome::ManualApproval), 0.5);
        let original = ApprovalContext {
            confidence_level: ConfidenceLevel::High,
            confidence_score: 0.99,
            rationale: "first".into(),
            investigation_summary: String::new(),
            recommended_workflow: None,
            policy_degraded: false,
            created_at: Utc::now(),
        };
        record.status.approval_context = Some(original.clone());
        let out = handle_recommending(record).unwrap();
        assert_eq!(out.record.status.approval_context, Some(original));
    }

    #[test]
    fn test_missing_outcome_is_treated_as_manual() {
        let out = handle_recommending(recommending(None, 0.7)).unwrap();
        assert!(out.record.status.approval_required);
        assert_eq!(
            out.record.status.approval_context.unwrap().confidence_level,
            ConfidenceLevel::Medium
        );
    }

    #[test]
    fn test_reject_fails() {
        let out = handle_recommending(recommending(Some(ApprovalOutcome::Reject), 0.9)).unwrap();
        assert_eq!(out.record.phase(), Phase::Failed);
        assert_eq!(out.record.status.sub_reason, Some(FailureSubReason::PolicyRejected));
    }

    #[test]
    fn test_no_selected_workflow_fails() {
        let mut record = recommending(Some(ApprovalOutcome::AutoApprove), 0.9);
        if let Some(i) = record.investigation.as_mut() {
            i.selected_workflow = None;
        }
        let out = handle_recommending(record).unwrap();
        assert_eq!(out.record.phase(), Phase::Failed);
        assert_eq!(out.record.status.message.as_deref(), Some("no workflow selected"));
        assert_eq!(
            out.record.status.sub_reason,
            Some(FailureSubReason::NoWorkflowSelected)
        );
    }
}
