//! Investigation phase.

use tracing::{info, warn};

use super::{PhaseOutcome, PhaseResult};
use crate::investigation::{InvestigationAttempt, InvestigationClient, InvestigationError};
use crate::types::{AnalysisRecord, FailureSubReason, InvestigationResult, Phase};

/// Run one investigation attempt and apply its outcome to the record.
pub async fn handle_investigating(
    client: &InvestigationClient,
    mut record: AnalysisRecord,
) -> PhaseResult {
    match client.investigate(&record).await {
        InvestigationAttempt::RetryAfter {
            retry_count,
            delay,
            error,
        } => {
            record.retry_count = retry_count;
            record.status.message = Some(format!(
                "Investigation retry {retry_count}/{} scheduled: {error}",
                client.max_retries()
            ));
            Ok(PhaseOutcome::retry_after(record, delay))
        }
        InvestigationAttempt::Failed { retry_count, error } => {
            record.retry_count = retry_count;
            let sub_reason = match error {
                InvestigationError::MaxRetriesExceeded { .. } => {
                    FailureSubReason::MaxRetriesExceeded
                }
                _ => FailureSubReason::ApiError,
            };
            record.fail(sub_reason, format!("Investigation failed: {error}"))?;
            Ok(PhaseOutcome::next(record))
        }
        InvestigationAttempt::Succeeded(result) if result.needs_human_review => {
            let reason = result.review_reason;
            let message = match reason {
                Some(reason) => format!("Investigation requires human review: {reason}"),
                None => "Investigation requires human review".to_string(),
            };
            warn!(
                record = %record.id,
                reason = reason.map(|r| r.to_string()).unwrap_or_default(),
                "Investigation flagged for human review"
            );
            // The call itself succeeded; only permanent errors keep the counter.
            record.retry_count = 0;
            apply_partial(&mut record, &result);
            record.investigation = Some(result);
            record.fail(
                reason.map_or(FailureSubReason::HumanReviewRequired, |r| r.sub_reason()),
                message,
            )?;
            Ok(PhaseOutcome::next(record))
        }
        InvestigationAttempt::Succeeded(result) => {
            apply_partial(&mut record, &result);
            record.status.selected_workflow = result.selected_workflow.clone();
            record.status.investigation_time_ms = Some(result.duration_ms);
            info!(
                record = %record.id,
                confidence = result.confidence,
                workflow = result
                    .selected_workflow
                    .as_ref()
                    .map(|w| w.workflow_id.as_str())
                    .unwrap_or("none"),
                "Investigation complete"
            );
            record.investigation = Some(result);
            record.advance(Phase::Analyzing, Some("investigation complete"))?;
            Ok(PhaseOutcome::next(record))
        }
    }
}

/// Copy the informational parts of a result onto the status.
///
/// Leaves `status.selected_workflow` unset: a record flagged for human review
/// never exposes an executable workflow. The workflow the service proposed,
/// if any, stays available to operators in `record.investigation`.
fn apply_partial(record: &mut AnalysisRecord, result: &InvestigationResult) {
    let status = &mut record.status;
    status.root_cause = Some(result.root_cause.clone());
    status.root_cause_analysis = result.root_cause_analysis.clone();
    status.confidence = Some(result.confidence);
    status.alternative_workflows = result.alternative_workflows.clone();
    status.target_in_owner_chain = Some(result.target_in_owner_chain);
    status.warnings = result.warnings.clone();
}
