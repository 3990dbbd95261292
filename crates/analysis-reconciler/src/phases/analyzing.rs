//! Policy evaluation phase.

use tracing::info;

use super::{PhaseOutcome, PhaseResult};
use crate::policy::{PolicyEvaluator, PolicyInput};
use crate::types::{AnalysisRecord, FailureSubReason, Phase};

/// Evaluate the approval policy against the stored investigation.
///
/// Policy failures never fail the record; the evaluator has already turned
/// them into a degraded `manual_approval`.
pub fn handle_analyzing(evaluator: &PolicyEvaluator, mut record: AnalysisRecord) -> PhaseResult {
    let Some(investigation) = record.investigation.as_ref() else {
        record.fail(
            FailureSubReason::MissingInvestigation,
            "No investigation result available for analysis",
        )?;
        return Ok(PhaseOutcome::next(record));
    };

    let input = PolicyInput::from_record(&record, investigation);
    let decision = evaluator.evaluate(&input);

    info!(
        record = %record.id,
        outcome = %decision.outcome,
        degraded = decision.degraded,
        "Approval policy evaluated"
    );

    let status = &mut record.status;
    status.approval_required = decision.requires_approval();
    status.approval_reason = Some(decision.reason.clone()).filter(|r| !r.is_empty());
    status.policy_outcome = Some(decision.outcome);
    status.policy_degraded = decision.degraded;
    status.policy_version = decision.policy_version;

    record.advance(Phase::Recommending, Some("policy evaluated"))?;
    Ok(PhaseOutcome::next(record))
}
