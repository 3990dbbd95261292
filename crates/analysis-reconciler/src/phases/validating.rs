//! Input validation.
//!
//! Validation failures are permanent: the request itself is wrong, so the
//! record goes straight to `Failed` with every problem listed in `message`.

use tracing::{info, warn};

use super::{PhaseOutcome, PhaseResult};
use crate::types::{AnalysisRecord, AnalysisRequest, FailureSubReason, Phase};

/// Detection names the enrichment step may report as failed.
pub const KNOWN_FAILED_DETECTIONS: &[&str] = &[
    "gitOpsManaged",
    "pdbProtected",
    "hpaEnabled",
    "stateful",
    "helmManaged",
    "networkIsolated",
    "serviceMesh",
];

/// Check a request, returning every problem found.
pub fn validate_request(request: &AnalysisRequest) -> Vec<String> {
    let mut problems = Vec::new();
    let signal = &request.signal_context;

    for (field, value) in [
        ("signalContext.fingerprint", &signal.fingerprint),
        ("signalContext.signalType", &signal.signal_type),
        ("signalContext.environment", &signal.environment),
        ("signalContext.businessPriority", &signal.business_priority),
        ("signalContext.targetResource.kind", &signal.target_resource.kind),
        ("signalContext.targetResource.name", &signal.target_resource.name),
    ] {
        if value.trim().is_empty() {
            problems.push(format!("{field} is required"));
        }
    }

    for name in &signal.enrichment_results.failed_detections {
        if !KNOWN_FAILED_DETECTIONS.contains(&name.as_str()) {
            problems.push(format!("unknown failed detection '{name}'"));
        }
    }

    if request.is_recovery_attempt {
        match request.recovery_attempt_number {
            Some(n) if n >= 1 => {}
            Some(n) => problems.push(format!("recoveryAttemptNumber must be >= 1, got {n}")),
            None => problems.push("recoveryAttemptNumber is required for recovery attempts".into()),
        }
        if request.previous_executions.is_empty() {
            problems.push("previousExecutions must not be empty for recovery attempts".into());
        }
    }

    problems
}

pub fn handle_validating(mut record: AnalysisRecord) -> PhaseResult {
    let problems = validate_request(&record.request);

    if !problems.is_empty() {
        let message = format!("Validation failed: {}", problems.join("; "));
        warn!(record = %record.id, problems = problems.len(), "{message}");
        record.fail(FailureSubReason::ValidationError, message)?;
        return Ok(PhaseOutcome::next(record));
    }

    info!(
        record = %record.id,
        signal_type = %record.signal().signal_type,
        environment = %record.signal().environment,
        recovery = record.request.is_recovery_attempt,
        "Request validated"
    );
    record.advance(Phase::Investigating, Some("request validated"))?;
    Ok(PhaseOutcome::next(record))
}
