//! Phase state machine: legal transition guards and the transition log.
//!
//! Every phase change on an [`AnalysisRecord`] goes through
//! [`AnalysisRecord::advance`] so that:
//! 1. Backward or skipping transitions are rejected.
//! 2. Every transition is recorded on the status for audit and replay.
//! 3. The retry counter is reset whenever the record makes forward progress.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{AnalysisRecord, FailureSubReason, Phase};

/// Legal transitions between phases.
///
/// ```text
/// Pending → Validating
/// Validating → Investigating
/// Investigating → Analyzing
/// Analyzing → Recommending
/// Recommending → Completed
/// any non-terminal → Failed
/// ```
pub fn is_legal_transition(from: Phase, to: Phase) -> bool {
    use Phase::*;

    if to == Failed && !from.is_terminal() {
        return true;
    }

    matches!(
        (from, to),
        (Pending, Validating)
            | (Validating, Investigating)
            | (Investigating, Analyzing)
            | (Analyzing, Recommending)
            | (Recommending, Completed)
    )
}

/// A single recorded phase transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransitionRecord {
    pub from: Phase,
    pub to: Phase,
    pub at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Error returned when an illegal transition is attempted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IllegalTransition {
    pub from: Phase,
    pub to: Phase,
}

impl fmt::Display for IllegalTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Illegal phase transition: {} → {}", self.from, self.to)
    }
}

impl std::error::Error for IllegalTransition {}

impl AnalysisRecord {
    /// Move the record to `to`, recording the transition.
    ///
    /// Forward progress resets `retry_count`; a transition to `Failed` keeps
    /// it so the terminal status shows how many attempts were spent.
    pub fn advance(&mut self, to: Phase, reason: Option<&str>) -> Result<(), IllegalTransition> {
        let from = self.status.phase;
        if !is_legal_transition(from, to) {
            return Err(IllegalTransition { from, to });
        }

        tracing::debug!(record = %self.id, from = %from, to = %to, "Phase transition");

        self.status.transitions.push(TransitionRecord {
            from,
            to,
            at: Utc::now(),
            reason: reason.map(String::from),
        });
        self.status.phase = to;
        if to != Phase::Failed {
            self.retry_count = 0;
        }
        Ok(())
    }

    /// Terminate the record with a failure sub-reason and message.
    pub fn fail(
        &mut self,
        sub_reason: FailureSubReason,
        message: impl Into<String>,
    ) -> Result<(), IllegalTransition> {
        let message = message.into();
        self.advance(Phase::Failed, Some(&message))?;
        self.status.sub_reason = Some(sub_reason);
        self.status.message = Some(message);
        self.status.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Summary of the phase history, e.g. `Pending → Completed [Validating → ...]`.
    pub fn transition_summary(&self) -> String {
        let states: Vec<String> = self
            .status
            .transitions
            .iter()
            .map(|t| t.to.to_string())
            .collect();
        let mut summary = format!(
            "{} → {} ({} transitions)",
            Phase::Pending,
            self.status.phase,
            self.status.transitions.len()
        );
        if !states.is_empty() {
            summary.push_str(&format!(" [{}]", states.join(" → ")));
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AnalysisRequest;

    fn record_in(phase: Phase) -> AnalysisRecord {
        let mut record = AnalysisRecord::new("rec-1", AnalysisRequest::default());
        record.status.phase = phase;
        record
    }

    #[test]
    fn test_happy_path_transitions() {
        let mut record = record_in(Phase::Pending);
        record.advance(Phase::Validating, None).unwrap();
        record.advance(Phase::Investigating, None).unwrap();
        record.advance(Phase::Analyzing, Some("investigation complete")).unwrap();
        record.advance(Phase::Recommending, None).unwrap();
        record.advance(Phase::Completed, None).unwrap();

        assert!(record.phase().is_terminal());
        assert_eq!(record.status.transitions.len(), 5);
    }

    #[test]
    fn test_failure_from_any_non_terminal_phase() {
        for phase in [
            Phase::Pending,
            Phase::Validating,
            Phase::Investigating,
            Phase::Analyzing,
            Phase::Recommending,
        ] {
            let mut record = record_in(phase);
            record
                .fail(FailureSubReason::ValidationError, "test failure")
                .unwrap();
            assert_eq!(record.phase(), Phase::Failed);
            assert_eq!(record.status.message.as_deref(), Some("test failure"));
            assert!(record.status.completed_at.is_some());
        }
    }

    #[test]
    fn test_cannot_transition_from_terminal() {
        let mut record = record_in(Phase::Completed);
        let err = record.advance(Phase::Failed, None).unwrap_err();
        assert_eq!(err.from, Phase::Completed);
        assert_eq!(err.to, Phase::Failed);

        let mut record = record_in(Phase::Failed);
        assert!(record.fail(FailureSubReason::ApiError, "again").is_err());
    }

    #[test]
    fn test_illegal_skip_and_backward_transitions() {
        let mut record = record_in(Phase::Validating);
        assert!(record.advance(Phase::Analyzing, None).is_err());

        let mut record = record_in(Phase::Analyzing);
        assert!(record.advance(Phase::Investigating, None).is_err());
        assert!(record.advance(Phase::Analyzing, None).is_err());
    }

    #[test]
    fn test_forward_progress_resets_retry_count() {
        let mut record = record_in(Phase::Investigating);
        record.retry_count = 2;
        record.advance(Phase::Analyzing, None).unwrap();
        assert_eq!(record.retry_count, 0);
    }

    #[test]
    fn test_failure_keeps_retry_count() {
        let mut record = record_in(Phase::Investigating);
        record.retry_count = 3;
        record
            .fail(FailureSubReason::ApiError, "Investigation failed")
            .unwrap();
        assert_eq!(record.retry_count, 3);
    }

    #[test]
    fn test_transition_record_has_reason() {
        let mut record = record_in(Phase::Pending);
        record.advance(Phase::Validating, Some("accepted")).unwrap();
        let t = &record.status.transitions[0];
        assert_eq!(t.from, Phase::Pending);
        assert_eq!(t.to, Phase::Validating);
        assert_eq!(t.reason.as_deref(), Some("accepted"));
    }

    #[test]
    fn test_summary() {
        let mut record = record_in(Phase::Pending);
        record.advance(Phase::Validating, None).unwrap();
        record
            .fail(FailureSubReason::ValidationError, "bad input")
            .unwrap();
        let summary = record.transition_summary();
        assert!(summary.contains("Failed"));
        assert!(summary.contains("2 transitions"));
    }
}
