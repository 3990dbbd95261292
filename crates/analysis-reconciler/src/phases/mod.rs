//! Phase handlers.
//!
//! Each handler takes the record by value, performs at most one unit of
//! work for its phase, and hands the record back with an optional delayed
//! requeue. Handlers never persist; the reconciler does.

pub mod analyzing;
pub mod investigating;
pub mod recommending;
pub mod validating;

use std::time::Duration;

use chrono::Utc;

use crate::state_machine::IllegalTransition;
use crate::types::{AnalysisRecord, Phase};

pub use analyzing::handle_analyzing;
pub use investigating::handle_investigating;
pub use recommending::handle_recommending;
pub use validating::{handle_validating, validate_request, KNOWN_FAILED_DETECTIONS};

/// What a handler produced.
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseOutcome {
    pub record: AnalysisRecord,
    /// Re-invoke no earlier than this from now. Only set while backing off.
    pub requeue_after: Option<Duration>,
}

impl PhaseOutcome {
    pub fn next(record: AnalysisRecord) -> Self {
        Self {
            record,
            requeue_after: None,
        }
    }

    pub fn retry_after(record: AnalysisRecord, delay: Duration) -> Self {
        Self {
            record,
            requeue_after: Some(delay),
        }
    }
}

pub type PhaseResult = Result<PhaseOutcome, IllegalTransition>;

/// Initialize a fresh record and move it to `Validating`.
pub fn handle_pending(mut record: AnalysisRecord) -> PhaseResult {
    if record.status.started_at.is_none() {
        record.status.started_at = Some(Utc::now());
    }
    record.advance(Phase::Validating, Some("analysis accepted"))?;
    Ok(PhaseOutcome::next(record))
}
