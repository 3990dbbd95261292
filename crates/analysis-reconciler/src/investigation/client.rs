//! Retry discipline around the investigation transport.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{info, warn};

use super::error::{ErrorClass, InvestigationError};
use super::transport::InvestigationTransport;
use super::wire::InvestigationRequest;
use crate::backoff::BackoffPolicy;
use crate::types::{AnalysisRecord, InvestigationResult};

/// Default number of retries after the first attempt.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Outcome of a single investigation attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum InvestigationAttempt {
    /// The call succeeded; the caller resets its retry counter.
    Succeeded(InvestigationResult),
    /// Transient failure with retry budget left. The caller stores
    /// `retry_count` and re-invokes no earlier than `delay` from now.
    RetryAfter {
        retry_count: u32,
        delay: Duration,
        error: InvestigationError,
    },
    /// Terminal failure. `retry_count` is the counter to persist.
    Failed {
        retry_count: u32,
        error: InvestigationError,
    },
}

/// Investigation client: one transport call per attempt, classified and
/// turned into a scheduling decision.
#[derive(Clone)]
pub struct InvestigationClient {
    transport: Arc<dyn InvestigationTransport>,
    backoff: BackoffPolicy,
    max_retries: u32,
}

impl InvestigationClient {
    pub fn new(transport: Arc<dyn InvestigationTransport>) -> Self {
        Self {
            transport,
            backoff: BackoffPolicy::default(),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Run one attempt for `record`.
    ///
    /// Never sleeps: a transient failure is returned as
    /// [`InvestigationAttempt::RetryAfter`] for the caller to schedule.
    pub async fn investigate(&self, record: &AnalysisRecord) -> InvestigationAttempt {
        let request = InvestigationRequest::from_record(record);
        let started = Instant::now();

        match self.transport.send(&request).await {
            Ok(response) => {
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(
                    record = %record.id,
                    duration_ms = elapsed_ms,
                    confidence = response.confidence,
                    needs_human_review = response.needs_human_review,
                    "Investigation succeeded"
                );
                InvestigationAttempt::Succeeded(response.into_result(elapsed_ms))
            }
            Err(error) => self.on_error(record, error),
        }
    }

    fn on_error(&self, record: &AnalysisRecord, error: InvestigationError) -> InvestigationAttempt {
        match error.class() {
            ErrorClass::Permanent => {
                warn!(record = %record.id, error = %error, "Permanent investigation error");
                InvestigationAttempt::Failed {
                    retry_count: record.retry_count,
                    error,
                }
            }
            ErrorClass::Transient => {
                let attempt = record.retry_count;
                let retry_count = attempt.saturating_add(1);
                if retry_count > self.max_retries {
                    warn!(
                        record = %record.id,
                        retry_count,
                        max_retries = self.max_retries,
                        error = %error,
                        "Transient investigation error — retry budget exhausted"
                    );
                    return InvestigationAttempt::Failed {
                        retry_count,
                        error: InvestigationError::MaxRetriesExceeded {
                            attempts: retry_count,
                            last_error: error.to_string(),
                        },
                    };
                }

                let delay = self.backoff.compute_delay(attempt);
                warn!(
                    record = %record.id,
                    retry_count,
                    max_retries = self.max_retries,
                    backoff_ms = delay.as_millis() as u64,
                    error = %error,
                    "Transient investigation error — retrying"
                );
                InvestigationAttempt::RetryAfter {
                    retry_count,
                    delay,
                    error,
                }
            }
        }
    }
}
