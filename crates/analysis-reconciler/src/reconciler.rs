//! The reconciler: one phase step per trigger.
//!
//! ```text
//! reconcile(id)
//!   ├─ store.get(id)            missing  → Done
//!   ├─ terminal phase?          yes      → Done (no calls, no write)
//!   ├─ dispatch(phase)          exactly one handler
//!   ├─ store.update(record)     vanished → Done, stale → Requeue
//!   ├─ audit (diff before/after)
//!   └─ action: terminal → Done, backoff → RequeueAfter, phase changed → Requeue
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::audit::{AuditEvent, SharedAuditSink, TracingAuditSink};
use crate::config::{ConfigError, ReconcilerConfig};
use crate::investigation::{HttpInvestigationTransport, InvestigationClient};
use crate::phases::{self, PhaseOutcome, PhaseResult};
use crate::policy::PolicyEvaluator;
use crate::state_machine::IllegalTransition;
use crate::store::{SharedRecordStore, StoreError};
use crate::types::{AnalysisRecord, Phase};

/// What the scheduler should do with the record after a reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileAction {
    /// Nothing further until an external change triggers it.
    Done,
    /// Run again immediately.
    Requeue,
    /// Run again no earlier than this from now.
    RequeueAfter(Duration),
}

/// Error type for reconcile operations
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("record store error: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    IllegalTransition(#[from] IllegalTransition),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("failed to build investigation transport: {0}")]
    Transport(#[from] reqwest::Error),
}

/// Result type for reconcile operations
pub type ReconcileResult<T> = Result<T, ReconcileError>;

pub struct Reconciler {
    store: SharedRecordStore,
    client: InvestigationClient,
    evaluator: PolicyEvaluator,
    audit: SharedAuditSink,
}

impl Reconciler {
    pub fn new(
        store: SharedRecordStore,
        client: InvestigationClient,
        evaluator: PolicyEvaluator,
    ) -> Self {
        Self {
            store,
            client,
            evaluator,
            audit: Arc::new(TracingAuditSink),
        }
    }

    pub fn with_audit_sink(mut self, audit: SharedAuditSink) -> Self {
        self.audit = audit;
        self
    }

    /// Build a reconciler talking HTTP to the configured investigation service.
    pub fn from_config(config: &ReconcilerConfig, store: SharedRecordStore) -> ReconcileResult<Self> {
        config.validate()?;

        let transport =
            HttpInvestigationTransport::new(&config.investigation_url, config.request_timeout())?;
        let client = InvestigationClient::new(Arc::new(transport))
            .with_backoff(config.backoff())
            .with_max_retries(config.max_retries);
        let evaluator = PolicyEvaluator::from_source(config.policy_source())
            .with_default_version(config.policy_version.clone());

        info!(
            investigation_url = %config.investigation_url,
            max_retries = config.max_retries,
            policy = config
                .policy_path
                .as_ref()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "builtin".into()),
            "Reconciler configured"
        );
        Ok(Self::new(store, client, evaluator))
    }

    pub fn store(&self) -> &SharedRecordStore {
        &self.store
    }

    /// Reconcile the record `id` by exactly one phase step.
    pub async fn reconcile(&self, id: &str) -> ReconcileResult<ReconcileAction> {
        let span = info_span!("reconcile", record = %id);
        self.reconcile_inner(id).instrument(span).await
    }

    async fn reconcile_inner(&self, id: &str) -> ReconcileResult<ReconcileAction> {
        let Some(record) = self.store.get(id).await? else {
            debug!("Record not found, nothing to do");
            return Ok(ReconcileAction::Done);
        };

        if record.phase().is_terminal() {
            debug!(phase = %record.phase(), "Record is terminal, skipping");
            return Ok(ReconcileAction::Done);
        }

        let before = record.clone();
        let PhaseOutcome {
            record,
            requeue_after,
        } = self.dispatch(record).await?;

        let record = match self.store.update(record).await {
            Ok(record) => record,
            Err(StoreError::NotFound(_)) => {
                info!("Record deleted during reconcile, dropping result");
                return Ok(ReconcileAction::Done);
            }
            Err(e @ StoreError::Conflict { .. }) => {
                warn!(error = %e, "Record changed during reconcile, requeueing");
                return Ok(ReconcileAction::Requeue);
            }
            Err(e) => return Err(e.into()),
        };

        self.emit_audit(&before, &record);

        let action = if record.phase().is_terminal() {
            info!(
                phase = %record.phase(),
                history = %record.transition_summary(),
                "Reconciliation finished"
            );
            ReconcileAction::Done
        } else if let Some(delay) = requeue_after {
            ReconcileAction::RequeueAfter(delay)
        } else if record.phase() != before.phase() {
            ReconcileAction::Requeue
        } else {
            ReconcileAction::Done
        };
        debug!(phase = %record.phase(), ?action, "Reconcile step done");
        Ok(action)
    }

    /// Run the handler for the record's current phase.
    async fn dispatch(&self, record: AnalysisRecord) -> PhaseResult {
        match record.phase() {
            Phase::Pending => phases::handle_pending(record),
            Phase::Validating => phases::handle_validating(record),
            Phase::Investigating => phases::handle_investigating(&self.client, record).await,
            Phase::Analyzing => phases::handle_analyzing(&self.evaluator, record),
            Phase::Recommending => phases::handle_recommending(record),
            Phase::Completed | Phase::Failed => Ok(PhaseOutcome::next(record)),
        }
    }

    fn emit_audit(&self, before: &AnalysisRecord, after: &AnalysisRecord) {
        let id = &after.id;
        let now = Utc::now();

        for t in after
            .status
            .transitions
            .iter()
            .skip(before.status.transitions.len())
        {
            self.audit.emit(AuditEvent::PhaseTransition {
                record: id.clone(),
                from: t.from,
                to: t.to,
                timestamp: t.at,
            });
        }

        if before.phase() == Phase::Investigating {
            match &after.investigation {
                Some(result) if before.investigation.is_none() => {
                    self.audit.emit(AuditEvent::InvestigationCompleted {
                        record: id.clone(),
                        confidence: result.confidence,
                        workflow_id: result
                            .selected_workflow
                            .as_ref()
                            .map(|w| w.workflow_id.clone()),
                        needs_human_review: result.needs_human_review,
                        duration_ms: result.duration_ms,
                        timestamp: now,
                    })
                }
                None => self.audit.emit(AuditEvent::InvestigationFailed {
                    record: id.clone(),
                    retry_count: after.retry_count,
                    error: after.status.message.clone().unwrap_or_default(),
                    timestamp: now,
                }),
                Some(_) => {}
            }
        }

        if let (None, Some(outcome)) = (before.status.policy_outcome, after.status.policy_outcome)
        {
            self.audit.emit(AuditEvent::PolicyEvaluated {
                record: id.clone(),
                outcome,
                degraded: after.status.policy_degraded,
                policy_version: after.status.policy_version.clone(),
                timestamp: now,
            });
        }

        if before.phase() != after.phase() {
            match after.phase() {
                Phase::Completed => self.audit.emit(AuditEvent::AnalysisCompleted {
                    record: id.clone(),
                    approval_required: after.status.approval_required,
                    workflow_id: after
                        .status
                        .selected_workflow
                        .as_ref()
                        .map(|w| w.workflow_id.clone()),
                    timestamp: now,
                }),
                Phase::Failed => self.audit.emit(AuditEvent::AnalysisFailed {
                    record: id.clone(),
                    sub_reason: after.status.sub_reason,
                    message: after.status.message.clone().unwrap_or_default(),
                    timestamp: now,
                }),
                _ => {}
            }
        }
    }
}
