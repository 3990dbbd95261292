//! Audit events.
//!
//! Emit-and-forget: a sink never fails the reconcile that produced the event.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::policy::ApprovalOutcome;
use crate::types::{FailureSubReason, Phase};

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Everything the reconciler reports about a record's lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    PhaseTransition {
        record: String,
        from: Phase,
        to: Phase,
        timestamp: DateTime<Utc>,
    },

    InvestigationCompleted {
        record: String,
        confidence: f64,
        workflow_id: Option<String>,
        needs_human_review: bool,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },

    InvestigationFailed {
        record: String,
        retry_count: u32,
        error: String,
        timestamp: DateTime<Utc>,
    },

    PolicyEvaluated {
        record: String,
        outcome: ApprovalOutcome,
        degraded: bool,
        policy_version: Option<String>,
        timestamp: DateTime<Utc>,
    },

    AnalysisCompleted {
        record: String,
        approval_required: bool,
        workflow_id: Option<String>,
        timestamp: DateTime<Utc>,
    },

    AnalysisFailed {
        record: String,
        sub_reason: Option<FailureSubReason>,
        message: String,
        timestamp: DateTime<Utc>,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PhaseTransition { .. } => "phase_transition",
            Self::InvestigationCompleted { .. } => "investigation_completed",
            Self::InvestigationFailed { .. } => "investigation_failed",
            Self::PolicyEvaluated { .. } => "policy_evaluated",
            Self::AnalysisCompleted { .. } => "analysis_completed",
            Self::AnalysisFailed { .. } => "analysis_failed",
        }
    }

    pub fn record(&self) -> &str {
        match self {
            Self::PhaseTransition { record, .. }
            | Self::InvestigationCompleted { record, .. }
            | Self::InvestigationFailed { record, .. }
            | Self::PolicyEvaluated { record, .. }
            | Self::AnalysisCompleted { record, .. }
            | Self::AnalysisFailed { record, .. } => record,
        }
    }
}

/// Destination for audit events.
pub trait AuditSink: Send + Sync {
    fn emit(&self, event: AuditEvent);
}

pub type SharedAuditSink = Arc<dyn AuditSink>;

/// Writes events to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        match &event {
            AuditEvent::AnalysisFailed {
                record, message, ..
            } => warn!(target: "audit", event_type, record = %record, message = %message, "Audit event"),
            AuditEvent::PolicyEvaluated {
                record, degraded: true, ..
            } => warn!(target: "audit", event_type, record = %record, degraded = true, "Audit event"),
            _ => match serde_json::to_string(&event) {
                Ok(json) => info!(target: "audit", event_type, record = %event.record(), event = %json, "Audit event"),
                Err(e) => warn!(target: "audit", event_type, error = %e, "Failed to serialize audit event"),
            },
        }
    }
}

/// Fans events out to in-process subscribers.
pub struct BroadcastAuditSink {
    sender: broadcast::Sender<AuditEvent>,
}

impl BroadcastAuditSink {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuditEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for BroadcastAuditSink {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditSink for BroadcastAuditSink {
    fn emit(&self, event: AuditEvent) {
        let event_type = event.event_type();
        // No receivers is fine.
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Audit event published"),
            Err(_) => debug!(event_type, "Audit event published (no receivers)"),
        }
    }
}
