//! Analysis Reconciler
//!
//! A level-triggered reconciliation engine that turns an incident analysis
//! request into a validated, investigated, policy-gated remediation
//! recommendation.
//!
//! ```text
//! Pending ─► Validating ─► Investigating ─► Analyzing ─► Recommending ─► Completed
//!    │            │              │  ▲             │              │
//!    └────────────┴──────────────┴──┼─────────────┴──────────────┴────► Failed
//!                                   └── transient error: same phase after backoff
//! ```
//!
//! # Components
//!
//! - [`backoff`]: exponential delay with ceiling and jitter
//! - [`investigation`]: investigation service client with transient/permanent
//!   error taxonomy and bounded retries
//! - [`policy`]: approval policy evaluation that degrades to manual approval
//! - [`phases`]: one handler per phase
//! - [`reconciler`]: load, dispatch, persist, audit
//! - [`queue`] and [`controller`]: deduplicating work queue and worker pool
//!
//! # Usage
//!
//! ```no_run
//! use std::sync::Arc;
//! use analysis_reconciler::{Controller, InMemoryRecordStore, Reconciler, ReconcilerConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> anyhow::Result<()> {
//! analysis_reconciler::telemetry::init_tracing();
//! let config = ReconcilerConfig::default();
//! let store = InMemoryRecordStore::new().shared();
//! let reconciler = Arc::new(Reconciler::from_config(&config, store)?);
//! let controller = Controller::new(reconciler, config.max_concurrent_reconciles);
//! controller.enqueue("analysis-1");
//! controller.run(CancellationToken::new()).await;
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod backoff;
pub mod config;
pub mod controller;
pub mod investigation;
pub mod phases;
pub mod policy;
pub mod queue;
pub mod reconciler;
pub mod state_machine;
pub mod store;
pub mod telemetry;
pub mod types;

pub use audit::{AuditEvent, AuditSink, BroadcastAuditSink, TracingAuditSink};
pub use backoff::BackoffPolicy;
pub use config::{ConfigError, ReconcilerConfig};
pub use controller::Controller;
pub use investigation::{
    HttpInvestigationTransport, InvestigationClient, InvestigationError, InvestigationTransport,
};
pub use policy::{ApprovalOutcome, PolicyDecision, PolicyEngine, PolicyEvaluator};
pub use queue::WorkQueue;
pub use reconciler::{ReconcileAction, ReconcileError, Reconciler};
pub use state_machine::IllegalTransition;
pub use store::{InMemoryRecordStore, RecordStore, StoreError};
pub use types::{AnalysisRecord, AnalysisRequest, AnalysisStatus, FailureSubReason, Phase};
