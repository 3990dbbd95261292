//! Investigation client.
//!
//! Wraps calls to the external investigation service:
//!
//! ```text
//! InvestigationClient::investigate(record)
//!   ├─ transport.send(request) Ok      → Succeeded(result), retry counter reset
//!   ├─ transient error, budget left    → RetryAfter { delay }  (no sleeping)
//!   ├─ transient error, budget spent   → Failed(MaxRetriesExceeded)
//!   └─ permanent error                 → Failed(error), retry counter unchanged
//! ```
//!
//! The transport is a trait so the HTTP implementation can be swapped for a
//! scripted one in tests.

pub mod client;
pub mod error;
pub mod review;
pub mod transport;
pub mod warning_shim;
pub mod wire;

pub use client::{InvestigationAttempt, InvestigationClient};
pub use error::{classify_status, ErrorClass, InvestigationError, TransportResult};
pub use review::HumanReviewReason;
pub use transport::{HttpInvestigationTransport, InvestigationTransport};
pub use wire::{InvestigationRequest, InvestigationResponse};
