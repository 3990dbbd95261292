//! Structured human-review reasons.
//!
//! The investigation service reports *why* it wants a human in the loop via
//! `human_review_reason`. That enum is the primary contract. Older service
//! versions only emit free-text warnings; [`super::warning_shim`] covers
//! them and is consulted solely when the structured field is absent.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::warning_shim;
use crate::types::FailureSubReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HumanReviewReason {
    WorkflowNotFound,
    ImageMismatch,
    ParameterValidationFailed,
    NoMatchingWorkflows,
    LowConfidence,
    LlmParsingError,
}

impl HumanReviewReason {
    pub fn all() -> &'static [Self] {
        &[
            Self::WorkflowNotFound,
            Self::ImageMismatch,
            Self::ParameterValidationFailed,
            Self::NoMatchingWorkflows,
            Self::LowConfidence,
            Self::LlmParsingError,
        ]
    }

    /// Parse the wire value (`no_matching_workflows`, ...).
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim() {
            "workflow_not_found" => Some(Self::WorkflowNotFound),
            "image_mismatch" => Some(Self::ImageMismatch),
            "parameter_validation_failed" => Some(Self::ParameterValidationFailed),
            "no_matching_workflows" => Some(Self::NoMatchingWorkflows),
            "low_confidence" => Some(Self::LowConfidence),
            "llm_parsing_error" => Some(Self::LlmParsingError),
            _ => None,
        }
    }

    pub fn sub_reason(self) -> FailureSubReason {
        match self {
            Self::WorkflowNotFound => FailureSubReason::WorkflowNotFound,
            Self::ImageMismatch => FailureSubReason::ImageMismatch,
            Self::ParameterValidationFailed => FailureSubReason::ParameterValidationFailed,
            Self::NoMatchingWorkflows => FailureSubReason::NoMatchingWorkflows,
            Self::LowConfidence => FailureSubReason::LowConfidence,
            Self::LlmParsingError => FailureSubReason::LlmParsingError,
        }
    }
}

impl fmt::Display for HumanReviewReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WorkflowNotFound => write!(f, "workflow not found"),
            Self::ImageMismatch => write!(f, "image mismatch"),
            Self::ParameterValidationFailed => write!(f, "parameter validation failed"),
            Self::NoMatchingWorkflows => write!(f, "no matching workflows"),
            Self::LowConfidence => write!(f, "low confidence"),
            Self::LlmParsingError => write!(f, "LLM parsing error"),
        }
    }
}

/// Resolve the review reason for a response.
///
/// Only meaningful when `needs_human_review` is set. An unrecognized
/// structured value is logged and treated as absent.
pub fn resolve_review_reason(
    needs_human_review: bool,
    structured: Option<&str>,
    warnings: &[String],
) -> Option<HumanReviewReason> {
    if !needs_human_review {
        return None;
    }

    if let Some(raw) = structured {
        match HumanReviewReason::parse(raw) {
            Some(reason) => return Some(reason),
            None => tracing::warn!(reason = raw, "Unrecognized human review reason"),
        }
    }

    warning_shim::reason_from_warnings(warnings)
}
