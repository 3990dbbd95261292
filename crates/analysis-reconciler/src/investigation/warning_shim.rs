//! Compatibility shim: derive a review reason from free-text warnings.
//!
//! Investigation services that predate the structured `human_review_reason`
//! field only report free-text warnings. This keyword match maps them onto
//! the same taxonomy. It is the lowest-priority path and can be removed once
//! no such services remain; nothing else depends on it.

use super::review::HumanReviewReason;

/// Keyword table, checked in order. More specific phrases come first.
const KEYWORDS: &[(&str, HumanReviewReason)] = &[
    ("no matching workflow", HumanReviewReason::NoMatchingWorkflows),
    ("no workflows matched", HumanReviewReason::NoMatchingWorkflows),
    ("workflow not found", HumanReviewReason::WorkflowNotFound),
    ("not found in catalog", HumanReviewReason::WorkflowNotFound),
    ("image mismatch", HumanReviewReason::ImageMismatch),
    ("parameter validation", HumanReviewReason::ParameterValidationFailed),
    ("invalid parameter", HumanReviewReason::ParameterValidationFailed),
    ("low confidence", HumanReviewReason::LowConfidence),
    ("confidence below", HumanReviewReason::LowConfidence),
    ("parsing error", HumanReviewReason::LlmParsingError),
    ("failed to parse", HumanReviewReason::LlmParsingError),
];

/// First reason whose keyword appears in any warning (case-insensitive).
pub fn reason_from_warnings(warnings: &[String]) -> Option<HumanReviewReason> {
    let lowered: Vec<String> = warnings.iter().map(|w| w.to_ascii_lowercase()).collect();
    KEYWORDS
        .iter()
        .find(|(keyword, _)| lowered.iter().any(|w| w.contains(keyword)))
        .map(|(_, reason)| *reason)
}
