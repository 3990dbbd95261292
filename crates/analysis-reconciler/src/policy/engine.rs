//! Policy engine seam.

use std::path::PathBuf;

use thiserror::Error;

use super::input::PolicyInput;

/// Errors raised inside a policy engine. They never cross
/// [`super::PolicyEvaluator`]; it converts them into degraded decisions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PolicyError {
    #[error("policy source missing: {0}")]
    SourceMissing(String),

    #[error("policy failed to load: {0}")]
    Load(String),

    #[error("policy evaluation failed: {0}")]
    Evaluation(String),
}

/// Where policy text comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicySource {
    /// Policy text held in memory.
    Inline(String),
    /// Policy file, re-read on every evaluation so edits apply without restart.
    File(PathBuf),
}

impl PolicySource {
    /// Read the policy text.
    pub fn read(&self) -> Result<String, PolicyError> {
        match self {
            Self::Inline(text) if text.trim().is_empty() => {
                Err(PolicyError::SourceMissing("inline policy is empty".into()))
            }
            Self::Inline(text) => Ok(text.clone()),
            Self::File(path) => std::fs::read_to_string(path).map_err(|e| {
                PolicyError::SourceMissing(format!("{}: {}", path.display(), e))
            }),
        }
    }
}

/// Raw engine output.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyOutput {
    /// Result document, or `None` when the policy produced nothing at all.
    pub document: Option<serde_json::Value>,
    /// Version declared by the loaded policy, if any.
    pub version: Option<String>,
}

/// A policy language runtime.
///
/// Implementations return whatever document their policy produced; shape
/// validation and safe degradation happen in the evaluator.
#[cfg_attr(test, mockall::automock)]
pub trait PolicyEngine: Send + Sync {
    fn evaluate(&self, input: &PolicyInput) -> Result<PolicyOutput, PolicyError>;
}
