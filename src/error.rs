//! Pipeline error type

use thiserror::Error;

use crate::llm::LlmError;

/// Errors that escape a pipeline.
///
/// Model fragment errors and tool failures never appear here; they are
/// recorded as data on the step result and tool call records.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("model stream failed: {0}")]
    Model(#[from] LlmError),

    #[error("infrastructure failure: {message}")]
    Infrastructure { message: String },

    #[error("contract violation in step `{step}`: {message}")]
    ContractViolation { step: String, message: String },

    #[error("run cancelled")]
    Cancelled,
}

impl EngineError {
    pub fn infrastructure(message: impl Into<String>) -> Self {
        Self::Infrastructure {
            message: message.into(),
        }
    }

    pub fn contract(step: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ContractViolation {
            step: step.into(),
            message: message.into(),
        }
    }

    /// Whether a whole-pipeline re-run may recover from this error
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Model(e) => e.is_retryable(),
            Self::Infrastructure { .. } => true,
            Self::ContractViolation { .. } | Self::Cancelled => false,
        }
    }
}
