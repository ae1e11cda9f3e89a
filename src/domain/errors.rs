//! Domain errors for the plancell orchestrator.

use thiserror::Error;

/// Domain-level errors that can occur while planning or running an analysis.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition { from: String, to: String, reason: String },

    #[error("Validation failed: {0}")]
    ValidationFailed(String),

    /// The generator failed. Any code it produced before failing is kept so the
    /// orchestrator can fall back to it.
    #[error("Code generation failed: {message}")]
    GenerationFailed {
        message: String,
        partial_code: Option<String>,
    },

    #[error("Execution failed: {0}")]
    ExecutionFailed(String),

    #[error("Oracle request failed: {0}")]
    OracleFailed(String),

    #[error("Artifact write failed: {0}")]
    ArtifactFailed(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl DomainError {
    /// Generation failure without any salvageable output.
    pub fn generation(message: impl Into<String>) -> Self {
        Self::GenerationFailed {
            message: message.into(),
            partial_code: None,
        }
    }

    /// Partial code attached to a generation failure, if it is non-blank.
    pub fn partial_code(&self) -> Option<&str> {
        match self {
            Self::GenerationFailed {
                partial_code: Some(code),
                ..
            } if !code.trim().is_empty() => Some(code.as_str()),
            _ => None,
        }
    }
}

pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_code_ignores_blank_output() {
        let err = DomainError::GenerationFailed {
            message: "stream closed".to_string(),
            partial_code: Some("   \n".to_string()),
        };
        assert!(err.partial_code().is_none());

        let err = DomainError::GenerationFailed {
            message: "stream closed".to_string(),
            partial_code: Some("import pandas as pd".to_string()),
        };
        assert_eq!(err.partial_code(), Some("import pandas as pd"));
    }

    #[test]
    fn test_display_includes_message() {
        let err = DomainError::generation("model overloaded");
        assert_eq!(err.to_string(), "Code generation failed: model overloaded");
    }
}
