//! Code generator port.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::errors::DomainResult;
use crate::domain::models::Dataset;

/// Minimal context needed to generate code for one step.
///
/// The accumulated code history is deliberately absent to bound request size;
/// `scope_note` tells the generator which steps are already done.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub step_description: String,
    pub original_question: String,
    /// Zero-based position of the step in the plan.
    pub step_index: usize,
    pub total_steps: usize,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_hint: Option<String>,
}

impl GenerationRequest {
    /// Instruction that keeps the generator inside the current step.
    pub fn scope_note(&self) -> String {
        let position = self.step_index + 1;
        let mut note = format!("This is step {position} of {}.", self.total_steps);
        if self.step_index > 0 {
            note.push_str(&format!(
                " Steps 1-{} are already done and their results are in memory; do not repeat them.",
                self.step_index
            ));
        }
        if position < self.total_steps {
            note.push_str(" Later steps will be handled separately; do not implement them.");
        }
        note
    }
}

/// Code returned by the generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedCode {
    pub code: String,
}

impl GeneratedCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self { code: code.into() }
    }

    pub fn is_blank(&self) -> bool {
        self.code.trim().is_empty()
    }
}

/// Turns natural-language step descriptions into source code.
#[async_trait]
pub trait CodeGenerator: Send + Sync {
    /// Generate code for a step.
    ///
    /// On failure the error may carry partial code
    /// (`DomainError::GenerationFailed { partial_code, .. }`).
    async fn generate(&self, request: &GenerationRequest) -> DomainResult<GeneratedCode>;

    /// Produce a fixed version of `original_code` given the execution error.
    async fn regenerate(
        &self,
        original_code: &str,
        error_text: &str,
        step_description: &str,
    ) -> DomainResult<GeneratedCode>;
}
