//! Step domain model.
//!
//! A step is one unit of an analysis plan. It is created with the plan and
//! mutated in place as the orchestrator moves it through
//! generate → validate → execute → (retry)* → terminal state.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::operation::OperationTag;
use crate::domain::errors::{DomainError, DomainResult};

/// Output recorded on steps that were skipped as redundant.
pub const SKIPPED_OUTPUT: &str = "Skipped";

/// Lifecycle status of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    #[default]
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl StepStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Check if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Valid transitions from this status.
    pub fn valid_transitions(&self) -> &'static [StepStatus] {
        match self {
            Self::Pending => &[Self::Running, Self::Completed, Self::Failed, Self::Cancelled],
            Self::Running => &[Self::Completed, Self::Failed, Self::Cancelled],
            Self::Completed | Self::Failed | Self::Cancelled => &[],
        }
    }

    pub fn can_transition_to(&self, next: StepStatus) -> bool {
        self.valid_transitions().contains(&next)
    }
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single analysis step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: Uuid,
    pub description: String,
    /// Generated source; empty until generation succeeds.
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub status: StepStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    /// Operations the plan author expects this step to perform.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_operations: Option<BTreeSet<OperationTag>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub implementation_hint: Option<String>,
    /// Why the step was skipped, when it was.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    /// Number of executions performed (initial run plus auto-fix retries).
    #[serde(default)]
    pub attempts: u32,
}

impl Step {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            description: description.into(),
            code: String::new(),
            status: StepStatus::Pending,
            output: None,
            expected_operations: None,
            implementation_hint: None,
            skip_reason: None,
            attempts: 0,
        }
    }

    pub fn with_expected_operations(mut self, ops: impl IntoIterator<Item = OperationTag>) -> Self {
        self.expected_operations = Some(ops.into_iter().collect());
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.implementation_hint = Some(hint.into());
        self
    }

    /// Move to `next`, rejecting transitions the lifecycle does not allow.
    pub fn transition_to(&mut self, next: StepStatus) -> DomainResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(DomainError::InvalidStateTransition {
                from: self.status.to_string(),
                to: next.to_string(),
                reason: format!("step '{}'", self.description),
            });
        }
        self.status = next;
        Ok(())
    }

    /// Mark the step as skipped. Skipped steps count as completed.
    pub fn mark_skipped(&mut self, reason: impl Into<String>) -> DomainResult<()> {
        self.transition_to(StepStatus::Completed)?;
        self.output = Some(SKIPPED_OUTPUT.to_string());
        self.skip_reason = Some(reason.into());
        Ok(())
    }

    pub fn is_skipped(&self) -> bool {
        self.skip_reason.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_step_is_pending_and_empty() {
        let step = Step::new("Normalize counts");
        assert_eq!(step.status, StepStatus::Pending);
        assert!(step.code.is_empty());
        assert!(step.output.is_none());
        assert_eq!(step.attempts, 0);
    }

    #[test]
    fn test_lifecycle_transitions() {
        let mut step = Step::new("Cluster cells");
        step.transition_to(StepStatus::Running).unwrap();
        step.transition_to(StepStatus::Completed).unwrap();
        assert!(step.status.is_terminal());

        let err = step.transition_to(StepStatus::Running).unwrap_err();
        assert!(matches!(err, DomainError::InvalidStateTransition { .. }));
    }

    #[test]
    fn test_mark_skipped_sets_output() {
        let mut step = Step::new("Normalize again");
        step.mark_skipped("analysis already covered").unwrap();
        assert_eq!(step.status, StepStatus::Completed);
        assert_eq!(step.output.as_deref(), Some(SKIPPED_OUTPUT));
        assert!(step.is_skipped());
    }

    #[test]
    fn test_expected_operations_builder() {
        let step = Step::new("Plot UMAP")
            .with_expected_operations([OperationTag::Visualize])
            .with_hint("use scanpy");
        assert_eq!(
            step.expected_operations,
            Some(BTreeSet::from([OperationTag::Visualize]))
        );
        assert_eq!(step.implementation_hint.as_deref(), Some("use scanpy"));
    }
}
