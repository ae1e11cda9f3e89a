//! Events emitted while a plan runs.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::checklist::ChecklistSnapshot;
use super::operation::OperationTag;
use super::skip::{SkipKind, SkipStage};

/// Counts reported when a run finishes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub total_steps: usize,
    pub completed: usize,
    pub skipped: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub executed_operations: BTreeSet<OperationTag>,
    pub analysis_fully_covered: bool,
    pub was_cancelled: bool,
}

/// Closed set of orchestrator events. Each variant carries a fixed field set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum PlanEvent {
    PlanStarted {
        plan_id: Uuid,
        total_steps: usize,
        locked: bool,
    },
    StepStarted {
        step_id: Uuid,
        index: usize,
        description: String,
    },
    StepSkipped {
        step_id: Uuid,
        index: usize,
        kind: SkipKind,
        stage: SkipStage,
        reason: String,
    },
    /// The oracle rejected a heuristic skip proposal.
    SkipOverridden {
        step_id: Uuid,
        kind: SkipKind,
        stage: SkipStage,
        reason: Option<String>,
    },
    CodeGenerated {
        step_id: Uuid,
        operations: BTreeSet<OperationTag>,
    },
    GenerationFailed {
        step_id: Uuid,
        error: String,
        used_partial_code: bool,
    },
    StepProgress {
        step_id: Uuid,
        chunk: String,
    },
    AutoFixStarted {
        step_id: Uuid,
        attempt: u32,
        error: String,
    },
    StepCompleted {
        step_id: Uuid,
        index: usize,
        new_operations: BTreeSet<OperationTag>,
    },
    StepFailed {
        step_id: Uuid,
        index: usize,
        error: String,
    },
    CoverageReached {
        operations: BTreeSet<OperationTag>,
    },
    ChecklistUpdated(ChecklistSnapshot),
    RunCancelled {
        at_index: usize,
    },
    PlanFinished(RunSummary),
}

impl PlanEvent {
    /// Step the event concerns, if any.
    pub fn step_id(&self) -> Option<Uuid> {
        match self {
            Self::StepStarted { step_id, .. }
            | Self::StepSkipped { step_id, .. }
            | Self::SkipOverridden { step_id, .. }
            | Self::CodeGenerated { step_id, .. }
            | Self::GenerationFailed { step_id, .. }
            | Self::StepProgress { step_id, .. }
            | Self::AutoFixStarted { step_id, .. }
            | Self::StepCompleted { step_id, .. }
            | Self::StepFailed { step_id, .. } => Some(*step_id),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::PlanStarted { .. } => "plan_started",
            Self::StepStarted { .. } => "step_started",
            Self::StepSkipped { .. } => "step_skipped",
            Self::SkipOverridden { .. } => "skip_overridden",
            Self::CodeGenerated { .. } => "code_generated",
            Self::GenerationFailed { .. } => "generation_failed",
            Self::StepProgress { .. } => "step_progress",
            Self::AutoFixStarted { .. } => "auto_fix_started",
            Self::StepCompleted { .. } => "step_completed",
            Self::StepFailed { .. } => "step_failed",
            Self::CoverageReached { .. } => "coverage_reached",
            Self::ChecklistUpdated(_) => "checklist_updated",
            Self::RunCancelled { .. } => "run_cancelled",
            Self::PlanFinished(_) => "plan_finished",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serializes_with_type_tag() {
        let event = PlanEvent::RunCancelled { at_index: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "RunCancelled");
        assert_eq!(json["data"]["at_index"], 3);
    }

    #[test]
    fn test_step_id_extraction() {
        let id = Uuid::new_v4();
        let event = PlanEvent::StepProgress {
            step_id: id,
            chunk: "epoch 1".to_string(),
        };
        assert_eq!(event.step_id(), Some(id));
        assert_eq!(PlanEvent::RunCancelled { at_index: 0 }.step_id(), None);
    }
}
