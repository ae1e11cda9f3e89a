//! Domain models.

pub mod checklist;
pub mod config;
pub mod event;
pub mod operation;
pub mod plan;
pub mod skip;
pub mod step;

pub use checklist::{ChecklistEntry, ChecklistSnapshot, ChecklistStatus};
pub use config::{
    ArtifactConfig, Config, ExecutorConfig, LlmConfig, LoggingConfig, OrchestratorConfig,
    RetryConfig,
};
pub use event::{PlanEvent, RunSummary};
pub use operation::{format_operations, OperationLedger, OperationTag, DEFAULT_COVERAGE_THRESHOLD};
pub use plan::{AnalysisRequest, Dataset, Plan};
pub use skip::{SkipDecision, SkipKind, SkipStage};
pub use step::{Step, StepStatus, SKIPPED_OUTPUT};
