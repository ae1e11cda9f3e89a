//! Orchestration services.

pub mod checklist_tracker;
pub mod code_text;
pub mod event_bus;
pub mod operation_extractor;
pub mod plan_orchestrator;
pub mod planner;
pub mod signature_registry;
pub mod skip_oracle;
pub mod step_executor;

pub use checklist_tracker::ChecklistTracker;
pub use event_bus::{EventBus, EventBusConfig, PlanEventEnvelope, SequenceNumber};
pub use operation_extractor::OperationExtractor;
pub use plan_orchestrator::{CancellationFlag, OrchestratorPorts, PlanOrchestrator};
pub use planner::Planner;
pub use signature_registry::{normalize, CodeSignatureRegistry, Fingerprint};
pub use skip_oracle::{SkipContext, SkipOracle};
pub use step_executor::StepExecutor;
