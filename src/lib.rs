//! plancell - LLM-assisted analysis plan orchestrator
//!
//! plancell turns a research question into an ordered plan of analysis
//! steps, generates code for each step, executes it with bounded auto-fix
//! retries and appends the successful code to a script artifact. Steps that
//! would repeat work already done are proposed for skipping by heuristics
//! and confirmed or overridden by a language-model oracle.
//!
//! # Architecture
//!
//! This crate follows Hexagonal Architecture principles:
//!
//! - **Domain Layer** (`domain`): models, errors and the port traits
//! - **Service Layer** (`services`): the step protocol and its helpers
//! - **Adapters** (`adapters`): Anthropic API, subprocess executor, script
//!   writer and in-memory mocks
//! - **Infrastructure Layer** (`infrastructure`): configuration and logging
//! - **CLI Layer** (`cli`): command-line interface
//!
//! # Example
//!
//! ```ignore
//! use plancell::adapters::{MemoryArtifactWriter, MockExecutor, MockGenerator, MockOracle};
//! use plancell::services::{EventBus, OrchestratorPorts, PlanOrchestrator, Planner};
//!
//! let ports = OrchestratorPorts { /* ... */ };
//! let mut orchestrator = PlanOrchestrator::new(ports, Default::default(), EventBus::shared());
//! let summary = orchestrator.run(&request, &mut plan).await?;
//! ```

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

// Re-export commonly used types for convenience
pub use domain::errors::{DomainError, DomainResult};
pub use domain::models::{
    AnalysisRequest, ChecklistSnapshot, Config, OperationTag, Plan, PlanEvent, RunSummary, Step,
    StepStatus,
};
pub use infrastructure::config::{ConfigError, ConfigLoader};
pub use services::{CancellationFlag, OrchestratorPorts, PlanOrchestrator, Planner};
