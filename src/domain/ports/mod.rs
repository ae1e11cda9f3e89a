//! Port trait definitions (Hexagonal Architecture)
//!
//! This module defines async trait interfaces that adapters must implement:
//! - CodeGenerator: turns a step description into source code
//! - CodeExecutor: runs code and reports pass/fail
//! - ArtifactWriter: persists emitted code in order
//! - Oracle: single-shot natural-language completion
//!
//! These traits define the contracts that keep the orchestrator independent
//! of specific LLM, runtime and storage implementations.

pub mod artifact;
pub mod executor;
pub mod generator;
pub mod oracle;

pub use artifact::ArtifactWriter;
pub use executor::{CodeExecutor, ExecutionOutcome, ExecutionStatus};
pub use generator::{CodeGenerator, GeneratedCode, GenerationRequest};
pub use oracle::Oracle;
