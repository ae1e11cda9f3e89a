//! Artifact writer port - durable, ordered output of emitted code.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Append-only sink for the code units a run emits.
///
/// Implementations must preserve call order. The orchestrator never calls
/// `append` for skipped or duplicate steps.
#[async_trait]
pub trait ArtifactWriter: Send + Sync {
    /// Persist one unit of code.
    async fn append(&self, code: &str) -> DomainResult<()>;
}
