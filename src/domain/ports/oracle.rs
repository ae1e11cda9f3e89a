//! Oracle port - natural-language completion service.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

/// Single-shot text completion.
///
/// No retry or backoff contract is required of implementations; callers may
/// wrap an oracle with their own policy.
#[async_trait]
pub trait Oracle: Send + Sync {
    /// Ask `question` with `context` supplied as background material.
    async fn ask(&self, question: &str, context: &str) -> DomainResult<String>;
}
