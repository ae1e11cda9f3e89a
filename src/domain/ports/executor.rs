//! Code executor port - lints/runs code and reports pass/fail.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::errors::DomainResult;

/// Terminal status reported by an executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Completed,
    Failed,
    Cancelled,
}

/// Result of one execution attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    /// Captured output, or the raw error text on failure.
    pub output: String,
    /// Whether regenerating the code is likely to fix the failure.
    pub should_retry: bool,
}

impl ExecutionOutcome {
    pub fn completed(output: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Completed,
            output: output.into(),
            should_retry: false,
        }
    }

    pub fn failed(error: impl Into<String>, should_retry: bool) -> Self {
        Self {
            status: ExecutionStatus::Failed,
            output: error.into(),
            should_retry,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            status: ExecutionStatus::Cancelled,
            output: String::new(),
            should_retry: false,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }
}

/// Runs one unit of code.
#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Execute `code` for step `step_id`.
    ///
    /// Partial output is sent on `progress` before the call returns. The
    /// sender is dropped when execution ends.
    async fn execute(
        &self,
        step_id: Uuid,
        code: &str,
        progress: mpsc::Sender<String>,
    ) -> DomainResult<ExecutionOutcome>;

    /// Called once `code` has been persisted to the artifact.
    ///
    /// Executors that rebuild interpreter state between runs replay only
    /// committed code, never code whose result was discarded.
    async fn commit(&self, _code: &str) -> DomainResult<()> {
        Ok(())
    }
}
