//! Step executor.
//!
//! Runs a step's current code through the executor port and forwards
//! partial output as `StepProgress` events before the terminal status is
//! returned. The auto-fix loop lives in the orchestrator.

use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use super::event_bus::EventBus;
use crate::domain::errors::DomainResult;
use crate::domain::models::{PlanEvent, Step, StepStatus};
use crate::domain::ports::{CodeExecutor, ExecutionOutcome};

const PROGRESS_BUFFER: usize = 64;

/// Wraps a [`CodeExecutor`] with progress forwarding and outcome
/// classification.
#[derive(Clone)]
pub struct StepExecutor {
    executor: Arc<dyn CodeExecutor>,
    events: Arc<EventBus>,
    execute_code: bool,
}

impl StepExecutor {
    pub fn new(executor: Arc<dyn CodeExecutor>, events: Arc<EventBus>) -> Self {
        Self {
            executor,
            events,
            execute_code: true,
        }
    }

    /// Generate-only mode: code is never run and every step completes with
    /// empty output.
    #[must_use]
    pub fn generate_only(mut self, generate_only: bool) -> Self {
        self.execute_code = !generate_only;
        self
    }

    /// Execute the step's current code once.
    ///
    /// Moves a pending step to `running` and counts the attempt. The step's
    /// terminal status is left to the caller, which may still retry.
    pub async fn execute(&self, step: &mut Step) -> DomainResult<ExecutionOutcome> {
        if step.status == StepStatus::Pending {
            step.transition_to(StepStatus::Running)?;
        }
        step.attempts += 1;

        if !self.execute_code {
            debug!(step_id = %step.id, "generate-only mode, not executing");
            return Ok(ExecutionOutcome::completed(String::new()));
        }

        let (tx, mut rx) = mpsc::channel::<String>(PROGRESS_BUFFER);
        let step_id = step.id;
        let events = Arc::clone(&self.events);

        let run = self.executor.execute(step_id, &step.code, tx);
        let forward = async move {
            while let Some(chunk) = rx.recv().await {
                events.publish(PlanEvent::StepProgress { step_id, chunk });
            }
        };
        let (result, ()) = futures::join!(run, forward);

        Ok(match result {
            Ok(outcome) => {
                debug!(
                    %step_id,
                    attempt = step.attempts,
                    status = ?outcome.status,
                    retry = outcome.should_retry,
                    "execution finished"
                );
                outcome
            }
            Err(e) => {
                warn!(%step_id, error = %e, "executor port failed");
                ExecutionOutcome::failed(e.to_string(), false)
            }
        })
    }

    /// Tell the executor that `code` was persisted and may be replayed.
    pub async fn commit(&self, code: &str) -> DomainResult<()> {
        if !self.execute_code {
            return Ok(());
        }
        self.executor.commit(code).await
    }
}
