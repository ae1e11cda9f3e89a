//! Plan orchestrator.
//!
//! Owns the step list and the run state (operation ledger, signature
//! registry, checklist) and drives every step through
//! early-skip → generate → post-generation checks → execute/auto-fix → commit.
//! Steps run strictly in plan order; cancellation is cooperative and polled
//! between external calls.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, instrument, warn};

use super::checklist_tracker::ChecklistTracker;
use super::event_bus::EventBus;
use super::operation_extractor::OperationExtractor;
use super::signature_registry::CodeSignatureRegistry;
use super::skip_oracle::{SkipContext, SkipOracle};
use super::step_executor::StepExecutor;
use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AnalysisRequest, ChecklistSnapshot, ChecklistStatus, OperationLedger, OperationTag,
    OrchestratorConfig, Plan, PlanEvent, RunSummary, SkipDecision, SkipKind, SkipStage,
    StepStatus,
};
use crate::domain::ports::{
    ArtifactWriter, CodeExecutor, CodeGenerator, ExecutionOutcome, ExecutionStatus,
    GenerationRequest, Oracle,
};

const COVERED_NOTE: &str = "covered by earlier steps";

/// Cooperative cancellation flag shared between the orchestrator and its
/// controller. Once set, no new step begins.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// External collaborators the orchestrator talks to.
#[derive(Clone)]
pub struct OrchestratorPorts {
    pub generator: Arc<dyn CodeGenerator>,
    pub executor: Arc<dyn CodeExecutor>,
    pub artifact: Arc<dyn ArtifactWriter>,
    pub oracle: Arc<dyn Oracle>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StepFlow {
    Continue,
    Cancelled,
}

/// Runs analysis plans step by step.
pub struct PlanOrchestrator {
    generator: Arc<dyn CodeGenerator>,
    artifact: Arc<dyn ArtifactWriter>,
    step_executor: StepExecutor,
    skip_oracle: SkipOracle,
    extractor: OperationExtractor,
    registry: CodeSignatureRegistry,
    ledger: OperationLedger,
    checklist: ChecklistTracker,
    events: Arc<EventBus>,
    cancel: CancellationFlag,
    config: OrchestratorConfig,
    cascading: bool,
}

impl PlanOrchestrator {
    pub fn new(ports: OrchestratorPorts, config: OrchestratorConfig, events: Arc<EventBus>) -> Self {
        let step_executor = StepExecutor::new(ports.executor, Arc::clone(&events))
            .generate_only(!config.execute_code);
        let skip_oracle = SkipOracle::new(ports.oracle, config.candidate_excerpt_chars);
        let checklist = ChecklistTracker::new().with_event_bus(Arc::clone(&events));

        Self {
            generator: ports.generator,
            artifact: ports.artifact,
            step_executor,
            skip_oracle,
            extractor: OperationExtractor::new(),
            registry: CodeSignatureRegistry::new(),
            ledger: OperationLedger::new(config.coverage_threshold),
            checklist,
            events,
            cancel: CancellationFlag::new(),
            config,
            cascading: false,
        }
    }

    /// Handle that stops the run before the next step or external call.
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub fn events(&self) -> Arc<EventBus> {
        Arc::clone(&self.events)
    }

    /// Latest checklist snapshot, updated synchronously on every change.
    pub fn subscribe_checklist(&self) -> watch::Receiver<ChecklistSnapshot> {
        self.checklist.subscribe()
    }

    pub fn checklist(&self) -> ChecklistSnapshot {
        self.checklist.snapshot()
    }

    pub fn executed_operations(&self) -> &BTreeSet<OperationTag> {
        self.ledger.executed()
    }

    pub fn is_fully_covered(&self) -> bool {
        self.ledger.is_fully_covered()
    }

    pub fn signatures(&self) -> &CodeSignatureRegistry {
        &self.registry
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Start a new conversation: forget executed operations, signatures and
    /// coverage, and clear any pending cancellation.
    pub fn reset(&mut self) {
        self.ledger.reset();
        self.registry.clear();
        self.cascading = false;
        self.cancel.reset();
        info!("run state reset");
    }

    /// Run every pending step of `plan` in order.
    ///
    /// Operations, signatures and coverage carry over from earlier plans
    /// until [`reset`](Self::reset) is called; the checklist is rebuilt for
    /// this plan. Only cancellation stops the run early.
    #[instrument(skip_all, fields(plan_id = %plan.id, steps = plan.len(), locked = plan.locked))]
    pub async fn run(&mut self, request: &AnalysisRequest, plan: &mut Plan) -> DomainResult<RunSummary> {
        if plan.is_empty() {
            return Err(DomainError::ValidationFailed("plan has no steps".to_string()));
        }

        self.checklist.initialize(plan.descriptions());
        for (index, step) in plan.steps.iter().enumerate() {
            let status = match step.status {
                StepStatus::Completed if step.is_skipped() => ChecklistStatus::Skipped,
                StepStatus::Completed => ChecklistStatus::Completed,
                StepStatus::Failed => ChecklistStatus::Failed,
                _ => continue,
            };
            self.checklist.update_at(index, status, None);
        }

        self.events.start_run();
        self.events.publish(PlanEvent::PlanStarted {
            plan_id: plan.id,
            total_steps: plan.len(),
            locked: plan.locked,
        });
        info!(question = %request.question, "plan started");

        self.cascading = false;
        let mut cancelled_at = None;

        for index in 0..plan.len() {
            if plan.steps[index].status != StepStatus::Pending {
                continue;
            }
            if self.cancel.is_cancelled() {
                cancelled_at = Some(index);
                break;
            }

            if self.process_step(request, plan, index).await? == StepFlow::Cancelled {
                cancelled_at = Some(index);
                break;
            }

            tokio::task::yield_now().await;
            if self.config.step_pause_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.step_pause_ms)).await;
            }
        }

        if let Some(at_index) = cancelled_at {
            info!(at_index, "run cancelled");
            self.events.publish(PlanEvent::RunCancelled { at_index });
        }

        let summary = self.summarize(plan, cancelled_at.is_some());
        self.checklist.emit_summary();
        self.events.publish(PlanEvent::PlanFinished(summary.clone()));
        self.events.end_run();
        info!(
            completed = summary.completed,
            skipped = summary.skipped,
            failed = summary.failed,
            "plan finished"
        );
        Ok(summary)
    }

    #[instrument(skip(self, request, plan), fields(step = %plan.steps[index].description))]
    async fn process_step(
        &mut self,
        request: &AnalysisRequest,
        plan: &mut Plan,
        index: usize,
    ) -> DomainResult<StepFlow> {
        let step_id = plan.steps[index].id;
        self.events.publish(PlanEvent::StepStarted {
            step_id,
            index,
            description: plan.steps[index].description.clone(),
        });

        // Early skip, before any code exists.
        if !plan.locked && index > 0 {
            if let Some(kind) = self.early_skip_proposal(plan, index) {
                let decision = self
                    .consult(request, plan, index, kind, SkipStage::PreGeneration, None)
                    .await;
                if decision.skip {
                    self.skip_step(plan, index, kind, SkipStage::PreGeneration, decision)?;
                    self.cascading = true;
                    return Ok(StepFlow::Continue);
                }
                self.cascading = false;
            } else {
                self.cascading = false;
            }
        } else {
            self.cascading = false;
        }

        if self.cancel.is_cancelled() {
            self.cancel_step(plan, index)?;
            return Ok(StepFlow::Cancelled);
        }

        // Generation.
        let Some(code) = self.generate(request, plan, index).await else {
            let error = "code generation produced no code".to_string();
            self.fail_step(plan, index, error, "generation failed")?;
            return Ok(StepFlow::Continue);
        };
        if self.cancel.is_cancelled() {
            self.cancel_step(plan, index)?;
            return Ok(StepFlow::Cancelled);
        }

        let operations = self.extractor.extract(&code);
        plan.steps[index].code = code;
        self.events.publish(PlanEvent::CodeGenerated {
            step_id,
            operations: operations.clone(),
        });

        // Post-generation: no new operations once the analysis is covered.
        if self.coverage_preconditions(plan, index) && self.ledger.covers(&operations) {
            let kind = SkipKind::NoNewOperations;
            let code = plan.steps[index].code.clone();
            let decision = self
                .consult(request, plan, index, kind, SkipStage::PostGeneration, Some(&code))
                .await;
            if decision.skip {
                self.skip_step(plan, index, kind, SkipStage::PostGeneration, decision)?;
                return Ok(StepFlow::Continue);
            }
        }

        // Post-generation: duplicate of code emitted earlier.
        if !plan.locked && self.registry.contains_code(&plan.steps[index].code) {
            let kind = SkipKind::Duplicate;
            let code = plan.steps[index].code.clone();
            let decision = self
                .consult(request, plan, index, kind, SkipStage::PostGeneration, Some(&code))
                .await;
            if decision.skip {
                self.skip_step(plan, index, kind, SkipStage::PostGeneration, decision)?;
                return Ok(StepFlow::Continue);
            }
        }

        if self.cancel.is_cancelled() {
            self.cancel_step(plan, index)?;
            return Ok(StepFlow::Cancelled);
        }

        let outcome = self.execute_with_auto_fix(plan, index).await?;
        if self.cancel.is_cancelled() {
            // The in-flight result is discarded.
            self.cancel_step(plan, index)?;
            return Ok(StepFlow::Cancelled);
        }

        match outcome.status {
            ExecutionStatus::Completed => self.commit(plan, index, outcome.output).await?,
            ExecutionStatus::Failed => {
                let attempts = plan.steps[index].attempts;
                let note = format!("failed after {attempts} attempt(s)");
                self.fail_step(plan, index, outcome.output, &note)?;
            }
            ExecutionStatus::Cancelled => {
                plan.steps[index].transition_to(StepStatus::Cancelled)?;
                self.checklist
                    .update_at(index, ChecklistStatus::Failed, Some("execution cancelled".into()));
            }
        }
        Ok(StepFlow::Continue)
    }

    /// Heuristic pre-generation proposal for the step at `index`.
    fn early_skip_proposal(&self, plan: &Plan, index: usize) -> Option<SkipKind> {
        let step = &plan.steps[index];
        let estimate = step
            .expected_operations
            .clone()
            .unwrap_or_else(|| self.extractor.estimate_from_description(&step.description));

        if self.ledger.is_fully_covered() {
            (self.coverage_preconditions(plan, index) && self.ledger.covers(&estimate))
                .then_some(SkipKind::Covered)
        } else {
            (!estimate.is_empty() && self.ledger.covers(&estimate)).then_some(SkipKind::Redundant)
        }
    }

    /// Unlocked plan, not the first step, coverage reached and enough steps
    /// left afterwards (waived while cascading).
    fn coverage_preconditions(&self, plan: &Plan, index: usize) -> bool {
        if plan.locked || index == 0 || !self.ledger.is_fully_covered() {
            return false;
        }
        self.cascading || plan.pending_after(index).len() >= self.config.min_remaining_for_early_skip
    }

    async fn consult(
        &self,
        request: &AnalysisRequest,
        plan: &Plan,
        index: usize,
        kind: SkipKind,
        stage: SkipStage,
        candidate_code: Option<&str>,
    ) -> SkipDecision {
        let checklist = self.checklist.snapshot();
        let remaining = plan.pending_after(index);
        let context = SkipContext {
            question: &request.question,
            checklist: &checklist,
            executed_operations: self.ledger.executed(),
            remaining_steps: &remaining,
        };
        let step = &plan.steps[index];
        debug!(index, ?kind, %stage, "consulting skip oracle");

        let decision = self
            .skip_oracle
            .should_skip(&context, step, kind.proposed_reason(), stage, candidate_code)
            .await;
        if !decision.skip {
            self.events.publish(PlanEvent::SkipOverridden {
                step_id: step.id,
                kind,
                stage,
                reason: decision.reason.clone(),
            });
        }
        decision
    }

    async fn generate(&self, request: &AnalysisRequest, plan: &Plan, index: usize) -> Option<String> {
        let step = &plan.steps[index];
        let generation = GenerationRequest {
            step_description: step.description.clone(),
            original_question: request.question.clone(),
            step_index: index,
            total_steps: plan.len(),
            datasets: request.datasets.clone(),
            implementation_hint: step.implementation_hint.clone(),
        };

        match self.generator.generate(&generation).await {
            Ok(generated) if !generated.is_blank() => Some(generated.code),
            Ok(_) => {
                warn!(index, "generator returned empty code");
                self.events.publish(PlanEvent::GenerationFailed {
                    step_id: step.id,
                    error: "empty code".to_string(),
                    used_partial_code: false,
                });
                None
            }
            Err(e) => {
                let partial = e.partial_code().map(str::to_string);
                warn!(
                    index,
                    error = %e,
                    partial = partial.is_some(),
                    "code generation failed"
                );
                self.events.publish(PlanEvent::GenerationFailed {
                    step_id: step.id,
                    error: e.to_string(),
                    used_partial_code: partial.is_some(),
                });
                partial
            }
        }
    }

    /// Execute, regenerating on retryable failures until the retry budget
    /// is spent.
    async fn execute_with_auto_fix(&self, plan: &mut Plan, index: usize) -> DomainResult<ExecutionOutcome> {
        let step = &mut plan.steps[index];
        let mut retries = 0;

        loop {
            let outcome = self.step_executor.execute(step).await?;
            if outcome.status != ExecutionStatus::Failed {
                return Ok(outcome);
            }

            let error = outcome.output.trim();
            if !outcome.should_retry || error.is_empty() {
                debug!(index, "failure is not retryable");
                return Ok(outcome);
            }
            if retries >= self.config.max_auto_fix_retries {
                warn!(index, retries, "auto-fix retries exhausted");
                return Ok(outcome);
            }
            if self.cancel.is_cancelled() {
                return Ok(ExecutionOutcome::cancelled());
            }

            retries += 1;
            info!(index, attempt = retries, "auto-fixing step");
            self.events.publish(PlanEvent::AutoFixStarted {
                step_id: step.id,
                attempt: retries,
                error: outcome.output.clone(),
            });

            let regenerated = self
                .generator
                .regenerate(&step.code, &outcome.output, &step.description)
                .await;
            match regenerated {
                Ok(fixed) if !fixed.is_blank() => step.code = fixed.code,
                Ok(_) => {
                    warn!(index, "regeneration returned empty code");
                    return Ok(outcome);
                }
                Err(e) => {
                    warn!(index, error = %e, "regeneration failed");
                    return Ok(outcome);
                }
            }

            if self.cancel.is_cancelled() {
                return Ok(ExecutionOutcome::cancelled());
            }
        }
    }

    /// Append the code, register it and fold its operations into the ledger.
    async fn commit(&mut self, plan: &mut Plan, index: usize, output: String) -> DomainResult<()> {
        let code = plan.steps[index].code.clone();
        if let Err(e) = self.artifact.append(&code).await {
            warn!(index, error = %e, "artifact write failed");
            return self.fail_step(plan, index, e.to_string(), "artifact write failed");
        }
        if let Err(e) = self.step_executor.commit(&code).await {
            warn!(index, error = %e, "executor did not accept committed code");
        }

        if let Some(fingerprint) = self.registry.normalize(&code) {
            debug!(index, fingerprint = %fingerprint.short(), "registering signature");
            self.registry.register(fingerprint);
        }

        let was_covered = self.ledger.is_fully_covered();
        let operations = self.extractor.extract(&code);
        let new_operations = self.ledger.record(&operations);

        let step = &mut plan.steps[index];
        step.output = Some(output);
        step.transition_to(StepStatus::Completed)?;
        let step_id = step.id;

        self.checklist.update_at(index, ChecklistStatus::Completed, None);
        self.events.publish(PlanEvent::StepCompleted {
            step_id,
            index,
            new_operations: new_operations.clone(),
        });

        if !was_covered && self.ledger.is_fully_covered() {
            info!(core = self.ledger.core_count(), "analysis fully covered");
            self.events.publish(PlanEvent::CoverageReached {
                operations: self.ledger.executed().clone(),
            });
        }
        if plan.locked && self.ledger.is_fully_covered() {
            self.mark_covered_entries(plan, index);
        }
        Ok(())
    }

    /// Checklist-only shortcut for locked plans: pending entries whose full
    /// expected-operation set is already executed are shown as completed.
    /// Steps without declared operations are estimated from their description.
    fn mark_covered_entries(&mut self, plan: &Plan, after: usize) {
        for (index, step) in plan.steps.iter().enumerate().skip(after + 1) {
            let expected = step
                .expected_operations
                .clone()
                .unwrap_or_else(|| self.extractor.estimate_from_description(&step.description));
            if expected.is_empty() || !self.ledger.covers(&expected) {
                continue;
            }
            if self.checklist.status_at(index) == Some(ChecklistStatus::Pending) {
                debug!(index, "marking checklist entry covered");
                self.checklist
                    .update_at(index, ChecklistStatus::Completed, Some(COVERED_NOTE.to_string()));
            }
        }
    }

    fn skip_step(
        &mut self,
        plan: &mut Plan,
        index: usize,
        kind: SkipKind,
        stage: SkipStage,
        decision: SkipDecision,
    ) -> DomainResult<()> {
        let reason = decision
            .reason
            .unwrap_or_else(|| kind.proposed_reason().to_string());
        let step = &mut plan.steps[index];
        step.mark_skipped(reason.clone())?;
        info!(index, %stage, %reason, "step skipped");

        let step_id = step.id;
        self.checklist
            .update_at(index, ChecklistStatus::Skipped, Some(reason.clone()));
        self.events.publish(PlanEvent::StepSkipped {
            step_id,
            index,
            kind,
            stage,
            reason,
        });
        Ok(())
    }

    fn fail_step(&mut self, plan: &mut Plan, index: usize, error: String, note: &str) -> DomainResult<()> {
        let step = &mut plan.steps[index];
        step.transition_to(StepStatus::Failed)?;
        step.output = Some(error.clone());
        warn!(index, note, "step failed");

        let step_id = step.id;
        self.checklist
            .update_at(index, ChecklistStatus::Failed, Some(note.to_string()));
        self.events.publish(PlanEvent::StepFailed {
            step_id,
            index,
            error,
        });
        Ok(())
    }

    fn cancel_step(&mut self, plan: &mut Plan, index: usize) -> DomainResult<()> {
        plan.steps[index].transition_to(StepStatus::Cancelled)?;
        debug!(index, "step cancelled");
        Ok(())
    }

    fn summarize(&self, plan: &Plan, was_cancelled: bool) -> RunSummary {
        let count = |status: StepStatus| plan.steps.iter().filter(|s| s.status == status).count();
        let skipped = plan.steps.iter().filter(|s| s.is_skipped()).count();
        RunSummary {
            total_steps: plan.len(),
            completed: count(StepStatus::Completed) - skipped,
            skipped,
            failed: count(StepStatus::Failed),
            cancelled: count(StepStatus::Cancelled),
            executed_operations: self.ledger.executed().clone(),
            analysis_fully_covered: self.ledger.is_fully_covered(),
            was_cancelled,
        }
    }
}
