//! Mock adapters for testing.
//!
//! Each mock is scripted up front and records what it was asked so tests can
//! assert on the orchestrator's calls.

use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{
    ArtifactWriter, CodeExecutor, CodeGenerator, ExecutionOutcome, GeneratedCode,
    GenerationRequest, Oracle,
};

/// Scripted generator response.
#[derive(Debug, Clone)]
pub enum MockGeneration {
    Code(String),
    Failure {
        message: String,
        partial_code: Option<String>,
    },
}

impl MockGeneration {
    pub fn code(code: impl Into<String>) -> Self {
        Self::Code(code.into())
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            partial_code: None,
        }
    }

    pub fn partial(message: impl Into<String>, partial_code: impl Into<String>) -> Self {
        Self::Failure {
            message: message.into(),
            partial_code: Some(partial_code.into()),
        }
    }

    fn into_result(self) -> DomainResult<GeneratedCode> {
        match self {
            Self::Code(code) => Ok(GeneratedCode::new(code)),
            Self::Failure {
                message,
                partial_code,
            } => Err(DomainError::GenerationFailed {
                message,
                partial_code,
            }),
        }
    }
}

/// Mock code generator keyed by step description.
///
/// Unscripted steps get `print("<description>")`. Regeneration pops scripted
/// fixes in order and otherwise returns the original code unchanged.
pub struct MockGenerator {
    responses: HashMap<String, MockGeneration>,
    fixes: RwLock<VecDeque<MockGeneration>>,
    requests: Arc<RwLock<Vec<GenerationRequest>>>,
    regenerate_calls: AtomicUsize,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            fixes: RwLock::new(VecDeque::new()),
            requests: Arc::new(RwLock::new(Vec::new())),
            regenerate_calls: AtomicUsize::new(0),
        }
    }

    /// Script the code produced for a step description.
    #[must_use]
    pub fn with_code(self, description: &str, code: &str) -> Self {
        self.with_response(description, MockGeneration::code(code))
    }

    #[must_use]
    pub fn with_response(mut self, description: &str, response: MockGeneration) -> Self {
        self.responses.insert(description.to_string(), response);
        self
    }

    /// Queue a regeneration result.
    #[must_use]
    pub fn with_fix(mut self, fix: MockGeneration) -> Self {
        self.fixes.get_mut().push_back(fix);
        self
    }

    /// Generation requests received so far.
    pub async fn requests(&self) -> Vec<GenerationRequest> {
        self.requests.read().await.clone()
    }

    pub fn regenerate_calls(&self) -> usize {
        self.regenerate_calls.load(Ordering::SeqCst)
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeGenerator for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> DomainResult<GeneratedCode> {
        self.requests.write().await.push(request.clone());
        match self.responses.get(&request.step_description).cloned() {
            Some(response) => response.into_result(),
            None => Ok(GeneratedCode::new(format!(
                "print(\"{}\")",
                request.step_description
            ))),
        }
    }

    async fn regenerate(
        &self,
        original_code: &str,
        _error_text: &str,
        _step_description: &str,
    ) -> DomainResult<GeneratedCode> {
        self.regenerate_calls.fetch_add(1, Ordering::SeqCst);
        match self.fixes.write().await.pop_front() {
            Some(fix) => fix.into_result(),
            None => Ok(GeneratedCode::new(original_code)),
        }
    }
}

/// Mock executor.
///
/// Outcomes are chosen by the first rule whose pattern occurs in the code,
/// then by the scripted queue, then the default (completed).
pub struct MockExecutor {
    rules: Vec<(String, ExecutionOutcome)>,
    queue: RwLock<VecDeque<ExecutionOutcome>>,
    progress: Vec<String>,
    port_error: Option<String>,
    executed: Arc<RwLock<Vec<(Uuid, String)>>>,
    committed: RwLock<Vec<String>>,
    calls: AtomicUsize,
}

impl MockExecutor {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            queue: RwLock::new(VecDeque::new()),
            progress: Vec::new(),
            port_error: None,
            executed: Arc::new(RwLock::new(Vec::new())),
            committed: RwLock::new(Vec::new()),
            calls: AtomicUsize::new(0),
        }
    }

    /// Return `outcome` whenever the code contains `pattern`.
    #[must_use]
    pub fn with_rule(mut self, pattern: &str, outcome: ExecutionOutcome) -> Self {
        self.rules.push((pattern.to_string(), outcome));
        self
    }

    #[must_use]
    pub fn with_outcomes(mut self, outcomes: impl IntoIterator<Item = ExecutionOutcome>) -> Self {
        self.queue.get_mut().extend(outcomes);
        self
    }

    /// Lines streamed on the progress channel for every execution.
    #[must_use]
    pub fn with_progress(mut self, lines: Vec<String>) -> Self {
        self.progress = lines;
        self
    }

    /// Fail every call at the port level.
    #[must_use]
    pub fn with_port_error(mut self, message: &str) -> Self {
        self.port_error = Some(message.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Code executed so far, in order.
    pub async fn executed_code(&self) -> Vec<String> {
        self.executed
            .read()
            .await
            .iter()
            .map(|(_, code)| code.clone())
            .collect()
    }

    /// Code the orchestrator committed, in order.
    pub async fn committed_code(&self) -> Vec<String> {
        self.committed.read().await.clone()
    }

    /// Number of executions performed for one step.
    pub async fn executions_for(&self, step_id: Uuid) -> usize {
        self.executed
            .read()
            .await
            .iter()
            .filter(|(id, _)| *id == step_id)
            .count()
    }
}

impl Default for MockExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CodeExecutor for MockExecutor {
    async fn execute(
        &self,
        step_id: Uuid,
        code: &str,
        progress: mpsc::Sender<String>,
    ) -> DomainResult<ExecutionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = &self.port_error {
            return Err(DomainError::ExecutionFailed(message.clone()));
        }
        self.executed.write().await.push((step_id, code.to_string()));

        for line in &self.progress {
            let _ = progress.send(line.clone()).await;
        }

        if let Some((_, outcome)) = self.rules.iter().find(|(p, _)| code.contains(p.as_str())) {
            return Ok(outcome.clone());
        }
        let queued = self.queue.write().await.pop_front();
        Ok(queued.unwrap_or_else(|| ExecutionOutcome::completed("ok")))
    }

    async fn commit(&self, code: &str) -> DomainResult<()> {
        self.committed.write().await.push(code.to_string());
        Ok(())
    }
}

/// Mock oracle.
///
/// Answers with the first rule whose pattern occurs in the context, else the
/// default answer. A failing oracle errors on every call.
pub struct MockOracle {
    default_answer: String,
    rules: Vec<(String, String)>,
    fail: bool,
    contexts: Arc<RwLock<Vec<String>>>,
}

impl MockOracle {
    pub fn always(answer: &str) -> Self {
        Self {
            default_answer: answer.to_string(),
            rules: Vec::new(),
            fail: false,
            contexts: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::always("")
        }
    }

    #[must_use]
    pub fn with_rule(mut self, pattern: &str, answer: &str) -> Self {
        self.rules.push((pattern.to_string(), answer.to_string()));
        self
    }

    /// Contexts received so far, in order.
    pub async fn contexts(&self) -> Vec<String> {
        self.contexts.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.contexts.read().await.len()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn ask(&self, _question: &str, context: &str) -> DomainResult<String> {
        self.contexts.write().await.push(context.to_string());
        if self.fail {
            return Err(DomainError::OracleFailed("mock oracle unavailable".to_string()));
        }
        let answer = self
            .rules
            .iter()
            .find(|(pattern, _)| context.contains(pattern.as_str()))
            .map_or(&self.default_answer, |(_, answer)| answer);
        Ok(answer.clone())
    }
}

/// In-memory artifact writer.
#[derive(Clone, Default)]
pub struct MemoryArtifactWriter {
    cells: Arc<RwLock<Vec<String>>>,
}

impl MemoryArtifactWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn cells(&self) -> Vec<String> {
        self.cells.read().await.clone()
    }
}

#[async_trait]
impl ArtifactWriter for MemoryArtifactWriter {
    async fn append(&self, code: &str) -> DomainResult<()> {
        self.cells.write().await.push(code.to_string());
        Ok(())
    }
}
