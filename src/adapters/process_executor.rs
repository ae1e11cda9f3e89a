//! Subprocess code executor.
//!
//! Pipes code into an interpreter (`python3 -u -` by default), streams stdout
//! lines as progress and classifies failures. With history replay enabled,
//! previously committed code runs first so later steps see the variables
//! earlier steps created; only output printed after a per-run marker line is
//! reported.

use async_trait::async_trait;
use regex::Regex;
use std::process::Stdio;
use std::sync::LazyLock;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::process::Command;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::ExecutorConfig;
use crate::domain::ports::{CodeExecutor, ExecutionOutcome};

static NON_RETRYABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)ModuleNotFoundError|No module named|ImportError: cannot import|MemoryError|\bKilled\b|timed out|there is no package called|out of memory")
        .unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

static RETRYABLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Traceback \(most recent call last\)|\b(SyntaxError|IndentationError|NameError|TypeError|ValueError|KeyError|IndexError|AttributeError|ZeroDivisionError)\b|^Error in |^Error: ")
        .unwrap_or_else(|e| panic!("invalid pattern: {e}"))
});

/// Whether regenerating the code could plausibly fix this failure.
///
/// Environment problems (missing packages, memory, timeouts) are never
/// retryable; code errors are.
pub fn is_retryable_failure(error_text: &str) -> bool {
    if NON_RETRYABLE.is_match(error_text) {
        return false;
    }
    error_text.lines().any(|line| RETRYABLE.is_match(line))
}

/// Runs code through an interpreter subprocess.
pub struct ProcessExecutor {
    config: ExecutorConfig,
    history: RwLock<Vec<String>>,
}

impl ProcessExecutor {
    pub fn new(config: ExecutorConfig) -> Self {
        Self {
            config,
            history: RwLock::new(Vec::new()),
        }
    }

    fn marker(step_id: Uuid) -> String {
        format!("__plancell_step_{}__", step_id.simple())
    }

    async fn build_script(&self, step_id: Uuid, code: &str) -> (String, Option<String>) {
        if !self.config.replay_history {
            return (code.to_string(), None);
        }
        let history = self.history.read().await;
        if history.is_empty() {
            return (code.to_string(), None);
        }
        let marker = Self::marker(step_id);
        let script = format!("{}\nprint(\"{marker}\")\n{code}\n", history.join("\n"));
        (script, Some(marker))
    }

    async fn run(
        &self,
        script: String,
        marker: Option<String>,
        progress: mpsc::Sender<String>,
    ) -> DomainResult<ExecutionOutcome> {
        let mut cmd = Command::new(&self.config.interpreter);
        cmd.args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.config.working_dir {
            cmd.current_dir(dir);
        }

        let mut child = cmd.spawn().map_err(|e| {
            DomainError::ExecutionFailed(format!(
                "Failed to spawn {}: {e}",
                self.config.interpreter
            ))
        })?;

        let mut stdin = child
            .stdin
            .take()
            .ok_or_else(|| DomainError::ExecutionFailed("Failed to capture stdin".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomainError::ExecutionFailed("Failed to capture stdout".to_string()))?;
        let mut stderr = child
            .stderr
            .take()
            .ok_or_else(|| DomainError::ExecutionFailed("Failed to capture stderr".to_string()))?;

        stdin
            .write_all(script.as_bytes())
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("Failed to write code: {e}")))?;
        drop(stdin);

        let stderr_task = tokio::spawn(async move {
            let mut text = String::new();
            let _ = stderr.read_to_string(&mut text).await;
            text
        });

        let read_stdout = async {
            let mut lines = BufReader::new(stdout).lines();
            let mut output = String::new();
            let mut forwarding = marker.is_none();
            while let Ok(Some(line)) = lines.next_line().await {
                if !forwarding {
                    forwarding = marker.as_deref().is_some_and(|m| line.contains(m));
                    continue;
                }
                output.push_str(&line);
                output.push('\n');
                let _ = progress.send(line).await;
            }
            output
        };

        let limit = Duration::from_secs(self.config.timeout_secs);
        let Ok(output) = tokio::time::timeout(limit, read_stdout).await else {
            let _ = child.start_kill();
            warn!(timeout_secs = self.config.timeout_secs, "execution timed out");
            return Ok(ExecutionOutcome::failed(
                format!("Execution timed out after {}s", self.config.timeout_secs),
                false,
            ));
        };

        let status = child
            .wait()
            .await
            .map_err(|e| DomainError::ExecutionFailed(format!("Failed to wait for process: {e}")))?;
        let error_text = stderr_task.await.unwrap_or_default();

        if status.success() {
            return Ok(ExecutionOutcome::completed(output));
        }

        let mut error = error_text.trim_end().to_string();
        if error.is_empty() {
            error = match status.code() {
                Some(code) => format!("Process exited with status {code}"),
                None => "Killed".to_string(),
            };
        }
        let retry = is_retryable_failure(&error);
        debug!(code = ?status.code(), retry, "execution failed");
        Ok(ExecutionOutcome::failed(error, retry))
    }
}

#[async_trait]
impl CodeExecutor for ProcessExecutor {
    async fn execute(
        &self,
        step_id: Uuid,
        code: &str,
        progress: mpsc::Sender<String>,
    ) -> DomainResult<ExecutionOutcome> {
        let (script, marker) = self.build_script(step_id, code).await;
        self.run(script, marker, progress).await
    }

    async fn commit(&self, code: &str) -> DomainResult<()> {
        if self.config.replay_history {
            self.history.write().await.push(code.to_string());
        }
        Ok(())
    }
}
