//! Anthropic Messages API adapter.
//!
//! One HTTP client serves both roles the orchestrator needs from a language
//! model: code generation (streamed, so that partial code survives a broken
//! stream) and single-shot oracle questions.

use async_trait::async_trait;
use futures::StreamExt;
use regex::Regex;
use reqwest::{header, Client, Response};
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::LlmConfig;
use crate::domain::ports::{CodeGenerator, GeneratedCode, GenerationRequest, Oracle};

/// `anthropic-version` header value.
pub const API_VERSION: &str = "2023-06-01";

static FENCED_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)(?:```|\z)")
        .unwrap_or_else(|e| panic!("invalid fence pattern: {e}"))
});

const GENERATOR_SYSTEM: &str = "You write Python code for one step of a data analysis. \
Return a single fenced code block and nothing else. Variables created by earlier steps \
are still in memory.";

const FIXER_SYSTEM: &str = "You fix Python code that failed to run. Return the complete \
corrected code in a single fenced code block and nothing else.";

const ORACLE_SYSTEM: &str = "You are a careful assistant supervising an automated data \
analysis. Answer exactly in the format requested.";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MessageRole {
    User,
}

#[derive(Debug, Clone, Serialize)]
struct Message {
    role: MessageRole,
    content: String,
}

#[derive(Debug, Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<Message>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    stream: bool,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum StreamEvent {
    #[serde(rename = "content_block_delta")]
    ContentBlockDelta { delta: DeltaBlock },
    #[serde(rename = "message_stop")]
    MessageStop,
    #[serde(rename = "error")]
    Error { error: ApiError },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct DeltaBlock {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Text received before a streamed completion broke off.
#[derive(Debug)]
pub struct PartialCompletion {
    pub error: DomainError,
    pub text: String,
}

/// Thin Messages API client.
pub struct AnthropicClient {
    config: LlmConfig,
    client: Client,
}

impl AnthropicClient {
    pub fn new(config: LlmConfig) -> DomainResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| DomainError::ValidationFailed(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self { config, client })
    }

    pub fn model(&self) -> &str {
        &self.config.model
    }

    /// API key from config or `ANTHROPIC_API_KEY`.
    fn api_key(&self) -> DomainResult<String> {
        self.config
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var("ANTHROPIC_API_KEY").ok())
            .ok_or_else(|| DomainError::ValidationFailed("ANTHROPIC_API_KEY not set".to_string()))
    }

    fn build_request(&self, system: &str, user: &str, stream: bool) -> MessagesRequest {
        MessagesRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            system: (!system.is_empty()).then(|| system.to_string()),
            messages: vec![Message {
                role: MessageRole::User,
                content: user.to_string(),
            }],
            stream,
            temperature: self.config.temperature,
        }
    }

    async fn send(&self, request: &MessagesRequest) -> DomainResult<Response> {
        let api_key = self.api_key()?;
        let response = self
            .client
            .post(format!("{}/v1/messages", self.config.base_url.trim_end_matches('/')))
            .header(header::CONTENT_TYPE, "application/json")
            .header("x-api-key", &api_key)
            .header("anthropic-version", API_VERSION)
            .json(request)
            .send()
            .await
            .map_err(|e| DomainError::OracleFailed(format!("API request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(DomainError::OracleFailed(format!("API error {status}: {body}")));
        }
        Ok(response)
    }

    /// Single non-streaming completion; text blocks are joined.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn complete(&self, system: &str, user: &str) -> DomainResult<String> {
        let request = self.build_request(system, user, false);
        let response = self.send(&request).await?;
        let result: MessagesResponse = response
            .json()
            .await
            .map_err(|e| DomainError::OracleFailed(format!("Failed to parse response: {e}")))?;

        debug!(stop_reason = ?result.stop_reason, "completion received");
        Ok(result
            .content
            .into_iter()
            .filter_map(|block| match block {
                ContentBlock::Text { text } => Some(text),
                ContentBlock::Other => None,
            })
            .collect::<Vec<_>>()
            .join("\n"))
    }

    /// Streamed completion. When the stream breaks after text has arrived,
    /// the text received so far is returned with the error.
    #[instrument(skip_all, fields(model = %self.config.model))]
    pub async fn complete_streaming(&self, system: &str, user: &str) -> Result<String, PartialCompletion> {
        let request = self.build_request(system, user, true);
        let response = self.send(&request).await.map_err(|error| PartialCompletion {
            error,
            text: String::new(),
        })?;

        let mut stream = response.bytes_stream();
        let mut buffer: Vec<u8> = Vec::new();
        let mut text = String::new();

        while let Some(chunk) = stream.next().await {
            let bytes = match chunk {
                Ok(bytes) => bytes,
                Err(e) => {
                    return Err(PartialCompletion {
                        error: DomainError::OracleFailed(format!("stream interrupted: {e}")),
                        text,
                    })
                }
            };
            buffer.extend_from_slice(&bytes);

            while let Some(pos) = buffer.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = buffer.drain(..=pos).collect();
                let line = String::from_utf8_lossy(&line);
                match parse_sse_event(line.trim_end()) {
                    Some(StreamEvent::ContentBlockDelta { delta }) => text.push_str(&delta.text),
                    Some(StreamEvent::MessageStop) => return Ok(text),
                    Some(StreamEvent::Error { error }) => {
                        return Err(PartialCompletion {
                            error: DomainError::OracleFailed(error.message),
                            text,
                        })
                    }
                    Some(StreamEvent::Other) | None => {}
                }
            }
        }

        if text.is_empty() {
            return Err(PartialCompletion {
                error: DomainError::OracleFailed("stream ended without content".to_string()),
                text,
            });
        }
        warn!("stream ended without message_stop");
        Ok(text)
    }
}

fn parse_sse_event(line: &str) -> Option<StreamEvent> {
    let json_str = line.strip_prefix("data:")?.trim_start();
    if json_str == "[DONE]" {
        return None;
    }
    serde_json::from_str(json_str).ok()
}

/// Code inside the first fenced block, or the whole text when there is no
/// fence. An unterminated fence yields everything after it.
pub fn extract_code(text: &str) -> String {
    FENCED_CODE
        .captures(text)
        .and_then(|caps| caps.get(1))
        .map_or_else(|| text.trim(), |m| m.as_str().trim_end())
        .to_string()
}

/// Code generator backed by the Messages API.
pub struct AnthropicGenerator {
    client: Arc<AnthropicClient>,
}

impl AnthropicGenerator {
    pub fn new(client: Arc<AnthropicClient>) -> Self {
        Self { client }
    }

    fn generation_prompt(request: &GenerationRequest) -> String {
        let mut prompt = format!("Research question: {}\n", request.original_question);
        if !request.datasets.is_empty() {
            prompt.push_str("Datasets:\n");
            for dataset in &request.datasets {
                let kind = dataset.kind.as_deref().unwrap_or("unknown type");
                let _ = writeln!(prompt, "- {} ({kind}) at {}", dataset.name, dataset.path);
            }
        }
        let _ = writeln!(prompt, "\nCurrent step: {}", request.step_description);
        let _ = writeln!(prompt, "{}", request.scope_note());
        if let Some(hint) = &request.implementation_hint {
            let _ = writeln!(prompt, "Implementation hint: {hint}");
        }
        prompt
    }

    async fn stream_code(&self, system: &str, prompt: &str) -> DomainResult<GeneratedCode> {
        match self.client.complete_streaming(system, prompt).await {
            Ok(text) => Ok(GeneratedCode::new(extract_code(&text))),
            Err(partial) => {
                let code = extract_code(&partial.text);
                Err(DomainError::GenerationFailed {
                    message: partial.error.to_string(),
                    partial_code: (!code.trim().is_empty()).then_some(code),
                })
            }
        }
    }
}

#[async_trait]
impl CodeGenerator for AnthropicGenerator {
    async fn generate(&self, request: &GenerationRequest) -> DomainResult<GeneratedCode> {
        let prompt = Self::generation_prompt(request);
        self.stream_code(GENERATOR_SYSTEM, &prompt).await
    }

    async fn regenerate(
        &self,
        original_code: &str,
        error_text: &str,
        step_description: &str,
    ) -> DomainResult<GeneratedCode> {
        let prompt = format!(
            "Step: {step_description}\n\nCode:\n```python\n{original_code}\n```\n\nError:\n```\n{error_text}\n```\n"
        );
        self.stream_code(FIXER_SYSTEM, &prompt).await
    }
}

/// Oracle backed by the Messages API.
pub struct AnthropicOracle {
    client: Arc<AnthropicClient>,
}

impl AnthropicOracle {
    pub fn new(client: Arc<AnthropicClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Oracle for AnthropicOracle {
    async fn ask(&self, question: &str, context: &str) -> DomainResult<String> {
        let prompt = format!("{context}\n\n{question}");
        self.client.complete(ORACLE_SYSTEM, &prompt).await
    }
}
