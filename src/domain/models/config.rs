use serde::{Deserialize, Serialize};

use super::operation::DEFAULT_COVERAGE_THRESHOLD;

/// Main configuration structure for plancell
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Step protocol tuning
    #[serde(default)]
    pub orchestrator: OrchestratorConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// LLM backend used for generation, planning and skip questions
    #[serde(default)]
    pub llm: LlmConfig,

    /// Retry policy for oracle calls
    #[serde(default)]
    pub retry: RetryConfig,

    /// Subprocess executor configuration
    #[serde(default)]
    pub executor: ExecutorConfig,

    /// Output artifact configuration
    #[serde(default)]
    pub artifact: ArtifactConfig,
}

/// Tuning knobs for the per-step decision protocol.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct OrchestratorConfig {
    /// Auto-fix retries after the initial execution
    #[serde(default = "default_max_auto_fix_retries")]
    pub max_auto_fix_retries: u32,

    /// Core operation tags required before the analysis counts as covered
    #[serde(default = "default_coverage_threshold")]
    pub coverage_threshold: usize,

    /// Steps that must remain after the current one for a coverage skip
    #[serde(default = "default_min_remaining_for_early_skip")]
    pub min_remaining_for_early_skip: usize,

    /// Maximum characters of candidate code quoted to the oracle
    #[serde(default = "default_candidate_excerpt_chars")]
    pub candidate_excerpt_chars: usize,

    /// Execute generated code; when false steps complete after generation
    #[serde(default = "default_true")]
    pub execute_code: bool,

    /// Pause between steps in milliseconds
    #[serde(default)]
    pub step_pause_ms: u64,
}

const fn default_max_auto_fix_retries() -> u32 {
    2
}

const fn default_coverage_threshold() -> usize {
    DEFAULT_COVERAGE_THRESHOLD
}

const fn default_min_remaining_for_early_skip() -> usize {
    2
}

const fn default_candidate_excerpt_chars() -> usize {
    1400
}

const fn default_true() -> bool {
    true
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_auto_fix_retries: default_max_auto_fix_retries(),
            coverage_threshold: default_coverage_threshold(),
            min_remaining_for_early_skip: default_min_remaining_for_early_skip(),
            candidate_excerpt_chars: default_candidate_excerpt_chars(),
            execute_code: true,
            step_pause_ms: 0,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LoggingConfig {
    /// Log level: trace, debug, info, warn, error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format: json or pretty
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Directory for rolling log files; stderr only when unset
    #[serde(default)]
    pub log_dir: Option<String>,

    /// Rotation for file output: daily, hourly or never
    #[serde(default = "default_rotation")]
    pub rotation: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

fn default_rotation() -> String {
    "daily".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            log_dir: None,
            rotation: default_rotation(),
        }
    }
}

/// LLM backend configuration (Anthropic Messages API)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct LlmConfig {
    /// API base URL
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Model identifier
    #[serde(default = "default_model")]
    pub model: String,

    /// API key; falls back to ANTHROPIC_API_KEY
    #[serde(default, skip_serializing)]
    pub api_key: Option<String>,

    /// Maximum tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// HTTP request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_base_url() -> String {
    "https://api.anthropic.com".to_string()
}

fn default_model() -> String {
    "claude-sonnet-4-5".to_string()
}

const fn default_max_tokens() -> u32 {
    4096
}

const fn default_temperature() -> f32 {
    0.2
}

const fn default_timeout_secs() -> u64 {
    120
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key: None,
            max_tokens: default_max_tokens(),
            temperature: default_temperature(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Retry policy configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RetryConfig {
    /// Maximum number of retry attempts
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff delay in milliseconds
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
}

const fn default_max_retries() -> u32 {
    3
}

const fn default_initial_backoff_ms() -> u64 {
    1000
}

const fn default_max_backoff_ms() -> u64 {
    30_000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
        }
    }
}

/// Subprocess executor configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ExecutorConfig {
    /// Interpreter binary that reads code from stdin
    #[serde(default = "default_interpreter")]
    pub interpreter: String,

    /// Extra interpreter arguments
    #[serde(default = "default_interpreter_args")]
    pub args: Vec<String>,

    /// Working directory for executions
    #[serde(default)]
    pub working_dir: Option<String>,

    /// Per-execution timeout in seconds
    #[serde(default = "default_exec_timeout_secs")]
    pub timeout_secs: u64,

    /// Re-run previously successful code before each step so state carries over
    #[serde(default = "default_true")]
    pub replay_history: bool,
}

fn default_interpreter() -> String {
    "python3".to_string()
}

fn default_interpreter_args() -> Vec<String> {
    vec!["-u".to_string(), "-".to_string()]
}

const fn default_exec_timeout_secs() -> u64 {
    600
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            interpreter: default_interpreter(),
            args: default_interpreter_args(),
            working_dir: None,
            timeout_secs: default_exec_timeout_secs(),
            replay_history: true,
        }
    }
}

/// Output artifact configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct ArtifactConfig {
    /// Script file that generated cells are appended to
    #[serde(default = "default_artifact_path")]
    pub path: String,
}

fn default_artifact_path() -> String {
    "analysis.py".to_string()
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            path: default_artifact_path(),
        }
    }
}
