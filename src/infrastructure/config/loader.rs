use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;
use crate::domain::models::OperationTag;

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid coverage_threshold: {0}. Must be between 1 and {1}")]
    InvalidCoverageThreshold(usize, usize),

    #[error("Invalid candidate_excerpt_chars: {0}. Must be at least 1")]
    InvalidExcerptChars(usize),

    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidLogRotation(String),

    #[error("Invalid temperature: {0}. Must be between 0.0 and 1.0")]
    InvalidTemperature(f32),

    #[error(
        "Invalid backoff configuration: initial_backoff_ms ({0}) must be less than max_backoff_ms ({1})"
    )]
    InvalidBackoff(u64, u64),

    #[error("Configuration validation failed: {0}")]
    ValidationFailed(String),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .plancell/config.yaml (project config)
    /// 3. .plancell/local.yaml (project local overrides, optional)
    /// 4. Environment variables (PLANCELL_* prefix, `__` for nesting)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(".")
    }

    /// Load configuration rooted at `project_dir` instead of the working directory.
    pub fn load_from_dir(project_dir: impl AsRef<Path>) -> Result<Config> {
        let root = project_dir.as_ref().join(".plancell");
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(root.join("config.yaml")))
            .merge(Yaml::file(root.join("local.yaml")))
            .merge(Env::prefixed("PLANCELL_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file, still honoring environment overrides
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .merge(Env::prefixed("PLANCELL_").split("__"))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        let core_tags = OperationTag::ALL.iter().filter(|t| t.is_core()).count();
        let orchestrator = &config.orchestrator;
        if orchestrator.coverage_threshold == 0 || orchestrator.coverage_threshold > core_tags {
            return Err(ConfigError::InvalidCoverageThreshold(
                orchestrator.coverage_threshold,
                core_tags,
            ));
        }
        if orchestrator.candidate_excerpt_chars == 0 {
            return Err(ConfigError::InvalidExcerptChars(
                orchestrator.candidate_excerpt_chars,
            ));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidLogRotation(
                config.logging.rotation.clone(),
            ));
        }

        if config.llm.model.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "llm.model cannot be empty".to_string(),
            ));
        }
        if config.llm.max_tokens == 0 || config.llm.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "llm.max_tokens and llm.timeout_secs must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&config.llm.temperature) {
            return Err(ConfigError::InvalidTemperature(config.llm.temperature));
        }

        if config.retry.initial_backoff_ms >= config.retry.max_backoff_ms {
            return Err(ConfigError::InvalidBackoff(
                config.retry.initial_backoff_ms,
                config.retry.max_backoff_ms,
            ));
        }

        if config.executor.interpreter.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "executor.interpreter cannot be empty".to_string(),
            ));
        }
        if config.executor.timeout_secs == 0 {
            return Err(ConfigError::ValidationFailed(
                "executor.timeout_secs must be positive".to_string(),
            ));
        }

        if config.artifact.path.trim().is_empty() {
            return Err(ConfigError::ValidationFailed(
                "artifact.path cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}
