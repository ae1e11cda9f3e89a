//! Retry policy with exponential backoff for oracle requests.
//!
//! Retries transient failures (network errors, 429, 5xx and 529 responses).
//! Client errors such as 400/401/403/404 and missing credentials are returned
//! immediately.

use async_trait::async_trait;
use backoff::ExponentialBackoffBuilder;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::RetryConfig;
use crate::domain::ports::Oracle;

/// Whether an oracle error is worth retrying.
pub fn is_transient(error: &DomainError) -> bool {
    match error {
        DomainError::OracleFailed(message) => {
            let Some(rest) = message.strip_prefix("API error ") else {
                // Network-level failure.
                return true;
            };
            let code: u16 = rest
                .chars()
                .take_while(char::is_ascii_digit)
                .collect::<String>()
                .parse()
                .unwrap_or(0);
            matches!(code, 429 | 500..=599)
        }
        _ => false,
    }
}

/// Oracle wrapper that retries transient failures with exponential backoff.
pub struct RetryingOracle {
    inner: Arc<dyn Oracle>,
    config: RetryConfig,
}

impl RetryingOracle {
    pub fn new(inner: Arc<dyn Oracle>, config: RetryConfig) -> Self {
        Self { inner, config }
    }
}

#[async_trait]
impl Oracle for RetryingOracle {
    async fn ask(&self, question: &str, context: &str) -> DomainResult<String> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(self.config.initial_backoff_ms))
            .with_max_interval(Duration::from_millis(self.config.max_backoff_ms))
            .with_max_elapsed_time(None)
            .build();
        let attempts = &AtomicU32::new(0);
        let inner = &self.inner;
        let max_retries = self.config.max_retries;

        backoff::future::retry(policy, move || async move {
            let attempt = attempts.fetch_add(1, Ordering::SeqCst);
            match inner.ask(question, context).await {
                Ok(answer) => Ok(answer),
                Err(e) if is_transient(&e) && attempt < max_retries => {
                    warn!(attempt = attempt + 1, error = %e, "transient oracle error, retrying");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => {
                    debug!(error = %e, "oracle error is permanent");
                    Err(backoff::Error::permanent(e))
                }
            }
        })
        .await
    }
}
