//! Command handlers.

pub mod config;
pub mod ops;
pub mod plan;
pub mod run;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;

use crate::adapters::{AnthropicClient, AnthropicOracle, RetryingOracle};
use crate::domain::models::{AnalysisRequest, Config, Dataset, Plan};
use crate::domain::ports::Oracle;

/// Question plus datasets given on the command line.
pub fn build_request(question: &str, datasets: &[String]) -> AnalysisRequest {
    datasets
        .iter()
        .fold(AnalysisRequest::new(question), |request, path| {
            request.with_dataset(Dataset::from_path(path.as_str()))
        })
}

/// Read a YAML plan file into a locked plan.
pub async fn load_plan_file(path: &Path) -> Result<Plan> {
    let source = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read plan file {}", path.display()))?;
    Plan::from_yaml(&source).with_context(|| format!("Invalid plan file {}", path.display()))
}

/// Shared LLM client plus an oracle wrapped in the configured retry policy.
pub fn build_llm(config: &Config) -> Result<(Arc<AnthropicClient>, Arc<dyn Oracle>)> {
    let client = Arc::new(
        AnthropicClient::new(config.llm.clone()).context("Failed to create LLM client")?,
    );
    let oracle: Arc<dyn Oracle> = Arc::new(RetryingOracle::new(
        Arc::new(AnthropicOracle::new(Arc::clone(&client))),
        config.retry.clone(),
    ));
    Ok((client, oracle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_build_request_names_datasets_by_stem() {
        let request = build_request(
            "Compare conditions",
            &["data/ctrl.h5ad".to_string(), "data/stim.h5ad".to_string()],
        );
        assert_eq!(request.question, "Compare conditions");
        let names: Vec<&str> = request.datasets.iter().map(|d| d.name.as_str()).collect();
        assert_eq!(names, vec!["ctrl", "stim"]);
    }

    #[tokio::test]
    async fn test_load_plan_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, "- Load the data\n- Cluster the cells\n").unwrap();

        let plan = load_plan_file(&path).await.unwrap();
        assert!(plan.locked);
        assert_eq!(plan.descriptions(), vec!["Load the data", "Cluster the cells"]);

        let missing = load_plan_file(&dir.path().join("absent.yaml")).await;
        assert!(missing.is_err());
    }
}
