//! `plancell ops`: inspect a code file the way the orchestrator sees it.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use crate::cli::output::{output, CommandOutput};
use crate::services::{normalize, OperationExtractor};

#[derive(Args, Debug)]
pub struct OpsArgs {
    /// Code file to inspect
    pub file: PathBuf,
}

#[derive(Debug, Serialize)]
pub struct OpsOutput {
    pub file: String,
    pub operations: Vec<String>,
    /// `None` when the code is empty after normalization
    pub fingerprint: Option<String>,
}

impl OpsOutput {
    pub fn from_code(file: impl Into<String>, code: &str) -> Self {
        let operations = OperationExtractor::new()
            .extract(code)
            .iter()
            .map(|t| t.as_str().to_string())
            .collect();
        Self {
            file: file.into(),
            operations,
            fingerprint: normalize(code).map(|f| f.as_str().to_string()),
        }
    }
}

impl CommandOutput for OpsOutput {
    fn to_human(&self) -> String {
        let ops = if self.operations.is_empty() {
            "none".to_string()
        } else {
            self.operations.join(", ")
        };
        let fingerprint = self.fingerprint.as_deref().unwrap_or("(empty)");
        format!(
            "File:        {}\nOperations:  {ops}\nFingerprint: {fingerprint}",
            self.file
        )
    }
}

pub async fn execute(args: OpsArgs, json_mode: bool) -> Result<()> {
    let code = tokio::fs::read_to_string(&args.file)
        .await
        .with_context(|| format!("Failed to read {}", args.file.display()))?;
    output(
        &OpsOutput::from_code(args.file.display().to_string(), &code),
        json_mode,
    );
    Ok(())
}
