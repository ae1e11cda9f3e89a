//! `plancell config`: print the effective configuration.

use anyhow::Result;
use serde::Serialize;

use crate::cli::output::{output, CommandOutput};
use crate::domain::models::Config;

#[derive(Debug, Serialize)]
#[serde(transparent)]
pub struct ConfigOutput<'a>(pub &'a Config);

impl CommandOutput for ConfigOutput<'_> {
    fn to_human(&self) -> String {
        serde_yaml::to_string(self.0).unwrap_or_default()
    }
}

pub fn execute(config: &Config, json_mode: bool) -> Result<()> {
    output(&ConfigOutput(config), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_api_key_is_never_printed() {
        let mut config = Config::default();
        config.llm.api_key = Some("sk-ant-secret".to_string());

        let out = ConfigOutput(&config);
        assert!(!out.to_human().contains("sk-ant-secret"));
        assert!(!out.to_json().to_string().contains("sk-ant-secret"));
        assert_eq!(out.to_json()["orchestrator"]["max_auto_fix_retries"], 2);
    }
}
