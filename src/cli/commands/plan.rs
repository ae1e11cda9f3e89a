//! `plancell plan`: show the plan a run would execute.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;

use super::{build_llm, build_request, load_plan_file};
use crate::cli::output::{list_table, output, CommandOutput};
use crate::domain::models::{format_operations, Config, Plan};
use crate::services::{OperationExtractor, Planner};

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Research question to plan for
    pub question: String,

    /// Dataset file (repeatable)
    #[arg(short = 'd', long = "dataset")]
    pub datasets: Vec<String>,

    /// Show a YAML plan file instead of planning
    #[arg(short, long)]
    pub plan_file: Option<PathBuf>,

    /// Show the built-in analysis sequence without asking the model
    #[arg(long)]
    pub fallback_plan: bool,
}

#[derive(Debug, Serialize)]
pub struct PlannedStep {
    pub index: usize,
    pub description: String,
    /// Operations the plan declares, or the estimate from the description
    pub operations: Vec<String>,
    pub declared: bool,
}

#[derive(Debug, Serialize)]
pub struct PlanOutput {
    pub locked: bool,
    pub steps: Vec<PlannedStep>,
}

impl PlanOutput {
    pub fn new(plan: &Plan) -> Self {
        let extractor = OperationExtractor::new();
        let steps = plan
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| {
                let (ops, declared) = match &step.expected_operations {
                    Some(ops) => (ops.clone(), true),
                    None => (extractor.estimate_from_description(&step.description), false),
                };
                PlannedStep {
                    index: i + 1,
                    description: step.description.clone(),
                    operations: ops.iter().map(|t| t.as_str().to_string()).collect(),
                    declared,
                }
            })
            .collect();
        Self {
            locked: plan.locked,
            steps,
        }
    }
}

impl CommandOutput for PlanOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "step", "operations"]);
        for step in &self.steps {
            let ops = if step.operations.is_empty() {
                "-".to_string()
            } else if step.declared {
                step.operations.join(", ")
            } else {
                format!("~ {}", step.operations.join(", "))
            };
            table.add_row(vec![step.index.to_string(), step.description.clone(), ops]);
        }
        let kind = if self.locked { "locked" } else { "heuristic" };
        format!("{} step(s), {kind} plan:\n{table}", self.steps.len())
    }
}

pub async fn execute(args: PlanArgs, config: &Config, json_mode: bool) -> Result<()> {
    let request = build_request(&args.question, &args.datasets);
    let plan = match &args.plan_file {
        Some(path) => load_plan_file(path).await?,
        None if args.fallback_plan => Planner::fallback_plan(&request),
        None => {
            let (_, oracle) = build_llm(config)?;
            Planner::new(oracle).plan(&request).await
        }
    };
    output(&PlanOutput::new(&plan), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{AnalysisRequest, OperationTag, Step};

    #[test]
    fn test_declared_and_estimated_operations() {
        let plan = Plan::new(
            vec![
                Step::new("Cluster the observations"),
                Step::new("Custom step").with_expected_operations([OperationTag::Visualize]),
            ],
            true,
        );
        let out = PlanOutput::new(&plan);
        assert!(!out.steps[0].declared);
        assert_eq!(out.steps[0].operations, vec!["cluster"]);
        assert!(out.steps[1].declared);
        assert_eq!(out.steps[1].operations, vec!["visualize"]);

        let human = out.to_human();
        assert!(human.starts_with("2 step(s), locked plan"));
        assert!(human.contains("~ cluster"));
    }

    #[test]
    fn test_fallback_plan_output() {
        let plan = Planner::fallback_plan(&AnalysisRequest::new("Find cell clusters"));
        let out = PlanOutput::new(&plan);
        assert!(!out.locked);
        assert!(out.steps.iter().all(|s| s.declared));
    }
}
