//! `plancell run`: plan, execute and record an analysis.

use anyhow::{Context, Result};
use clap::Args;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

use super::{build_llm, build_request, load_plan_file};
use crate::adapters::{AnthropicGenerator, ProcessExecutor, ScriptArtifactWriter};
use crate::cli::output::{list_table, output, style_status, truncate, CommandOutput};
use crate::cli::progress::RunProgress;
use crate::domain::models::{format_operations, Config, Plan, RunSummary, Step, StepStatus};
use crate::services::{EventBus, OrchestratorPorts, PlanOrchestrator, Planner};

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Research question to answer
    pub question: String,

    /// Dataset file (repeatable)
    #[arg(short = 'd', long = "dataset")]
    pub datasets: Vec<String>,

    /// YAML plan file; its steps run as a locked plan
    #[arg(short, long)]
    pub plan_file: Option<PathBuf>,

    /// Script that executed cells are appended to (overrides artifact.path)
    #[arg(short, long)]
    pub artifact: Option<PathBuf>,

    /// Generate code without executing it
    #[arg(long)]
    pub generate_only: bool,

    /// Skip the planning request and use the built-in analysis sequence
    #[arg(long)]
    pub fallback_plan: bool,
}

#[derive(Debug, Serialize)]
pub struct StepRow {
    pub index: usize,
    pub description: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepRow {
    fn new(index: usize, step: &Step) -> Self {
        let failed = step.status == StepStatus::Failed;
        Self {
            index: index + 1,
            description: step.description.clone(),
            status: if step.is_skipped() {
                "skipped".to_string()
            } else {
                step.status.as_str().to_string()
            },
            skip_reason: step.skip_reason.clone(),
            attempts: step.attempts,
            error: if failed { step.output.clone() } else { None },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RunOutput {
    pub plan_id: String,
    pub locked: bool,
    pub artifact: String,
    pub steps: Vec<StepRow>,
    pub summary: RunSummary,
}

impl RunOutput {
    pub fn new(plan: &Plan, summary: RunSummary, artifact: &std::path::Path) -> Self {
        Self {
            plan_id: plan.id.to_string(),
            locked: plan.locked,
            artifact: artifact.display().to_string(),
            steps: plan
                .steps
                .iter()
                .enumerate()
                .map(|(i, step)| StepRow::new(i, step))
                .collect(),
            summary,
        }
    }
}

impl CommandOutput for RunOutput {
    fn to_human(&self) -> String {
        let mut table = list_table(&["#", "step", "status", "tries", "note"]);
        for row in &self.steps {
            let note = row
                .skip_reason
                .as_deref()
                .or_else(|| row.error.as_deref().and_then(|e| e.lines().last()))
                .unwrap_or_default();
            table.add_row(vec![
                row.index.to_string(),
                truncate(&row.description, 48),
                style_status(&row.status).to_string(),
                row.attempts.to_string(),
                truncate(note, 60),
            ]);
        }

        let s = &self.summary;
        let mut lines = vec![
            table.to_string(),
            String::new(),
            format!(
                "{} completed, {} skipped, {} failed, {} cancelled of {} steps",
                s.completed, s.skipped, s.failed, s.cancelled, s.total_steps
            ),
            format!(
                "Operations: {}{}",
                format_operations(&s.executed_operations),
                if s.analysis_fully_covered { " (fully covered)" } else { "" }
            ),
            format!("Artifact: {}", self.artifact),
        ];
        if s.was_cancelled {
            lines.push(console::style("Run was cancelled").red().to_string());
        }
        lines.join("\n")
    }
}

pub async fn execute(args: RunArgs, mut config: Config, json_mode: bool) -> Result<()> {
    if args.generate_only {
        config.orchestrator.execute_code = false;
    }
    let artifact_path = args
        .artifact
        .clone()
        .unwrap_or_else(|| PathBuf::from(&config.artifact.path));
    let request = build_request(&args.question, &args.datasets);

    let (client, oracle) = build_llm(&config)?;

    let mut plan = match &args.plan_file {
        Some(path) => load_plan_file(path).await?,
        None if args.fallback_plan => Planner::fallback_plan(&request),
        None => Planner::new(Arc::clone(&oracle)).plan(&request).await,
    };
    info!(steps = plan.len(), locked = plan.locked, "plan ready");

    let artifact = ScriptArtifactWriter::create(&artifact_path)
        .await
        .with_context(|| format!("Failed to create artifact {}", artifact_path.display()))?;

    let ports = OrchestratorPorts {
        generator: Arc::new(AnthropicGenerator::new(client)),
        executor: Arc::new(ProcessExecutor::new(config.executor.clone())),
        artifact: Arc::new(artifact),
        oracle,
    };
    let events = EventBus::shared();
    let mut orchestrator =
        PlanOrchestrator::new(ports, config.orchestrator.clone(), Arc::clone(&events));

    let mut progress = RunProgress::new(plan.len(), json_mode);
    progress.follow_checklist(orchestrator.subscribe_checklist());
    progress.follow_events(events.subscribe());

    let cancel = orchestrator.cancellation_flag();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current call");
            cancel.cancel();
        }
    });

    let result = orchestrator.run(&request, &mut plan).await;
    interrupt.abort();
    progress.finish();

    let summary = result.context("Plan run failed")?;
    output(&RunOutput::new(&plan, summary, &artifact_path), json_mode);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_output_rows() {
        let mut plan = Plan::from_descriptions(["Load the data", "Normalize", "Cluster"], true);
        plan.steps[0].transition_to(StepStatus::Running).unwrap();
        plan.steps[0].transition_to(StepStatus::Completed).unwrap();
        plan.steps[0].attempts = 1;
        plan.steps[1].mark_skipped("already normalized").unwrap();
        plan.steps[2].transition_to(StepStatus::Running).unwrap();
        plan.steps[2].transition_to(StepStatus::Failed).unwrap();
        plan.steps[2].output = Some("Traceback\nKeyError: 'x'".to_string());

        let out = RunOutput::new(&plan, RunSummary::default(), std::path::Path::new("a.py"));
        assert_eq!(out.steps[0].status, "completed");
        assert_eq!(out.steps[1].status, "skipped");
        assert_eq!(out.steps[1].skip_reason.as_deref(), Some("already normalized"));
        assert_eq!(out.steps[2].status, "failed");
        assert!(out.steps[2].error.as_deref().unwrap().contains("KeyError"));

        let human = out.to_human();
        assert!(human.contains("KeyError: 'x'"));
        assert!(human.contains("Artifact: a.py"));

        let json = out.to_json();
        assert_eq!(json["steps"][1]["status"], "skipped");
    }
}
