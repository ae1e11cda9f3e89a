//! Plan producer.
//!
//! Asks the oracle for an ordered step list. A usable answer becomes a
//! locked plan; anything else falls back to a fixed analysis sequence that
//! the orchestrator may prune heuristically.

use regex::Regex;
use std::fmt::Write as _;
use std::sync::{Arc, LazyLock};
use tracing::{debug, info, warn};

use crate::domain::models::{AnalysisRequest, OperationTag, Plan, Step};
use crate::domain::ports::Oracle;

static LIST_ITEM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(?:\d+[.):]|[-*•])\s+(.+?)\s*$")
        .unwrap_or_else(|e| panic!("invalid list pattern: {e}"))
});

static ASKS_ANNOTATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(annotat\w*|cell[ _-]?types?|label\w*|identit(y|ies))\b")
        .unwrap_or_else(|e| panic!("invalid annotation pattern: {e}"))
});

static ASKS_PERSIST: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(save|export\w*|write|persist\w*|download)\b")
        .unwrap_or_else(|e| panic!("invalid persist pattern: {e}"))
});

const PLANNING_QUESTION: &str = "Break the research question into an ordered list of \
analysis steps. Each step must be a single, self-contained action. Reply with a \
numbered list, one step per line, and nothing else.";

/// Produces plans for analysis requests.
#[derive(Clone)]
pub struct Planner {
    oracle: Arc<dyn Oracle>,
}

impl Planner {
    pub fn new(oracle: Arc<dyn Oracle>) -> Self {
        Self { oracle }
    }

    /// Plan `request`. Never fails: oracle errors and empty answers yield
    /// [`Planner::fallback_plan`].
    pub async fn plan(&self, request: &AnalysisRequest) -> Plan {
        let context = planning_context(request);
        match self.oracle.ask(PLANNING_QUESTION, &context).await {
            Ok(answer) => {
                let steps = parse_steps(&answer);
                if steps.is_empty() {
                    warn!("planner answer contained no steps, using fallback plan");
                    return Self::fallback_plan(request);
                }
                info!(steps = steps.len(), "using oracle-authored plan");
                Plan::from_descriptions(steps, true)
            }
            Err(e) => {
                warn!(error = %e, "planner request failed, using fallback plan");
                Self::fallback_plan(request)
            }
        }
    }

    /// Canonical analysis sequence, unlocked.
    pub fn fallback_plan(request: &AnalysisRequest) -> Plan {
        use OperationTag::{
            Annotation, Cluster, DataLoad, DifferentialAnalysis, DimensionalityReduction,
            FeatureSelection, Integration, Normalize, Persist, QualityControl, Visualize,
        };

        let load = if request.datasets.is_empty() {
            "Load the data".to_string()
        } else {
            let names: Vec<&str> = request.datasets.iter().map(|d| d.name.as_str()).collect();
            format!("Load the datasets ({})", names.join(", "))
        };

        let mut steps = vec![
            Step::new(load).with_expected_operations([DataLoad]),
            Step::new("Run quality control and filter low-quality observations")
                .with_expected_operations([QualityControl]),
            Step::new("Normalize and log-transform the data").with_expected_operations([Normalize]),
            Step::new("Select highly variable features").with_expected_operations([FeatureSelection]),
        ];
        if request.datasets.len() > 1 {
            steps.push(
                Step::new("Integrate the datasets and correct batch effects")
                    .with_expected_operations([Integration]),
            );
        }
        steps.push(
            Step::new("Reduce dimensionality with PCA and UMAP")
                .with_expected_operations([DimensionalityReduction]),
        );
        steps.push(Step::new("Cluster the observations").with_expected_operations([Cluster]));
        steps.push(
            Step::new("Find marker genes for each group")
                .with_expected_operations([DifferentialAnalysis]),
        );
        if ASKS_ANNOTATION.is_match(&request.question) {
            steps.push(Step::new("Annotate cell types").with_expected_operations([Annotation]));
        }
        steps.push(Step::new("Visualize the results").with_expected_operations([Visualize]));
        if ASKS_PERSIST.is_match(&request.question) {
            steps.push(Step::new("Save the results").with_expected_operations([Persist]));
        }

        debug!(steps = steps.len(), "built fallback plan");
        Plan::new(steps, false)
    }
}

fn planning_context(request: &AnalysisRequest) -> String {
    let mut out = format!("Research question: {}\n", request.question);
    if request.datasets.is_empty() {
        out.push_str("Datasets: none provided\n");
    } else {
        out.push_str("Datasets:\n");
        for dataset in &request.datasets {
            let _ = match &dataset.kind {
                Some(kind) => writeln!(out, "- {} ({kind}): {}", dataset.name, dataset.path),
                None => writeln!(out, "- {}: {}", dataset.name, dataset.path),
            };
        }
    }
    out
}

/// Extract step descriptions from an oracle answer.
///
/// Accepts a JSON array of strings anywhere in the text, or numbered and
/// bulleted list lines. Markdown emphasis is removed.
pub fn parse_steps(answer: &str) -> Vec<String> {
    if let Some(steps) = parse_json_array(answer) {
        return steps;
    }

    answer
        .lines()
        .filter_map(|line| LIST_ITEM.captures(line))
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().replace("**", "").replace('`', "").trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_json_array(answer: &str) -> Option<Vec<String>> {
    let start = answer.find('[')?;
    let end = answer.rfind(']')?;
    if end <= start {
        return None;
    }
    let steps: Vec<String> = serde_json::from_str(&answer[start..=end]).ok()?;
    let steps: Vec<String> = steps
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    (!steps.is_empty()).then_some(steps)
}
