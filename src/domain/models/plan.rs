//! Plan and analysis request models.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;

use super::operation::OperationTag;
use super::step::{Step, StepStatus};
use crate::domain::errors::{DomainError, DomainResult};

/// A dataset the analysis runs over.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dataset {
    pub name: String,
    pub path: String,
    /// Dataset type as reported by an external detector, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
}

impl Dataset {
    /// Build a dataset from a path, naming it after the file stem.
    pub fn from_path(path: impl Into<String>) -> Self {
        let path = path.into();
        let name = std::path::Path::new(&path)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(path.as_str())
            .to_string();
        Self { name, path, kind: None }
    }
}

/// The research question and the datasets it concerns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    pub question: String,
    #[serde(default)]
    pub datasets: Vec<Dataset>,
}

impl AnalysisRequest {
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            datasets: Vec::new(),
        }
    }

    pub fn with_dataset(mut self, dataset: Dataset) -> Self {
        self.datasets.push(dataset);
        self
    }
}

/// Ordered list of steps.
///
/// A locked plan came from an authoritative source and is never re-sequenced;
/// heuristic skip proposals are suppressed for it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: Uuid,
    pub steps: Vec<Step>,
    pub locked: bool,
}

impl Plan {
    pub fn new(steps: Vec<Step>, locked: bool) -> Self {
        Self {
            id: Uuid::new_v4(),
            steps,
            locked,
        }
    }

    pub fn from_descriptions<I, S>(descriptions: I, locked: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(descriptions.into_iter().map(Step::new).collect(), locked)
    }

    /// Parse a YAML plan file. Plans loaded from files are locked.
    ///
    /// Accepts either a bare list of descriptions or a `steps:` list whose
    /// entries are strings or maps with `description`, `expected_operations`
    /// and `hint`.
    pub fn from_yaml(source: &str) -> DomainResult<Self> {
        let file: PlanFile = serde_yaml::from_str(source)?;
        let entries = match file {
            PlanFile::Bare(entries) | PlanFile::Wrapped { steps: entries } => entries,
        };

        let mut steps = Vec::with_capacity(entries.len());
        for entry in entries {
            steps.push(entry.into_step()?);
        }
        if steps.is_empty() {
            return Err(DomainError::ValidationFailed(
                "plan file contains no steps".to_string(),
            ));
        }
        Ok(Self::new(steps, true))
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn descriptions(&self) -> Vec<String> {
        self.steps.iter().map(|s| s.description.clone()).collect()
    }

    /// Descriptions of steps after `index` that are still pending.
    pub fn pending_after(&self, index: usize) -> Vec<String> {
        self.steps
            .iter()
            .skip(index + 1)
            .filter(|s| s.status == StepStatus::Pending)
            .map(|s| s.description.clone())
            .collect()
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFile {
    Bare(Vec<PlanFileEntry>),
    Wrapped { steps: Vec<PlanFileEntry> },
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PlanFileEntry {
    Text(String),
    Detailed {
        description: String,
        #[serde(default)]
        expected_operations: Option<Vec<String>>,
        #[serde(default)]
        hint: Option<String>,
    },
}

impl PlanFileEntry {
    fn into_step(self) -> DomainResult<Step> {
        match self {
            Self::Text(description) => Ok(Step::new(description)),
            Self::Detailed {
                description,
                expected_operations,
                hint,
            } => {
                let mut step = Step::new(description);
                if let Some(names) = expected_operations {
                    let mut ops = BTreeSet::new();
                    for name in names {
                        let tag = OperationTag::from_str(&name).ok_or_else(|| {
                            DomainError::ValidationFailed(format!("unknown operation tag: {name}"))
                        })?;
                        ops.insert(tag);
                    }
                    step.expected_operations = Some(ops);
                }
                step.implementation_hint = hint;
                Ok(step)
            }
        }
    }
}
