use serde::{Deserialize, Serialize};

/// Point in the step protocol at which a skip is being considered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipStage {
    PreGeneration,
    PostGeneration,
}

impl SkipStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PreGeneration => "pre-generation",
            Self::PostGeneration => "post-generation",
        }
    }
}

impl std::fmt::Display for SkipStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Heuristic that produced a skip proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipKind {
    /// Coverage threshold reached and the step needs nothing new.
    Covered,
    /// Every operation the step would perform has already run.
    Redundant,
    /// Generated code introduces no new operation.
    NoNewOperations,
    /// Generated code matches previously emitted code.
    Duplicate,
}

impl SkipKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Covered => "covered",
            Self::Redundant => "redundant",
            Self::NoNewOperations => "no_new_operations",
            Self::Duplicate => "duplicate",
        }
    }

    /// Reason handed to the oracle along with the proposal.
    pub fn proposed_reason(&self) -> &'static str {
        match self {
            Self::Covered => "analysis already covered",
            Self::Redundant => "operations already performed",
            Self::NoNewOperations => "no new operations",
            Self::Duplicate => "duplicate code",
        }
    }
}

/// Outcome of consulting the skip oracle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipDecision {
    pub skip: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SkipDecision {
    pub fn run() -> Self {
        Self { skip: false, reason: None }
    }

    pub fn run_because(reason: impl Into<String>) -> Self {
        Self {
            skip: false,
            reason: Some(reason.into()),
        }
    }

    pub fn skip(reason: Option<String>) -> Self {
        Self { skip: true, reason }
    }
}
