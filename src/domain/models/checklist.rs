//! Checklist models used for progress reporting.

use serde::{Deserialize, Serialize};

/// Status of a checklist entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChecklistStatus {
    #[default]
    Pending,
    Completed,
    Skipped,
    Failed,
}

impl ChecklistStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Skipped => "skipped",
            Self::Failed => "failed",
        }
    }

    /// Single-character marker used in human output.
    pub fn marker(&self) -> &'static str {
        match self {
            Self::Pending => "[ ]",
            Self::Completed => "[x]",
            Self::Skipped => "[-]",
            Self::Failed => "[!]",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistEntry {
    pub description: String,
    pub status: ChecklistStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ChecklistEntry {
    pub fn pending(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            status: ChecklistStatus::Pending,
            note: None,
        }
    }
}

/// Point-in-time copy of the checklist handed to progress consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChecklistSnapshot {
    pub entries: Vec<ChecklistEntry>,
    pub completed_count: usize,
    pub total_count: usize,
    pub skipped_count: usize,
    pub failed_count: usize,
    /// One-line human status highlighting the next pending item.
    pub status_line: String,
}

impl ChecklistSnapshot {
    /// Build a snapshot and its status line from the current entries.
    pub fn from_entries(entries: Vec<ChecklistEntry>) -> Self {
        let count = |status: ChecklistStatus| entries.iter().filter(|e| e.status == status).count();
        let completed_count = count(ChecklistStatus::Completed);
        let skipped_count = count(ChecklistStatus::Skipped);
        let failed_count = count(ChecklistStatus::Failed);
        let total_count = entries.len();

        let done = completed_count + skipped_count + failed_count;
        let mut status_line = format!("{done}/{total_count} steps done");
        if skipped_count > 0 || failed_count > 0 {
            status_line.push_str(&format!(
                " ({skipped_count} skipped, {failed_count} failed)"
            ));
        }
        match entries.iter().find(|e| e.status == ChecklistStatus::Pending) {
            Some(next) => status_line.push_str(&format!(", next: {}", next.description)),
            None if total_count > 0 => status_line.push_str(", all steps finished"),
            None => {}
        }

        Self {
            entries,
            completed_count,
            total_count,
            skipped_count,
            failed_count,
            status_line,
        }
    }

    pub fn pending_count(&self) -> usize {
        self.total_count - self.completed_count - self.skipped_count - self.failed_count
    }

    pub fn pending_descriptions(&self) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|e| e.status == ChecklistStatus::Pending)
            .map(|e| e.description.as_str())
            .collect()
    }

    /// Multi-line rendering used in oracle prompts and human output.
    pub fn render(&self) -> String {
        self.entries
            .iter()
            .enumerate()
            .map(|(i, e)| match &e.note {
                Some(note) => format!("{} {}. {} ({note})", e.status.marker(), i + 1, e.description),
                None => format!("{} {}. {}", e.status.marker(), i + 1, e.description),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
