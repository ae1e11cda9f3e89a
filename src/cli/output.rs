//! Output formatting utilities for the CLI.

use comfy_table::{presets, Cell, CellAlignment, ContentArrangement, Table};
use console::{style, StyledObject};
use serde::Serialize;

pub trait CommandOutput: Serialize {
    fn to_human(&self) -> String;
    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or_default()
    }
}

pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Truncate a string to a maximum number of characters, appending "..." if truncated.
pub fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{kept}...")
    }
}

/// Borderless table with upper-cased headers.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::NOTHING)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h.to_uppercase()).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Colour a step or checklist status; unknown values are left plain.
pub fn style_status(status: &str) -> StyledObject<&str> {
    match status {
        "completed" => style(status).green().bold(),
        "skipped" => style(status).cyan(),
        "running" => style(status).yellow(),
        "pending" => style(status).blue(),
        "failed" => style(status).red().bold(),
        "cancelled" => style(status).dim(),
        _ => style(status),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("Normalize the counts", 12), "Normalize...");
        assert_eq!(truncate("ééééééé", 5), "éé...");
    }

    #[test]
    fn test_list_table_renders_headers() {
        let mut table = list_table(&["#", "step"]);
        table.add_row(vec!["1", "Load the data"]);
        let rendered = table.to_string();
        assert!(rendered.contains("STEP"));
        assert!(rendered.contains("Load the data"));
    }

    #[test]
    fn test_style_status_keeps_text() {
        console::set_colors_enabled(false);
        assert_eq!(style_status("skipped").to_string(), "skipped");
        assert_eq!(style_status("unknown").to_string(), "unknown");
    }
}
