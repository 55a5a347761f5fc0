//! Rendering search results for stdout.

use crate::types::RememberedCommand;

pub const NO_MATCHES: &str = "No matches.";

const MISSING: &str = "-";

/// `id \t command \t key \t metadata \t created_at`, one row per line.
pub fn format_row(row: &RememberedCommand) -> String {
    format!(
        "{}\t{}\t{}\t{}\t{}",
        row.id,
        row.command,
        row.key.as_deref().unwrap_or(MISSING),
        row.metadata.as_deref().unwrap_or(MISSING),
        row.created_at.format("%Y-%m-%d %H:%M:%S"),
    )
}

pub fn format_rows(rows: &[RememberedCommand]) -> String {
    if rows.is_empty() {
        return format!("{NO_MATCHES}\n");
    }
    rows.iter().map(|r| format_row(r) + "\n").collect()
}

pub fn format_json(rows: &[RememberedCommand]) -> serde_json::Result<String> {
    serde_json::to_string_pretty(rows)
}
