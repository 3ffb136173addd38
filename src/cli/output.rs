//! Output formatting utilities for the CLI.

use comfy_table::{presets, Attribute, Cell, CellAlignment, Color, ContentArrangement, Table};
use serde::Serialize;

/// Result of a command, printable for humans or as JSON.
pub trait CommandOutput: Serialize {
    /// Table or text form.
    fn to_human(&self) -> String;
    /// JSON form.
    fn to_json(&self) -> serde_json::Value;
}

/// Print `result` to stdout in the selected mode.
pub fn output<T: CommandOutput>(result: &T, json_mode: bool) {
    if json_mode {
        println!("{}", serde_json::to_string_pretty(&result.to_json()).unwrap_or_default());
    } else {
        println!("{}", result.to_human());
    }
}

/// Table with bold headers and horizontal rules only.
pub fn list_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_HORIZONTAL_ONLY)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).set_alignment(CellAlignment::Left)),
        );
    table
}

/// Diagnostic value with four decimals; values not computed yet show as `-`.
pub fn format_value(value: f64) -> String {
    if (value - crate::services::criteria::NOT_COMPUTED).abs() < f64::EPSILON {
        "-".to_string()
    } else if value.is_infinite() {
        "inf".to_string()
    } else {
        format!("{value:.4}")
    }
}

/// Table cell for a pass/fail decision.
pub fn verdict_cell(passed: bool) -> Cell {
    if passed {
        Cell::new("yes").fg(Color::Green).add_attribute(Attribute::Bold)
    } else {
        Cell::new("no").fg(Color::Yellow)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_value() {
        assert_eq!(format_value(1.012_34), "1.0123");
        assert_eq!(format_value(-2.0), "-");
        assert_eq!(format_value(f64::INFINITY), "inf");
    }

    #[test]
    fn test_list_table_renders_rows() {
        let mut table = list_table(&["Column", "Burn-in"]);
        table.add_row(vec!["posterior", "12"]);
        let rendered = table.to_string();
        assert!(rendered.contains("posterior"));
        assert!(rendered.contains("Burn-in"));
    }
}
