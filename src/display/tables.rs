//! Table formatting for search results and index summaries.

use comfy_table::{Attribute, Cell, CellAlignment, Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};

use crate::service::{IndexStats, ScoredResult};

fn new_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.apply_modifier(UTF8_ROUND_CORNERS);
    table.set_header(
        headers
            .iter()
            .map(|h| Cell::new(h).add_attribute(Attribute::Bold)),
    );
    table
}

/// Ranked results, one row per municipality.
pub fn create_results_table(results: &[ScoredResult]) -> String {
    let mut table = new_table(&["#", "Code", "Name", "Prefecture", "Score"]);

    for (rank, result) in results.iter().enumerate() {
        table.add_row(vec![
            Cell::new(rank + 1).set_alignment(CellAlignment::Right),
            Cell::new(&result.code),
            Cell::new(&result.name),
            Cell::new(&result.prefecture),
            Cell::new(format!("{:.4}", result.score)).set_alignment(CellAlignment::Right),
        ]);
    }

    table.to_string()
}

/// Two-column summary of the loaded index.
pub fn create_stats_table(stats: &IndexStats) -> String {
    let mut table = new_table(&["Property", "Value"]);
    table.add_row(vec!["Rows".to_string(), stats.rows.to_string()]);
    table.add_row(vec!["Dimension".to_string(), stats.dimension.to_string()]);
    table.add_row(vec!["Model".to_string(), stats.model_name.clone()]);
    table.add_row(vec![
        "Unmapped rows".to_string(),
        stats.unknown_rows.to_string(),
    ]);
    table.add_row(vec![
        "Metadata records".to_string(),
        stats.metadata_records.to_string(),
    ]);
    table.add_row(vec!["SHA-256".to_string(), stats.fingerprint.clone()]);
    table.to_string()
}
