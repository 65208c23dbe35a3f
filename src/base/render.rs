//! Rendering of normalized Genie answers into Slack message text.

use serde_json::Value;

use super::types::{Answer, QueryTable};

/// Most rows ever shown in a rendered table.
pub const MAX_TABLE_ROWS: usize = 15;

/// Widest any single column is allowed to render.
pub const MAX_COLUMN_WIDTH: usize = 30;

/// Render a normalized answer into a single Slack message body.
pub fn render_answer(answer: &Answer) -> String {
    match answer {
        Answer::Text { text } => {
            if text.trim().is_empty() {
                "Query executed successfully.".to_string()
            } else {
                text.trim().to_string()
            }
        }
        Answer::Table { summary, table } => {
            let mut parts = Vec::new();

            if let Some(summary) = summary
                && !summary.trim().is_empty()
            {
                parts.push(summary.trim().to_string());
            }

            match render_table(table) {
                Some(rendered) => parts.push(rendered),
                None => {
                    if parts.is_empty() {
                        parts.push("The query returned no rows.".to_string());
                    }
                }
            }

            parts.join("\n\n")
        }
    }
}

/// Render a query table as a bounded-width code-block table.
///
/// Returns `None` when there is nothing to show (no columns or no rows).
pub fn render_table(table: &QueryTable) -> Option<String> {
    if table.columns.is_empty() || table.rows.is_empty() {
        return None;
    }

    let display_rows: Vec<Vec<String>> = table.rows.iter().take(MAX_TABLE_ROWS).map(|row| row.iter().map(render_cell).collect()).collect();

    // Column widths fit the header and the displayed cells, clamped.
    let mut widths: Vec<usize> = table.columns.iter().map(|c| c.chars().count()).collect();
    for row in &display_rows {
        for (i, cell) in row.iter().enumerate() {
            if let Some(w) = widths.get_mut(i) {
                *w = (*w).max(cell.chars().count());
            }
        }
    }
    for w in &mut widths {
        *w = (*w).min(MAX_COLUMN_WIDTH);
    }

    let mut lines = Vec::with_capacity(display_rows.len() + 2);
    lines.push(format_row(&table.columns, &widths));
    lines.push(widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-+-"));
    for row in &display_rows {
        lines.push(format_row(row, &widths));
    }

    let mut rendered = format!("*Query results:*\n```\n{}\n```", lines.join("\n"));

    let total = table.total_rows.max(table.rows.len());
    if total > display_rows.len() {
        rendered.push_str(&format!("\n_Showing {} of {} rows_", display_rows.len(), total));
    }

    Some(rendered)
}

/// Pad and clamp one row of cells into a ` | ` separated line.
fn format_row<S: AsRef<str>>(cells: &[S], widths: &[usize]) -> String {
    widths
        .iter()
        .enumerate()
        .map(|(i, w)| {
            let cell = cells.get(i).map(|c| c.as_ref()).unwrap_or("");
            let clamped: String = cell.chars().take(*w).collect();
            format!("{clamped:<w$}", w = *w)
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

/// Render one result cell; strings drop their quotes, nulls render empty.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
